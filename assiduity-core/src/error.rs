//! Error types for assiduity-core

use thiserror::Error;

/// Main error type for the assiduity-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Member not found
    #[error("member not found: {0}")]
    MemberNotFound(i64),

    /// Group not found
    #[error("group not found: {0}")]
    GroupNotFound(i64),

    /// Event not found
    #[error("event not found: {0}")]
    EventNotFound(i64),

    /// Attendance record not found
    #[error("attendance record not found: {0}")]
    AttendanceNotFound(i64),

    /// A group with this name already exists
    #[error("group name already in use: {0}")]
    DuplicateGroupName(String),

    /// The store cannot be reached at all
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Background statistics worker failed
    #[error("statistics worker error: {0}")]
    Worker(String),
}

/// Result type alias for assiduity-core
pub type Result<T> = std::result::Result<T, Error>;
