//! Database layer for assiduity
//!
//! SQLite storage with:
//! - Schema migrations tracked by `PRAGMA user_version`
//! - Typed reads for members, groups, events and attendance
//! - Crate-private writes, reached through [`crate::store::Registry`]

pub mod repo;
pub mod schema;

pub use repo::Database;
