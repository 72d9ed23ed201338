//! # assiduity-core
//!
//! Core library for assiduity - attendance statistics for a community
//! organization.
//!
//! This library provides:
//! - Domain types for members, groups, events and attendance records
//! - Database storage layer with SQLite
//! - Attendance rates, filtering and statistics aggregation
//! - A background host that computes statistics off the caller's thread
//! - Configuration management and logging infrastructure
//!
//! ## Data flow
//!
//! ```text
//! Registry (writes) ──► Database ◄── StatsHost worker
//!        │                              │ StatsInput::load + filter
//!        └─ invalidates ──► RateCalculator ──► AggregationEngine
//!                                               │
//!                                         StatsSnapshot
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use assiduity_core::analytics::{StatsFilter, StatsHost};
//! use assiduity_core::{Config, Database, Registry};
//! use std::sync::Arc;
//!
//! let config = Config::load().expect("failed to load config");
//! let db = Database::open(&config.resolved_database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//!
//! let registry = Registry::new(Arc::new(db));
//! let host = StatsHost::for_registry(&registry, config.stats.clone());
//! let snapshot = host
//!     .submit(StatsFilter::default())
//!     .and_then(|run| run.wait())
//!     .expect("statistics run failed");
//! println!("{} members", snapshot.totals.as_ref().map_or(0, |t| t.members));
//! ```

// Re-export commonly used items at the crate root
pub use analytics::{StatsFilter, StatsHost, StatsSnapshot};
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use store::{AttendanceStore, Registry};
pub use types::*;

// Public modules
pub mod analytics;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod store;
pub mod types;
