//! Attendance statistics
//!
//! The pipeline runs in four parts:
//!
//! - [`rates`]: per-member attendance rate with a memoizing cache
//! - [`filter`]: group and registration-period member filter
//! - [`engine`]: pure aggregation of one [`StatsSnapshot`] per run
//! - [`host`]: background worker streaming progress and publishing snapshots
//!
//! See [`StatsHost`] for the entry point most callers want.

pub mod engine;
pub mod filter;
pub mod host;
pub mod rates;
pub mod snapshot;

pub use engine::{duplicate_attendance_count, AggregationEngine, GroupRoster, Stage, StatsInput};
pub use filter::{filter_members, Period, StatsFilter};
pub use host::{Published, RunEvent, RunState, StatsHost, StatsRun};
pub use rates::{attendance_rate, RateCache, RateCalculator, RateSource};
pub use snapshot::{
    EventAttendance, GroupComparison, MonthlyCount, RankedMember, SchoolRate, StatsSnapshot,
    StatsView, Totals,
};
