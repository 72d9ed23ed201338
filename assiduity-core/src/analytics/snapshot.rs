//! Aggregation result snapshot.
//!
//! One [`StatsSnapshot`] is produced per completed statistics run. It is
//! immutable once built and shared behind an `Arc`.
//!
//! Every view is an `Option`: `None` means the view could not be computed
//! (an input collection was unreadable or the view itself failed), which a
//! consumer must be able to tell apart from an empty or zero result. The
//! names of those views are also listed in [`StatsSnapshot::degraded`].

use super::filter::StatsFilter;
use crate::error::Result;
use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

/// Named views of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsView {
    Totals,
    MeanAttendanceRate,
    BySchool,
    ByTrack,
    ByResidence,
    RegistrationEvolution,
    TopPerformers,
    AtRisk,
    SchoolRanking,
    EventTrend,
    GroupComparison,
    RateDistribution,
}

impl StatsView {
    /// Every view, in snapshot order.
    pub const ALL: [StatsView; 12] = [
        StatsView::Totals,
        StatsView::MeanAttendanceRate,
        StatsView::BySchool,
        StatsView::ByTrack,
        StatsView::ByResidence,
        StatsView::RegistrationEvolution,
        StatsView::TopPerformers,
        StatsView::AtRisk,
        StatsView::SchoolRanking,
        StatsView::EventTrend,
        StatsView::GroupComparison,
        StatsView::RateDistribution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatsView::Totals => "totals",
            StatsView::MeanAttendanceRate => "mean_attendance_rate",
            StatsView::BySchool => "by_school",
            StatsView::ByTrack => "by_track",
            StatsView::ByResidence => "by_residence",
            StatsView::RegistrationEvolution => "registration_evolution",
            StatsView::TopPerformers => "top_performers",
            StatsView::AtRisk => "at_risk",
            StatsView::SchoolRanking => "school_ranking",
            StatsView::EventTrend => "event_trend",
            StatsView::GroupComparison => "group_comparison",
            StatsView::RateDistribution => "rate_distribution",
        }
    }
}

impl std::fmt::Display for StatsView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Headline counts.
///
/// `members` is post-filter; the other counts ignore the filter. A `None`
/// count means its collection could not be read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Totals {
    pub members: usize,
    pub groups: Option<usize>,
    pub events: Option<usize>,
    /// Events dated today or later
    pub upcoming_events: Option<usize>,
}

/// One point of the cumulative registration curve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyCount {
    /// First day of the month
    pub month: NaiveDate,
    /// Short label, e.g. "Mar 25"
    pub label: String,
    /// Members registered on or before the start of `month`
    pub cumulative: usize,
}

/// A member with their rate, for ranked lists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedMember {
    pub member_id: i64,
    /// Display name, truncated
    pub name: String,
    pub rate: f64,
}

/// Mean attendance rate of the members of one school.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchoolRate {
    pub school: String,
    pub mean_rate: f64,
    pub members: usize,
}

/// Attendance of one event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventAttendance {
    pub event_id: i64,
    /// Event name, truncated
    pub label: String,
    pub date: NaiveDate,
    pub present: usize,
    pub total: usize,
    /// Percent present, two decimals
    pub rate: f64,
}

/// Comparative attendance of one non-empty group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupComparison {
    pub group_id: i64,
    /// Group name, truncated
    pub name: String,
    pub mean_rate: f64,
    pub size: usize,
    pub color: String,
}

/// Immutable result of one aggregation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// When the run computed this snapshot
    pub generated_at: DateTime<Local>,
    /// Parameters of the run
    pub filter: StatsFilter,
    pub totals: Option<Totals>,
    pub mean_attendance_rate: Option<f64>,
    pub by_school: Option<BTreeMap<String, usize>>,
    pub by_track: Option<BTreeMap<String, usize>>,
    pub by_residence: Option<BTreeMap<String, usize>>,
    pub registration_evolution: Option<Vec<MonthlyCount>>,
    pub top_performers: Option<Vec<RankedMember>>,
    pub at_risk: Option<Vec<RankedMember>>,
    pub school_ranking: Option<Vec<SchoolRate>>,
    pub event_trend: Option<Vec<EventAttendance>>,
    pub group_comparison: Option<Vec<GroupComparison>>,
    /// Rate of every filtered member
    pub rate_distribution: Option<Vec<f64>>,
    /// Views that are missing or incomplete
    pub degraded: Vec<StatsView>,
}

impl StatsSnapshot {
    /// An empty snapshot with every view missing.
    pub fn empty(filter: StatsFilter, generated_at: DateTime<Local>) -> Self {
        Self {
            generated_at,
            filter,
            totals: None,
            mean_attendance_rate: None,
            by_school: None,
            by_track: None,
            by_residence: None,
            registration_evolution: None,
            top_performers: None,
            at_risk: None,
            school_ranking: None,
            event_trend: None,
            group_comparison: None,
            rate_distribution: None,
            degraded: Vec::new(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }

    pub fn is_view_degraded(&self, view: StatsView) -> bool {
        self.degraded.contains(&view)
    }

    /// Pretty JSON export.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_missing_views_serialize_as_null() {
        let at = Local.with_ymd_and_hms(2025, 6, 30, 12, 0, 0).unwrap();
        let mut snapshot = StatsSnapshot::empty(StatsFilter::default(), at);
        snapshot.totals = Some(Totals {
            members: 0,
            groups: Some(0),
            events: None,
            upcoming_events: None,
        });
        snapshot.degraded.push(StatsView::EventTrend);

        let value: serde_json::Value =
            serde_json::from_str(&snapshot.to_json_pretty().unwrap()).unwrap();

        assert!(value["event_trend"].is_null());
        assert_eq!(value["totals"]["members"], 0);
        assert!(value["totals"]["events"].is_null());
        assert_eq!(value["degraded"][0], "event_trend");
        assert_eq!(value["filter"]["period"], "all");

        for view in StatsView::ALL {
            assert!(
                value.get(view.as_str()).is_some(),
                "snapshot should carry key {}",
                view
            );
        }
    }
}
