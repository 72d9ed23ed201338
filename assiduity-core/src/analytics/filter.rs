//! Member filtering by group and registration recency.

use crate::types::Member;
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Registration recency window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    /// No recency constraint
    #[default]
    #[serde(rename = "all")]
    All,
    #[serde(rename = "30d")]
    Last30Days,
    #[serde(rename = "90d")]
    Last90Days,
    #[serde(rename = "365d")]
    Last365Days,
}

impl Period {
    /// Window length, `None` for [`Period::All`].
    pub fn window(&self) -> Option<Duration> {
        match self {
            Period::All => None,
            Period::Last30Days => Some(Duration::days(30)),
            Period::Last90Days => Some(Duration::days(90)),
            Period::Last365Days => Some(Duration::days(365)),
        }
    }

    /// Oldest registration timestamp still inside the window.
    pub fn cutoff(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        self.window().map(|w| now - w)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::All => "all",
            Period::Last30Days => "30d",
            Period::Last90Days => "90d",
            Period::Last365Days => "365d",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Period::All => "All time",
            Period::Last30Days => "Last 30 days",
            Period::Last90Days => "Last 90 days",
            Period::Last365Days => "Last 365 days",
        }
    }
}

impl std::str::FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Period::All),
            "30d" | "month" => Ok(Period::Last30Days),
            "90d" | "quarter" => Ok(Period::Last90Days),
            "365d" | "year" => Ok(Period::Last365Days),
            other => Err(format!(
                "unknown period: {} (expected all, 30d, 90d or 365d)",
                other
            )),
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of one statistics run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsFilter {
    /// Restrict to members of this group
    pub group_id: Option<i64>,
    /// Restrict to members registered within this window
    pub period: Period,
}

impl StatsFilter {
    pub fn new(group_id: Option<i64>, period: Period) -> Self {
        Self { group_id, period }
    }
}

/// Apply the group and period predicates (logical AND) to `members`.
///
/// `group_member_ids` is the membership of the selected group, or `None` when
/// no group is selected. With a period active, members without a parseable
/// registration timestamp are dropped: they cannot be shown to be recent.
pub fn filter_members(
    members: &[Member],
    group_member_ids: Option<&HashSet<i64>>,
    period: Period,
    now: NaiveDateTime,
) -> Vec<Member> {
    let cutoff = period.cutoff(now);

    members
        .iter()
        .filter(|m| group_member_ids.map_or(true, |ids| ids.contains(&m.id)))
        .filter(|m| match cutoff {
            None => true,
            Some(cutoff) => m.registered_at.is_some_and(|at| at >= cutoff),
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 30)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn member(id: i64, days_ago: Option<i64>) -> Member {
        Member {
            id,
            last_name: format!("M{id}"),
            given_names: String::new(),
            contact: String::new(),
            email: String::new(),
            residence: String::new(),
            school: String::new(),
            track: String::new(),
            registered_at: days_ago.map(|d| now() - Duration::days(d)),
        }
    }

    fn ids(members: &[Member]) -> Vec<i64> {
        members.iter().map(|m| m.id).collect()
    }

    #[test]
    fn test_group_and_period_intersect() {
        // A: in G, 10 days ago. B: in G, 200 days ago. C: not in G, 5 days ago.
        let members = vec![member(1, Some(10)), member(2, Some(200)), member(3, Some(5))];
        let group: HashSet<i64> = [1, 2].into_iter().collect();

        let filtered = filter_members(&members, Some(&group), Period::Last30Days, now());
        assert_eq!(ids(&filtered), vec![1]);

        let group_only = filter_members(&members, Some(&group), Period::All, now());
        assert_eq!(ids(&group_only), vec![1, 2]);

        let period_only = filter_members(&members, None, Period::Last30Days, now());
        assert_eq!(ids(&period_only), vec![1, 3]);
    }

    #[test]
    fn test_undated_members_dropped_only_with_period() {
        let members = vec![member(1, None), member(2, Some(1))];

        assert_eq!(ids(&filter_members(&members, None, Period::All, now())), vec![1, 2]);
        assert_eq!(
            ids(&filter_members(&members, None, Period::Last365Days, now())),
            vec![2]
        );
    }

    #[test]
    fn test_cutoff_is_inclusive() {
        let members = vec![member(1, Some(90)), member(2, Some(91))];
        let filtered = filter_members(&members, None, Period::Last90Days, now());
        assert_eq!(ids(&filtered), vec![1]);
    }

    #[test]
    fn test_period_parse() {
        assert_eq!("all".parse::<Period>().unwrap(), Period::All);
        assert_eq!("30d".parse::<Period>().unwrap(), Period::Last30Days);
        assert_eq!("Quarter".parse::<Period>().unwrap(), Period::Last90Days);
        assert_eq!("365d".parse::<Period>().unwrap(), Period::Last365Days);
        assert!("fortnight".parse::<Period>().is_err());
        assert_eq!(Period::Last90Days.to_string(), "90d");
    }
}
