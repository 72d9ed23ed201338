//! Aggregation engine
//!
//! Turns the filtered member set plus the raw collections into one
//! [`StatsSnapshot`]. The engine is pure and read-only: it never touches the
//! store, only a [`StatsInput`] loaded beforehand and a [`RateSource`].
//!
//! ## Per-view isolation
//!
//! ```text
//!  StatsInput ──┬─► totals ─────────────┐
//!               ├─► by_school/track/... │
//!               ├─► attendance rates ──►├─► mean, top, at risk, ranking,
//!               │                       │   distribution, group comparison
//!               ├─► registration curve  │
//!               └─► event trend ────────┴─► StatsSnapshot { .., degraded }
//! ```
//!
//! Every view runs inside its own guard. A view whose input collection could
//! not be read, that returns an error, or that panics is left as `None` and
//! named in [`StatsSnapshot::degraded`]; the other views are unaffected.

use super::filter::{filter_members, StatsFilter};
use super::rates::{attendance_rate, RateSource};
use super::snapshot::*;
use crate::config::StatsConfig;
use crate::error::Result;
use crate::store::AttendanceStore;
use crate::types::{round2, truncate_chars, AttendanceRecord, Event, Group, Member};
use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime};
use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

// ============================================
// Progress stages
// ============================================

/// Progress stages of a statistics run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    LoadingData,
    ComputingStatistics,
    ComputingRates,
    PreparingCharts,
    Done,
}

impl Stage {
    /// Short status label shown to users.
    pub fn label(&self) -> &'static str {
        match self {
            Stage::LoadingData => "loading data",
            Stage::ComputingStatistics => "computing statistics",
            Stage::ComputingRates => "computing attendance rates",
            Stage::PreparingCharts => "preparing charts",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================
// Input
// ============================================

/// A group with the ids of its members.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRoster {
    pub group: Group,
    pub member_ids: Vec<i64>,
}

/// Everything one aggregation run reads.
///
/// `None` collections could not be read from the store; the views depending
/// on them are reported as degraded.
#[derive(Debug, Clone)]
pub struct StatsInput {
    pub filter: StatsFilter,
    /// Every member, unfiltered (registration curve)
    pub all_members: Vec<Member>,
    /// Members passing the filter
    pub members: Vec<Member>,
    pub groups: Option<Vec<GroupRoster>>,
    pub events: Option<Vec<Event>>,
    pub attendance: Option<Vec<AttendanceRecord>>,
}

impl StatsInput {
    /// Read every collection from `store` and apply `filter`.
    ///
    /// Fails only when the store cannot be reached or the members (which
    /// every view is built on) cannot be read. Other collections that fail
    /// to load are logged and left as `None`.
    pub fn load(
        store: &dyn AttendanceStore,
        filter: StatsFilter,
        now: NaiveDateTime,
    ) -> Result<Self> {
        store.check_connection()?;

        let all_members = store.get_all_members()?;
        let group_member_ids = match filter.group_id {
            Some(group_id) => Some(
                store
                    .get_group_member_ids(group_id)?
                    .into_iter()
                    .collect::<HashSet<i64>>(),
            ),
            None => None,
        };
        let members = filter_members(
            &all_members,
            group_member_ids.as_ref(),
            filter.period,
            now,
        );

        let groups = readable("groups", load_rosters(store));
        let events = readable("events", store.get_all_events(false));
        let attendance = readable("attendance", store.get_all_attendance());

        tracing::debug!(
            members = all_members.len(),
            filtered = members.len(),
            group_id = ?filter.group_id,
            period = %filter.period,
            "Statistics input loaded"
        );

        Ok(Self {
            filter,
            all_members,
            members,
            groups,
            events,
            attendance,
        })
    }
}

fn load_rosters(store: &dyn AttendanceStore) -> Result<Vec<GroupRoster>> {
    store
        .get_all_groups()?
        .into_iter()
        .map(|group| {
            let member_ids = store.get_group_member_ids(group.id)?;
            Ok(GroupRoster { group, member_ids })
        })
        .collect()
}

fn readable<T>(collection: &'static str, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(collection, error = %e, "Collection unreadable; dependent views degraded");
            None
        }
    }
}

// ============================================
// View guard
// ============================================

#[derive(Debug)]
enum ViewError {
    /// An input the view needs is unavailable
    MissingInput(&'static str),
    /// The view itself failed
    Failed(String),
}

impl fmt::Display for ViewError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewError::MissingInput(input) => write!(f, "{} unavailable", input),
            ViewError::Failed(msg) => f.write_str(msg),
        }
    }
}

type ViewResult<T> = std::result::Result<T, ViewError>;

fn required<'a, T>(input: &'a Option<T>, name: &'static str) -> ViewResult<&'a T> {
    input.as_ref().ok_or(ViewError::MissingInput(name))
}

/// Run one computation step, catching errors and panics.
fn guarded<T>(name: &str, step: impl FnOnce() -> ViewResult<T>) -> ViewResult<T> {
    let start = Instant::now();
    tracing::trace!(view = name, "Running statistics view");

    let outcome = match panic::catch_unwind(AssertUnwindSafe(step)) {
        Ok(result) => result,
        Err(payload) => Err(ViewError::Failed(format!(
            "panicked: {}",
            panic_message(payload.as_ref())
        ))),
    };
    let duration_ms = start.elapsed().as_millis() as i64;

    match &outcome {
        Ok(_) => tracing::debug!(view = name, duration_ms, "Statistics view computed"),
        Err(e @ ViewError::MissingInput(_)) => {
            tracing::warn!(view = name, reason = %e, "Statistics view skipped")
        }
        Err(e @ ViewError::Failed(_)) => {
            tracing::error!(view = name, duration_ms, error = %e, "Statistics view failed")
        }
    }
    outcome
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ============================================
// Engine
// ============================================

/// Computes statistics snapshots.
#[derive(Debug, Clone, Default)]
pub struct AggregationEngine {
    config: StatsConfig,
}

impl AggregationEngine {
    pub fn new(config: StatsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StatsConfig {
        &self.config
    }

    /// Compute a snapshot. `now` is the wall clock of the run; it stamps the
    /// snapshot and bounds the registration curve and upcoming events.
    pub fn compute(
        &self,
        input: &StatsInput,
        rates: &dyn RateSource,
        now: DateTime<Local>,
    ) -> StatsSnapshot {
        self.compute_with_progress(input, rates, now, &mut |_| {})
    }

    /// Same as [`compute`](Self::compute), reporting each stage to `progress`
    /// before starting it.
    pub fn compute_with_progress(
        &self,
        input: &StatsInput,
        rates: &dyn RateSource,
        now: DateTime<Local>,
        progress: &mut dyn FnMut(Stage),
    ) -> StatsSnapshot {
        let cfg = &self.config;
        let today = now.date_naive();
        let members = &input.members;
        let mut snapshot = StatsSnapshot::empty(input.filter, now);
        let mut degraded = Vec::new();

        if let Some(attendance) = &input.attendance {
            let duplicates = duplicate_attendance_count(attendance);
            if duplicates > 0 {
                tracing::warn!(
                    duplicates,
                    "Attendance records repeat a (member, event) pair; each one counts toward rates"
                );
            }
        }

        progress(Stage::ComputingStatistics);

        snapshot.totals = run_view(&mut degraded, StatsView::Totals, || {
            Ok(totals(
                members,
                input.groups.as_deref(),
                input.events.as_deref(),
                today,
            ))
        });
        if snapshot.totals.as_ref().is_some_and(|t| {
            t.groups.is_none() || t.events.is_none() || t.upcoming_events.is_none()
        }) {
            degraded.push(StatsView::Totals);
        }
        snapshot.by_school = run_view(&mut degraded, StatsView::BySchool, || {
            Ok(value_counts(members, |m| &m.school))
        });
        snapshot.by_track = run_view(&mut degraded, StatsView::ByTrack, || {
            Ok(value_counts(members, |m| &m.track))
        });
        snapshot.by_residence = run_view(&mut degraded, StatsView::ByResidence, || {
            Ok(value_counts(members, |m| &m.residence))
        });

        progress(Stage::ComputingRates);

        // One rate per member, shared by every rate-based view. Group
        // comparison covers whole groups, not only filtered members. A single
        // unreadable rate leaves the map unset.
        let rate_map: Option<HashMap<i64, f64>> = guarded("attendance_rates", || {
            let mut ids: Vec<i64> = members.iter().map(|m| m.id).collect();
            if let Some(groups) = &input.groups {
                ids.extend(groups.iter().flat_map(|g| g.member_ids.iter().copied()));
            }
            ids.into_iter()
                .map(|id| rates.try_rate(id).map(|rate| (id, rate)))
                .collect::<Result<HashMap<i64, f64>>>()
                .map_err(|e| ViewError::Failed(format!("attendance rates unreadable: {}", e)))
        })
        .ok();
        let rate_map = &rate_map;

        snapshot.mean_attendance_rate =
            run_view(&mut degraded, StatsView::MeanAttendanceRate, || {
                let rates = required(rate_map, "attendance rates")?;
                Ok(mean_rate(members.iter().map(|m| m.id), rates))
            });
        snapshot.top_performers = run_view(&mut degraded, StatsView::TopPerformers, || {
            let rates = required(rate_map, "attendance rates")?;
            Ok(top_performers(members, rates, cfg.top_limit, cfg.name_width))
        });
        snapshot.at_risk = run_view(&mut degraded, StatsView::AtRisk, || {
            let rates = required(rate_map, "attendance rates")?;
            Ok(at_risk(
                members,
                rates,
                cfg.at_risk_threshold,
                cfg.at_risk_limit,
                cfg.name_width,
            ))
        });
        snapshot.school_ranking = run_view(&mut degraded, StatsView::SchoolRanking, || {
            let rates = required(rate_map, "attendance rates")?;
            Ok(school_ranking(members, rates))
        });
        snapshot.rate_distribution = run_view(&mut degraded, StatsView::RateDistribution, || {
            let rates = required(rate_map, "attendance rates")?;
            Ok(members.iter().map(|m| rates.rate(m.id)).collect())
        });
        snapshot.group_comparison = run_view(&mut degraded, StatsView::GroupComparison, || {
            let groups = required(&input.groups, "groups")?;
            let rates = required(rate_map, "attendance rates")?;
            Ok(group_comparison(groups, rates, cfg.group_name_width))
        });

        progress(Stage::PreparingCharts);

        snapshot.registration_evolution =
            run_view(&mut degraded, StatsView::RegistrationEvolution, || {
                Ok(registration_evolution(&input.all_members, now.naive_local()))
            });
        snapshot.event_trend = run_view(&mut degraded, StatsView::EventTrend, || {
            let events = required(&input.events, "events")?;
            let attendance = required(&input.attendance, "attendance")?;
            Ok(event_trend(
                events,
                attendance,
                cfg.trend_events,
                cfg.event_label_width,
            ))
        });

        degraded.sort();
        degraded.dedup();
        snapshot.degraded = degraded;

        tracing::info!(
            members = members.len(),
            degraded = snapshot.degraded.len(),
            "Statistics snapshot computed"
        );
        snapshot
    }
}

fn run_view<T>(
    degraded: &mut Vec<StatsView>,
    view: StatsView,
    compute: impl FnOnce() -> ViewResult<T>,
) -> Option<T> {
    match guarded(view.as_str(), compute) {
        Ok(value) => Some(value),
        Err(_) => {
            degraded.push(view);
            None
        }
    }
}

// ============================================
// Views
// ============================================

fn totals(
    members: &[Member],
    groups: Option<&[GroupRoster]>,
    events: Option<&[Event]>,
    today: NaiveDate,
) -> Totals {
    Totals {
        members: members.len(),
        groups: groups.map(|g| g.len()),
        events: events.map(|e| e.len()),
        upcoming_events: events.map(|e| e.iter().filter(|ev| ev.date >= today).count()),
    }
}

/// Occurrences of each non-blank value of a member field.
fn value_counts(members: &[Member], field: impl Fn(&Member) -> &String) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for member in members {
        let value = field(member).trim();
        if !value.is_empty() {
            *counts.entry(value.to_string()).or_insert(0) += 1;
        }
    }
    counts
}

fn mean_rate(ids: impl Iterator<Item = i64>, rates: &dyn RateSource) -> f64 {
    let (sum, n) = ids.fold((0.0, 0usize), |(sum, n), id| (sum + rates.rate(id), n + 1));
    if n == 0 {
        0.0
    } else {
        round2(sum / n as f64)
    }
}

fn ranked(members: &[Member], rates: &dyn RateSource, name_width: usize) -> Vec<RankedMember> {
    members
        .iter()
        .map(|m| RankedMember {
            member_id: m.id,
            name: m.display_name(name_width),
            rate: rates.rate(m.id),
        })
        .collect()
}

/// Members with a positive rate, best first.
fn top_performers(
    members: &[Member],
    rates: &dyn RateSource,
    limit: usize,
    name_width: usize,
) -> Vec<RankedMember> {
    let mut list: Vec<RankedMember> = ranked(members, rates, name_width)
        .into_iter()
        .filter(|r| r.rate > 0.0)
        .collect();
    list.sort_by(|a, b| b.rate.total_cmp(&a.rate));
    list.truncate(limit);
    list
}

/// Members attending a little but below `threshold`, worst first.
///
/// A rate of exactly zero is not "at risk": the member has no recorded
/// presence at all.
fn at_risk(
    members: &[Member],
    rates: &dyn RateSource,
    threshold: f64,
    limit: usize,
    name_width: usize,
) -> Vec<RankedMember> {
    let mut list: Vec<RankedMember> = ranked(members, rates, name_width)
        .into_iter()
        .filter(|r| r.rate > 0.0 && r.rate < threshold)
        .collect();
    list.sort_by(|a, b| a.rate.total_cmp(&b.rate));
    list.truncate(limit);
    list
}

fn school_ranking(members: &[Member], rates: &dyn RateSource) -> Vec<SchoolRate> {
    let mut by_school: BTreeMap<&str, Vec<i64>> = BTreeMap::new();
    for member in members {
        let school = member.school.trim();
        if !school.is_empty() {
            by_school.entry(school).or_default().push(member.id);
        }
    }

    let mut ranking: Vec<SchoolRate> = by_school
        .into_iter()
        .map(|(school, ids)| SchoolRate {
            school: school.to_string(),
            mean_rate: mean_rate(ids.iter().copied(), rates),
            members: ids.len(),
        })
        .collect();
    ranking.sort_by(|a, b| b.mean_rate.total_cmp(&a.mean_rate));
    ranking
}

fn group_comparison(
    groups: &[GroupRoster],
    rates: &dyn RateSource,
    name_width: usize,
) -> Vec<GroupComparison> {
    groups
        .iter()
        .filter(|roster| !roster.member_ids.is_empty())
        .map(|roster| GroupComparison {
            group_id: roster.group.id,
            name: truncate_chars(&roster.group.name, name_width),
            mean_rate: mean_rate(roster.member_ids.iter().copied(), rates),
            size: roster.member_ids.len(),
            color: roster.group.color.clone(),
        })
        .collect()
}

/// Cumulative registrations sampled at the start of each month, from the
/// month of the earliest registration up to the month of `now`.
fn registration_evolution(members: &[Member], now: NaiveDateTime) -> Vec<MonthlyCount> {
    let mut dates: Vec<NaiveDateTime> = members.iter().filter_map(|m| m.registered_at).collect();
    dates.sort();

    let Some(earliest) = dates.first() else {
        return Vec::new();
    };
    let (Some(mut month), Some(last)) = (month_start(earliest.date()), month_start(now.date()))
    else {
        return Vec::new();
    };

    let mut points = Vec::new();
    while month <= last {
        let Some(instant) = month.and_hms_opt(0, 0, 0) else {
            break;
        };
        points.push(MonthlyCount {
            month,
            label: month.format("%b %y").to_string(),
            cumulative: dates.partition_point(|d| *d <= instant),
        });
        match next_month(month) {
            Some(next) => month = next,
            None => break,
        }
    }
    points
}

fn month_start(date: NaiveDate) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
}

fn next_month(month: NaiveDate) -> Option<NaiveDate> {
    if month.month() == 12 {
        NaiveDate::from_ymd_opt(month.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(month.year(), month.month() + 1, 1)
    }
}

/// Share of present records for the `limit` most recent events. Events
/// without any record are left out.
fn event_trend(
    events: &[Event],
    attendance: &[AttendanceRecord],
    limit: usize,
    label_width: usize,
) -> Vec<EventAttendance> {
    let mut ordered: Vec<&Event> = events.iter().collect();
    ordered.sort_by(|a, b| {
        (a.date, event_time(&a.time), &a.time).cmp(&(b.date, event_time(&b.time), &b.time))
    });
    let recent = &ordered[ordered.len().saturating_sub(limit)..];

    // event id -> (present, total)
    let mut tally: HashMap<i64, (usize, usize)> = HashMap::new();
    for record in attendance {
        if let Some(event_id) = record.event_id {
            let entry = tally.entry(event_id).or_default();
            entry.1 += 1;
            if record.present {
                entry.0 += 1;
            }
        }
    }

    recent
        .iter()
        .filter_map(|event| {
            let &(present, total) = tally.get(&event.id)?;
            if total == 0 {
                return None;
            }
            Some(EventAttendance {
                event_id: event.id,
                label: truncate_chars(&event.name, label_width),
                date: event.date,
                present,
                total,
                rate: attendance_rate(present as i64, total as i64),
            })
        })
        .collect()
}

/// Clock time of an event; `None` when the stored text is not `H:MM[:SS]`,
/// which sorts it before timed events of the same day.
fn event_time(time: &str) -> Option<NaiveTime> {
    let time = time.trim();
    NaiveTime::parse_from_str(time, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M:%S"))
        .ok()
}

/// Number of records repeating an earlier (member, event) pair.
pub fn duplicate_attendance_count(attendance: &[AttendanceRecord]) -> usize {
    let mut seen = HashSet::new();
    attendance
        .iter()
        .filter_map(|r| r.event_id.map(|event_id| (r.member_id, event_id)))
        .filter(|pair| !seen.insert(*pair))
        .count()
}
