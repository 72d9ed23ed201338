//! Core domain types for assiduity
//!
//! These types are the typed records read from and written to the store.
//! Rows are converted into them at the database boundary; nothing past
//! [`crate::db`] ever sees an untyped row.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Member** | A person registered with the organization |
//! | **Group** | A named set of members (a cell, a team, a year group) |
//! | **Event** | A dated gathering, optionally owned by a group |
//! | **Attendance record** | One present/absent mark for a member, usually tied to an event |
//! | **Attendance rate** | Share of a member's attendance records marked present, in percent |

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Members
// ============================================

/// A registered member of the organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    /// Unique, immutable identifier
    pub id: i64,
    /// Family name
    pub last_name: String,
    /// Given names
    pub given_names: String,
    /// Phone number or other contact string
    pub contact: String,
    pub email: String,
    pub residence: String,
    pub school: String,
    /// Academic track / field of study
    pub track: String,
    /// Registration timestamp. `None` when missing or unparseable.
    pub registered_at: Option<NaiveDateTime>,
}

impl Member {
    /// "Last Given" display name, truncated to `width` characters.
    pub fn display_name(&self, width: usize) -> String {
        let full = format!("{} {}", self.last_name, self.given_names);
        truncate_chars(full.trim_end(), width)
    }
}

/// Fields for a new member.
#[derive(Debug, Clone, Default)]
pub struct NewMember {
    pub last_name: String,
    pub given_names: String,
    pub contact: String,
    pub email: String,
    pub residence: String,
    pub school: String,
    pub track: String,
    /// Defaults to now when `None`
    pub registered_at: Option<NaiveDateTime>,
}

/// Partial update of a member; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct MemberUpdate {
    pub last_name: Option<String>,
    pub given_names: Option<String>,
    pub contact: Option<String>,
    pub email: Option<String>,
    pub residence: Option<String>,
    pub school: Option<String>,
    pub track: Option<String>,
    pub registered_at: Option<NaiveDateTime>,
}

impl MemberUpdate {
    /// True when the update would not change anything.
    pub fn is_empty(&self) -> bool {
        self.last_name.is_none()
            && self.given_names.is_none()
            && self.contact.is_none()
            && self.email.is_none()
            && self.residence.is_none()
            && self.school.is_none()
            && self.track.is_none()
            && self.registered_at.is_none()
    }
}

// ============================================
// Groups
// ============================================

/// A named group of members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    /// Unique name
    pub name: String,
    pub description: String,
    /// Display color (e.g. "#4F46E5")
    pub color: String,
    pub created_at: Option<NaiveDateTime>,
    /// Derived from membership links at read time, never stored
    pub member_count: i64,
}

/// Fields for a new group.
#[derive(Debug, Clone, Default)]
pub struct NewGroup {
    pub name: String,
    pub description: String,
    pub color: String,
}

/// Partial update of a group.
#[derive(Debug, Clone, Default)]
pub struct GroupUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
}

// ============================================
// Events
// ============================================

/// A dated gathering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub name: String,
    pub date: NaiveDate,
    /// Free-form time of day ("18:30"), may be empty
    pub time: String,
    pub location: String,
    pub description: String,
    /// Owning group, if any
    pub group_id: Option<i64>,
}

/// Fields for a new event.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub name: String,
    pub date: NaiveDate,
    pub time: String,
    pub location: String,
    pub description: String,
    pub group_id: Option<i64>,
}

// ============================================
// Attendance
// ============================================

/// One present/absent mark for a member.
///
/// Nothing enforces one record per (member, event): duplicates are kept and
/// each one weighs on the member's attendance rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub member_id: i64,
    pub event_id: Option<i64>,
    pub date: NaiveDate,
    pub present: bool,
}

// ============================================
// Helpers
// ============================================

/// Parse a stored timestamp (registration, creation).
///
/// Accepts the shapes the store has written over time: RFC 3339,
/// `YYYY-MM-DDTHH:MM:SS[.fff]`, `YYYY-MM-DD HH:MM:SS` and a bare date.
/// Only the first whitespace-separated token is considered, so a space
/// separated timestamp is read as its date at midnight.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let token = raw.split_whitespace().next()?;

    if let Ok(dt) = DateTime::parse_from_rfc3339(token) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(token, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(token, "%Y-%m-%dT%H:%M") {
        return Some(dt);
    }
    NaiveDate::parse_from_str(token, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Format a timestamp the way it is stored.
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// Truncate to at most `width` characters (not bytes).
pub fn truncate_chars(s: &str, width: usize) -> String {
    s.chars().take(width).collect()
}

/// Round to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
