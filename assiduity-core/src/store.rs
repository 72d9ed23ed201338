//! Data access seam for the statistics pipeline
//!
//! [`AttendanceStore`] is the read contract the analytics code depends on.
//! [`Registry`] is the only write path: it wraps [`Database`] and clears the
//! attendance-rate cache after every member or attendance mutation, so no
//! call site has to remember to do it.

use crate::analytics::rates::RateCalculator;
use crate::db::Database;
use crate::error::Result;
use crate::types::*;
use chrono::NaiveDate;
use std::sync::Arc;

/// Read operations over members, groups, events and attendance records.
///
/// Implementations must be cheap to call from a background thread; the
/// aggregation worker holds one behind an `Arc` for the duration of a run.
pub trait AttendanceStore: Send + Sync {
    /// Fails when the store cannot be reached at all.
    fn check_connection(&self) -> Result<()>;

    fn get_all_members(&self) -> Result<Vec<Member>>;

    fn get_members_of_group(&self, group_id: i64) -> Result<Vec<Member>>;

    /// Member IDs linked to a group (cheaper than loading full members)
    fn get_group_member_ids(&self, group_id: i64) -> Result<Vec<i64>>;

    /// All groups, each with its member count attached
    fn get_all_groups(&self) -> Result<Vec<Group>>;

    /// All events, or only those dated today or later
    fn get_all_events(&self, upcoming_only: bool) -> Result<Vec<Event>>;

    fn get_all_attendance(&self) -> Result<Vec<AttendanceRecord>>;

    fn get_attendance_for_member(&self, member_id: i64) -> Result<Vec<AttendanceRecord>>;

    fn get_attendance_for_event(&self, event_id: i64) -> Result<Vec<AttendanceRecord>>;

    /// Number of attendance records for a member
    fn count_attendance(&self, member_id: i64) -> Result<i64>;

    /// Number of attendance records marked present for a member
    fn count_present(&self, member_id: i64) -> Result<i64>;
}

/// Write-invalidate wrapper around the database.
///
/// Every insert, update or delete touching members or attendance records
/// clears the rate cache, whether or not the statement succeeded.
pub struct Registry {
    db: Arc<Database>,
    rates: Arc<RateCalculator>,
}

impl Registry {
    /// Wrap a database, creating the rate calculator bound to it.
    pub fn new(db: Arc<Database>) -> Self {
        let store: Arc<dyn AttendanceStore> = db.clone();
        Self {
            db,
            rates: Arc::new(RateCalculator::new(store)),
        }
    }

    /// Read access to the underlying database
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// The database as a shareable read store
    pub fn store(&self) -> Arc<dyn AttendanceStore> {
        self.db.clone()
    }

    /// The rate calculator whose cache this registry keeps fresh
    pub fn rates(&self) -> Arc<RateCalculator> {
        Arc::clone(&self.rates)
    }

    fn invalidating<T>(&self, result: Result<T>) -> Result<T> {
        self.rates.invalidate();
        result
    }

    // ============================================
    // Members
    // ============================================

    pub fn add_member(&self, member: &NewMember) -> Result<i64> {
        let result = self.db.insert_member(member);
        if let Ok(id) = &result {
            tracing::debug!(member_id = id, "Member added");
        }
        self.invalidating(result)
    }

    pub fn update_member(&self, id: i64, update: &MemberUpdate) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }
        self.invalidating(self.db.update_member(id, update))
    }

    pub fn delete_member(&self, id: i64) -> Result<()> {
        let result = self.db.delete_member(id);
        if result.is_ok() {
            tracing::debug!(member_id = id, "Member deleted");
        }
        self.invalidating(result)
    }

    // ============================================
    // Groups and memberships
    // ============================================

    pub fn add_group(&self, group: &NewGroup) -> Result<i64> {
        self.db.insert_group(group)
    }

    pub fn update_group(&self, id: i64, update: &GroupUpdate) -> Result<()> {
        self.db.update_group(id, update)
    }

    pub fn delete_group(&self, id: i64) -> Result<()> {
        self.db.delete_group(id)
    }

    pub fn add_member_to_group(&self, group_id: i64, member_id: i64) -> Result<()> {
        self.db.add_group_member(group_id, member_id)
    }

    pub fn remove_member_from_group(&self, group_id: i64, member_id: i64) -> Result<()> {
        self.db.remove_group_member(group_id, member_id)
    }

    // ============================================
    // Events
    // ============================================

    pub fn add_event(&self, event: &NewEvent) -> Result<i64> {
        self.db.insert_event(event)
    }

    pub fn delete_event(&self, id: i64) -> Result<()> {
        self.db.delete_event(id)
    }

    // ============================================
    // Attendance
    // ============================================

    /// Record a present/absent mark for a member, optionally tied to an event.
    pub fn record_attendance(
        &self,
        member_id: i64,
        event_id: Option<i64>,
        present: bool,
        date: NaiveDate,
    ) -> Result<i64> {
        self.invalidating(self.db.insert_attendance(member_id, event_id, present, date))
    }

    pub fn set_attendance_presence(&self, id: i64, present: bool) -> Result<()> {
        self.invalidating(self.db.update_attendance_presence(id, present))
    }

    pub fn delete_attendance(&self, id: i64) -> Result<()> {
        self.invalidating(self.db.delete_attendance(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        Registry::new(Arc::new(db))
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, d).unwrap()
    }

    #[test]
    fn test_attendance_mutations_refresh_rates() {
        let registry = registry();
        let rates = registry.rates();
        let m = registry
            .add_member(&NewMember {
                last_name: "Gnagne".to_string(),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(rates.rate(m), 0.0);

        let first = registry.record_attendance(m, None, true, day(1)).unwrap();
        assert_eq!(rates.rate(m), 100.0);

        registry.record_attendance(m, None, false, day(8)).unwrap();
        assert_eq!(rates.rate(m), 50.0);

        registry.set_attendance_presence(first, false).unwrap();
        assert_eq!(rates.rate(m), 0.0);

        registry.delete_attendance(first).unwrap();
        assert_eq!(rates.rate(m), 0.0);
        assert_eq!(registry.database().count_member_attendance(m).unwrap(), 1);
    }

    #[test]
    fn test_member_deletion_clears_cache() {
        let registry = registry();
        let rates = registry.rates();
        let m = registry.add_member(&NewMember::default()).unwrap();
        registry.record_attendance(m, None, true, day(1)).unwrap();
        assert_eq!(rates.rate(m), 100.0);
        assert_eq!(rates.cache().len(), 1);

        registry.delete_member(m).unwrap();
        assert_eq!(rates.cache().len(), 0);
        assert_eq!(rates.rate(m), 0.0);
    }

    #[test]
    fn test_failed_mutation_still_invalidates() {
        let registry = registry();
        let rates = registry.rates();
        let m = registry.add_member(&NewMember::default()).unwrap();
        rates.rate(m);
        let before = rates.cache().generation();

        assert!(registry.delete_member(m + 100).is_err());
        assert!(rates.cache().generation() > before);
    }

    #[test]
    fn test_empty_member_update_is_noop() {
        let registry = registry();
        let rates = registry.rates();
        let before = rates.cache().generation();
        registry.update_member(1, &MemberUpdate::default()).unwrap();
        assert_eq!(rates.cache().generation(), before);
    }
}
