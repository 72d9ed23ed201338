//! Database repository layer
//!
//! Provides query and write operations for all entity types.
//!
//! Reads are public. Writes are crate-private: callers go through
//! [`crate::store::Registry`], which keeps the attendance-rate cache in step
//! with every mutation.

use crate::error::{Error, Result};
use crate::store::AttendanceStore;
use crate::types::*;
use chrono::{Local, NaiveDate};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const MEMBER_COLUMNS: &str = "id, last_name, given_names, contact, email, residence, school, track, registered_at";
const EVENT_COLUMNS: &str = "id, name, date, time, location, description, group_id";
const ATTENDANCE_COLUMNS: &str = "id, member_id, event_id, date, present";

/// Database handle (single serialized connection)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.connection()?;
        super::schema::run_migrations(&conn)
    }

    /// Lock the underlying connection.
    ///
    /// A poisoned lock means a writer panicked mid-statement; the store is
    /// reported as unavailable rather than trusted.
    pub(crate) fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::StoreUnavailable("connection lock poisoned".to_string()))
    }

    // ============================================
    // Member operations
    // ============================================

    /// Get a member by ID
    pub fn get_member(&self, id: i64) -> Result<Option<Member>> {
        let conn = self.connection()?;
        conn.query_row(
            &format!("SELECT {MEMBER_COLUMNS} FROM members WHERE id = ?"),
            [id],
            Self::row_to_member,
        )
        .optional()
        .map_err(Error::from)
    }

    /// All members ordered by name
    pub fn list_members(&self) -> Result<Vec<Member>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members ORDER BY last_name, given_names"
        ))?;
        let members = stmt
            .query_map([], Self::row_to_member)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(members)
    }

    /// Members linked to a group, ordered by name
    pub fn list_group_members(&self, group_id: i64) -> Result<Vec<Member>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT m.id, m.last_name, m.given_names, m.contact, m.email,
                   m.residence, m.school, m.track, m.registered_at
            FROM members m
            JOIN group_members gm ON gm.member_id = m.id
            WHERE gm.group_id = ?
            ORDER BY m.last_name, m.given_names
            "#,
        )?;
        let members = stmt
            .query_map([group_id], Self::row_to_member)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(members)
    }

    pub(crate) fn insert_member(&self, member: &NewMember) -> Result<i64> {
        let registered_at = member
            .registered_at
            .unwrap_or_else(|| Local::now().naive_local());
        let conn = self.connection()?;
        conn.execute(
            r#"
            INSERT INTO members (last_name, given_names, contact, email, residence, school, track, registered_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                member.last_name,
                member.given_names,
                member.contact,
                member.email,
                member.residence,
                member.school,
                member.track,
                format_timestamp(&registered_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub(crate) fn update_member(&self, id: i64, update: &MemberUpdate) -> Result<()> {
        let conn = self.connection()?;
        let changed = conn.execute(
            r#"
            UPDATE members SET
                last_name = COALESCE(?2, last_name),
                given_names = COALESCE(?3, given_names),
                contact = COALESCE(?4, contact),
                email = COALESCE(?5, email),
                residence = COALESCE(?6, residence),
                school = COALESCE(?7, school),
                track = COALESCE(?8, track),
                registered_at = COALESCE(?9, registered_at)
            WHERE id = ?1
            "#,
            params![
                id,
                update.last_name,
                update.given_names,
                update.contact,
                update.email,
                update.residence,
                update.school,
                update.track,
                update.registered_at.as_ref().map(format_timestamp),
            ],
        )?;
        if changed == 0 {
            return Err(Error::MemberNotFound(id));
        }
        Ok(())
    }

    pub(crate) fn delete_member(&self, id: i64) -> Result<()> {
        let conn = self.connection()?;
        let changed = conn.execute("DELETE FROM members WHERE id = ?", [id])?;
        if changed == 0 {
            return Err(Error::MemberNotFound(id));
        }
        Ok(())
    }

    fn row_to_member(row: &Row) -> rusqlite::Result<Member> {
        let registered_at: Option<String> = row.get("registered_at")?;

        Ok(Member {
            id: row.get("id")?,
            last_name: row.get("last_name")?,
            given_names: row.get("given_names")?,
            contact: row.get("contact")?,
            email: row.get("email")?,
            residence: row.get("residence")?,
            school: row.get("school")?,
            track: row.get("track")?,
            registered_at: registered_at.as_deref().and_then(parse_timestamp),
        })
    }

    // ============================================
    // Group operations
    // ============================================

    /// Get a group by ID, with its member count
    pub fn get_group(&self, id: i64) -> Result<Option<Group>> {
        let conn = self.connection()?;
        conn.query_row(
            r#"
            SELECT g.id, g.name, g.description, g.color, g.created_at,
                   (SELECT COUNT(*) FROM group_members gm WHERE gm.group_id = g.id) AS member_count
            FROM groups g
            WHERE g.id = ?
            "#,
            [id],
            Self::row_to_group,
        )
        .optional()
        .map_err(Error::from)
    }

    /// Get a group by its unique name
    pub fn get_group_by_name(&self, name: &str) -> Result<Option<Group>> {
        let conn = self.connection()?;
        conn.query_row(
            r#"
            SELECT g.id, g.name, g.description, g.color, g.created_at,
                   (SELECT COUNT(*) FROM group_members gm WHERE gm.group_id = g.id) AS member_count
            FROM groups g
            WHERE g.name = ?
            "#,
            [name],
            Self::row_to_group,
        )
        .optional()
        .map_err(Error::from)
    }

    /// All groups ordered by name, each with its member count
    pub fn list_groups(&self) -> Result<Vec<Group>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT g.id, g.name, g.description, g.color, g.created_at,
                   (SELECT COUNT(*) FROM group_members gm WHERE gm.group_id = g.id) AS member_count
            FROM groups g
            ORDER BY g.name
            "#,
        )?;
        let groups = stmt
            .query_map([], Self::row_to_group)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(groups)
    }

    /// Member IDs linked to a group
    pub fn list_group_member_ids(&self, group_id: i64) -> Result<Vec<i64>> {
        let conn = self.connection()?;
        let mut stmt =
            conn.prepare("SELECT member_id FROM group_members WHERE group_id = ? ORDER BY member_id")?;
        let ids = stmt
            .query_map([group_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    pub(crate) fn insert_group(&self, group: &NewGroup) -> Result<i64> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO groups (name, description, color) VALUES (?1, ?2, ?3)",
            params![group.name, group.description, group.color],
        )
        .map_err(|e| Self::map_group_name_conflict(e, &group.name))?;
        Ok(conn.last_insert_rowid())
    }

    pub(crate) fn update_group(&self, id: i64, update: &GroupUpdate) -> Result<()> {
        let conn = self.connection()?;
        let changed = conn
            .execute(
                r#"
                UPDATE groups SET
                    name = COALESCE(?2, name),
                    description = COALESCE(?3, description),
                    color = COALESCE(?4, color)
                WHERE id = ?1
                "#,
                params![id, update.name, update.description, update.color],
            )
            .map_err(|e| Self::map_group_name_conflict(e, update.name.as_deref().unwrap_or("")))?;
        if changed == 0 {
            return Err(Error::GroupNotFound(id));
        }
        Ok(())
    }

    pub(crate) fn delete_group(&self, id: i64) -> Result<()> {
        let conn = self.connection()?;
        let changed = conn.execute("DELETE FROM groups WHERE id = ?", [id])?;
        if changed == 0 {
            return Err(Error::GroupNotFound(id));
        }
        Ok(())
    }

    /// Link a member to a group. Linking twice is a no-op.
    pub(crate) fn add_group_member(&self, group_id: i64, member_id: i64) -> Result<()> {
        let conn = self.connection()?;
        let group_exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM groups WHERE id = ?)",
            [group_id],
            |r| r.get(0),
        )?;
        if !group_exists {
            return Err(Error::GroupNotFound(group_id));
        }
        let member_exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM members WHERE id = ?)",
            [member_id],
            |r| r.get(0),
        )?;
        if !member_exists {
            return Err(Error::MemberNotFound(member_id));
        }

        conn.execute(
            "INSERT OR IGNORE INTO group_members (group_id, member_id) VALUES (?1, ?2)",
            params![group_id, member_id],
        )?;
        Ok(())
    }

    pub(crate) fn remove_group_member(&self, group_id: i64, member_id: i64) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "DELETE FROM group_members WHERE group_id = ?1 AND member_id = ?2",
            params![group_id, member_id],
        )?;
        Ok(())
    }

    fn map_group_name_conflict(e: rusqlite::Error, name: &str) -> Error {
        match &e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Error::DuplicateGroupName(name.to_string())
            }
            _ => Error::from(e),
        }
    }

    fn row_to_group(row: &Row) -> rusqlite::Result<Group> {
        let created_at: Option<String> = row.get("created_at")?;

        Ok(Group {
            id: row.get("id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            color: row.get("color")?,
            created_at: created_at.as_deref().and_then(parse_timestamp),
            member_count: row.get("member_count")?,
        })
    }

    // ============================================
    // Event operations
    // ============================================

    /// Get an event by ID
    pub fn get_event(&self, id: i64) -> Result<Option<Event>> {
        let conn = self.connection()?;
        conn.query_row(
            &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?"),
            [id],
            Self::row_to_event,
        )
        .optional()
        .map_err(Error::from)
    }

    /// All events, most recent first; or upcoming events (date >= `today`),
    /// soonest first.
    pub fn list_events(&self, upcoming_only: bool, today: NaiveDate) -> Result<Vec<Event>> {
        let conn = self.connection()?;
        let events = if upcoming_only {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM events WHERE date >= ? ORDER BY date, time"
            ))?;
            let rows = stmt
                .query_map([today.format("%Y-%m-%d").to_string()], Self::row_to_event)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        } else {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM events ORDER BY date DESC, time DESC"
            ))?;
            let rows = stmt
                .query_map([], Self::row_to_event)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        Ok(events)
    }

    pub(crate) fn insert_event(&self, event: &NewEvent) -> Result<i64> {
        let conn = self.connection()?;
        conn.execute(
            r#"
            INSERT INTO events (name, date, time, location, description, group_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                event.name,
                event.date.format("%Y-%m-%d").to_string(),
                event.time,
                event.location,
                event.description,
                event.group_id,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub(crate) fn delete_event(&self, id: i64) -> Result<()> {
        let conn = self.connection()?;
        let changed = conn.execute("DELETE FROM events WHERE id = ?", [id])?;
        if changed == 0 {
            return Err(Error::EventNotFound(id));
        }
        Ok(())
    }

    fn row_to_event(row: &Row) -> rusqlite::Result<Event> {
        Ok(Event {
            id: row.get("id")?,
            name: row.get("name")?,
            date: Self::date_column(row, "date")?,
            time: row.get("time")?,
            location: row.get("location")?,
            description: row.get("description")?,
            group_id: row.get("group_id")?,
        })
    }

    // ============================================
    // Attendance operations
    // ============================================

    /// Every attendance record
    pub fn list_attendance(&self) -> Result<Vec<AttendanceRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance ORDER BY date DESC, id"
        ))?;
        let records = stmt
            .query_map([], Self::row_to_attendance)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Attendance records of one member, most recent first
    pub fn list_member_attendance(&self, member_id: i64) -> Result<Vec<AttendanceRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE member_id = ? ORDER BY date DESC, id"
        ))?;
        let records = stmt
            .query_map([member_id], Self::row_to_attendance)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Attendance records of one event, most recent first
    pub fn list_event_attendance(&self, event_id: i64) -> Result<Vec<AttendanceRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE event_id = ? ORDER BY date DESC, id"
        ))?;
        let records = stmt
            .query_map([event_id], Self::row_to_attendance)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Number of attendance records for a member
    pub fn count_member_attendance(&self, member_id: i64) -> Result<i64> {
        let conn = self.connection()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM attendance WHERE member_id = ?",
            [member_id],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    /// Number of attendance records marked present for a member
    pub fn count_member_present(&self, member_id: i64) -> Result<i64> {
        let conn = self.connection()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM attendance WHERE member_id = ? AND present = 1",
            [member_id],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    pub(crate) fn insert_attendance(
        &self,
        member_id: i64,
        event_id: Option<i64>,
        present: bool,
        date: NaiveDate,
    ) -> Result<i64> {
        let conn = self.connection()?;
        let member_exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM members WHERE id = ?)",
            [member_id],
            |r| r.get(0),
        )?;
        if !member_exists {
            return Err(Error::MemberNotFound(member_id));
        }
        if let Some(event_id) = event_id {
            let event_exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM events WHERE id = ?)",
                [event_id],
                |r| r.get(0),
            )?;
            if !event_exists {
                return Err(Error::EventNotFound(event_id));
            }
        }

        conn.execute(
            r#"
            INSERT INTO attendance (member_id, event_id, date, present)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                member_id,
                event_id,
                date.format("%Y-%m-%d").to_string(),
                present,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub(crate) fn update_attendance_presence(&self, id: i64, present: bool) -> Result<()> {
        let conn = self.connection()?;
        let changed = conn.execute(
            "UPDATE attendance SET present = ?2 WHERE id = ?1",
            params![id, present],
        )?;
        if changed == 0 {
            return Err(Error::AttendanceNotFound(id));
        }
        Ok(())
    }

    pub(crate) fn delete_attendance(&self, id: i64) -> Result<()> {
        let conn = self.connection()?;
        let changed = conn.execute("DELETE FROM attendance WHERE id = ?", [id])?;
        if changed == 0 {
            return Err(Error::AttendanceNotFound(id));
        }
        Ok(())
    }

    fn row_to_attendance(row: &Row) -> rusqlite::Result<AttendanceRecord> {
        let present: i64 = row.get("present")?;

        Ok(AttendanceRecord {
            id: row.get("id")?,
            member_id: row.get("member_id")?,
            event_id: row.get("event_id")?,
            date: Self::date_column(row, "date")?,
            present: present == 1,
        })
    }

    /// Read a `YYYY-MM-DD` column; a malformed value fails the whole row.
    fn date_column(row: &Row, name: &str) -> rusqlite::Result<NaiveDate> {
        let raw: String = row.get(name)?;
        let idx = row.as_ref().column_index(name)?;
        NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }
}

impl AttendanceStore for Database {
    fn check_connection(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))
            .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        Ok(())
    }

    fn get_all_members(&self) -> Result<Vec<Member>> {
        self.list_members()
    }

    fn get_members_of_group(&self, group_id: i64) -> Result<Vec<Member>> {
        self.list_group_members(group_id)
    }

    fn get_group_member_ids(&self, group_id: i64) -> Result<Vec<i64>> {
        self.list_group_member_ids(group_id)
    }

    fn get_all_groups(&self) -> Result<Vec<Group>> {
        self.list_groups()
    }

    fn get_all_events(&self, upcoming_only: bool) -> Result<Vec<Event>> {
        self.list_events(upcoming_only, Local::now().date_naive())
    }

    fn get_all_attendance(&self) -> Result<Vec<AttendanceRecord>> {
        self.list_attendance()
    }

    fn get_attendance_for_member(&self, member_id: i64) -> Result<Vec<AttendanceRecord>> {
        self.list_member_attendance(member_id)
    }

    fn get_attendance_for_event(&self, event_id: i64) -> Result<Vec<AttendanceRecord>> {
        self.list_event_attendance(event_id)
    }

    fn count_attendance(&self, member_id: i64) -> Result<i64> {
        self.count_member_attendance(member_id)
    }

    fn count_present(&self, member_id: i64) -> Result<i64> {
        self.count_member_present(member_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    fn new_member(last: &str, school: &str) -> NewMember {
        NewMember {
            last_name: last.to_string(),
            given_names: "Test".to_string(),
            school: school.to_string(),
            registered_at: Some(
                NaiveDateTime::parse_from_str("2025-01-15T09:00:00", "%Y-%m-%dT%H:%M:%S").unwrap(),
            ),
            ..Default::default()
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn new_event(name: &str, on: &str) -> NewEvent {
        NewEvent {
            name: name.to_string(),
            date: date(on),
            time: "18:00".to_string(),
            location: "Main hall".to_string(),
            description: String::new(),
            group_id: None,
        }
    }

    #[test]
    fn test_member_crud() {
        let db = test_db();

        let id = db.insert_member(&new_member("Konan", "INP-HB")).unwrap();
        let member = db.get_member(id).unwrap().unwrap();
        assert_eq!(member.last_name, "Konan");
        assert_eq!(member.school, "INP-HB");
        assert_eq!(
            member.registered_at.unwrap().date(),
            date("2025-01-15")
        );

        db.update_member(
            id,
            &MemberUpdate {
                school: Some("ESATIC".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        let member = db.get_member(id).unwrap().unwrap();
        assert_eq!(member.school, "ESATIC");
        assert_eq!(member.last_name, "Konan");

        db.delete_member(id).unwrap();
        assert!(db.get_member(id).unwrap().is_none());
        assert!(matches!(
            db.delete_member(id),
            Err(Error::MemberNotFound(_))
        ));
    }

    #[test]
    fn test_unparseable_registration_reads_as_none() {
        let db = test_db();
        let id = db.insert_member(&new_member("Yao", "")).unwrap();
        db.connection()
            .unwrap()
            .execute(
                "UPDATE members SET registered_at = 'not a date' WHERE id = ?",
                [id],
            )
            .unwrap();

        let member = db.get_member(id).unwrap().unwrap();
        assert!(member.registered_at.is_none());
    }

    #[test]
    fn test_group_member_count_and_links() {
        let db = test_db();
        let a = db.insert_member(&new_member("Aka", "")).unwrap();
        let b = db.insert_member(&new_member("Bamba", "")).unwrap();
        let group = db
            .insert_group(&NewGroup {
                name: "Choir".to_string(),
                color: "#059669".to_string(),
                ..Default::default()
            })
            .unwrap();
        let empty = db
            .insert_group(&NewGroup {
                name: "Archive".to_string(),
                ..Default::default()
            })
            .unwrap();

        db.add_group_member(group, a).unwrap();
        db.add_group_member(group, b).unwrap();
        // Second link is ignored
        db.add_group_member(group, b).unwrap();

        let groups = db.list_groups().unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].id, empty);
        assert_eq!(groups[0].member_count, 0);
        assert_eq!(groups[1].member_count, 2);

        assert_eq!(db.list_group_member_ids(group).unwrap(), vec![a, b]);
        assert_eq!(db.list_group_members(group).unwrap().len(), 2);

        db.remove_group_member(group, a).unwrap();
        assert_eq!(db.get_group(group).unwrap().unwrap().member_count, 1);

        assert!(matches!(
            db.add_group_member(group, 9999),
            Err(Error::MemberNotFound(9999))
        ));
    }

    #[test]
    fn test_duplicate_group_name() {
        let db = test_db();
        let group = NewGroup {
            name: "Choir".to_string(),
            ..Default::default()
        };
        db.insert_group(&group).unwrap();

        let err = db.insert_group(&group).unwrap_err();
        assert!(matches!(err, Error::DuplicateGroupName(name) if name == "Choir"));
    }

    #[test]
    fn test_events_upcoming_filter_and_order() {
        let db = test_db();
        db.insert_event(&new_event("Past", "2025-01-10")).unwrap();
        db.insert_event(&new_event("Today", "2025-06-01")).unwrap();
        db.insert_event(&new_event("Later", "2025-07-01")).unwrap();

        let all = db.list_events(false, date("2025-06-01")).unwrap();
        let names: Vec<_> = all.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Later", "Today", "Past"]);

        let upcoming = db.list_events(true, date("2025-06-01")).unwrap();
        let names: Vec<_> = upcoming.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Today", "Later"]);
    }

    #[test]
    fn test_malformed_event_date_fails_read() {
        let db = test_db();
        db.insert_event(&new_event("Broken", "2025-01-10")).unwrap();
        db.connection()
            .unwrap()
            .execute("UPDATE events SET date = '10/01/2025'", [])
            .unwrap();

        assert!(db.list_events(false, date("2025-06-01")).is_err());
    }

    #[test]
    fn test_attendance_counts() {
        let db = test_db();
        let m = db.insert_member(&new_member("Coulibaly", "")).unwrap();
        let e = db.insert_event(&new_event("Rehearsal", "2025-02-01")).unwrap();

        db.insert_attendance(m, Some(e), true, date("2025-02-01")).unwrap();
        db.insert_attendance(m, Some(e), false, date("2025-02-01")).unwrap();
        let id = db.insert_attendance(m, None, true, date("2025-02-08")).unwrap();

        assert_eq!(db.count_member_attendance(m).unwrap(), 3);
        assert_eq!(db.count_member_present(m).unwrap(), 2);
        assert_eq!(db.list_event_attendance(e).unwrap().len(), 2);
        assert_eq!(db.list_member_attendance(m).unwrap()[0].id, id);

        db.update_attendance_presence(id, false).unwrap();
        assert_eq!(db.count_member_present(m).unwrap(), 1);

        db.delete_attendance(id).unwrap();
        assert_eq!(db.count_member_attendance(m).unwrap(), 2);
    }

    #[test]
    fn test_deleting_event_keeps_attendance() {
        let db = test_db();
        let m = db.insert_member(&new_member("Diomandé", "")).unwrap();
        let e = db.insert_event(&new_event("Retreat", "2025-03-01")).unwrap();
        db.insert_attendance(m, Some(e), true, date("2025-03-01")).unwrap();

        db.delete_event(e).unwrap();

        let records = db.list_member_attendance(m).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_id, None);
    }

    #[test]
    fn test_deleting_member_cascades_attendance() {
        let db = test_db();
        let m = db.insert_member(&new_member("Ehui", "")).unwrap();
        db.insert_attendance(m, None, true, date("2025-03-01")).unwrap();

        db.delete_member(m).unwrap();
        assert!(db.list_attendance().unwrap().is_empty());
    }

    #[test]
    fn test_attendance_rejects_unknown_member() {
        let db = test_db();
        let err = db
            .insert_attendance(42, None, true, date("2025-03-01"))
            .unwrap_err();
        assert!(matches!(err, Error::MemberNotFound(42)));
    }
}
