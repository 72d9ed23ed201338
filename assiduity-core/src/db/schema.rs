//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: members, groups, events, attendance
    r#"
    CREATE TABLE IF NOT EXISTS members (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        last_name        TEXT NOT NULL,
        given_names      TEXT NOT NULL DEFAULT '',
        contact          TEXT NOT NULL DEFAULT '',
        email            TEXT NOT NULL DEFAULT '',
        residence        TEXT NOT NULL DEFAULT '',
        school           TEXT NOT NULL DEFAULT '',
        track            TEXT NOT NULL DEFAULT '',
        -- Kept as text: older rows carry several timestamp shapes
        registered_at    TEXT DEFAULT CURRENT_TIMESTAMP,
        created_at       TEXT DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS groups (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        name             TEXT NOT NULL UNIQUE,
        description      TEXT NOT NULL DEFAULT '',
        color            TEXT NOT NULL DEFAULT '',
        created_at       TEXT DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS group_members (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        group_id         INTEGER NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
        member_id        INTEGER NOT NULL REFERENCES members(id) ON DELETE CASCADE,
        added_at         TEXT DEFAULT CURRENT_TIMESTAMP,

        UNIQUE(group_id, member_id)
    );

    CREATE TABLE IF NOT EXISTS events (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        name             TEXT NOT NULL,
        date             TEXT NOT NULL,
        time             TEXT NOT NULL DEFAULT '',
        location         TEXT NOT NULL DEFAULT '',
        description      TEXT NOT NULL DEFAULT '',
        group_id         INTEGER REFERENCES groups(id) ON DELETE SET NULL,
        created_at       TEXT DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS attendance (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        member_id        INTEGER NOT NULL REFERENCES members(id) ON DELETE CASCADE,
        event_id         INTEGER REFERENCES events(id) ON DELETE SET NULL,
        date             TEXT NOT NULL,
        present          INTEGER NOT NULL DEFAULT 0,
        created_at       TEXT DEFAULT CURRENT_TIMESTAMP
    );
    "#,
    // Version 2: indexes for the statistics queries
    r#"
    CREATE INDEX IF NOT EXISTS idx_group_members_group ON group_members(group_id);
    CREATE INDEX IF NOT EXISTS idx_group_members_member ON group_members(member_id);
    CREATE INDEX IF NOT EXISTS idx_events_date ON events(date);
    CREATE INDEX IF NOT EXISTS idx_attendance_member ON attendance(member_id);
    CREATE INDEX IF NOT EXISTS idx_attendance_event ON attendance(event_id);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let tables = ["members", "groups", "group_members", "events", "attendance"];

        for table in tables {
            let exists: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_foreign_keys() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("PRAGMA foreign_keys = ON", []).unwrap();
        run_migrations(&conn).unwrap();

        let fk_list: Vec<(String, String)> = conn
            .prepare("PRAGMA foreign_key_list(attendance)")
            .unwrap()
            .query_map([], |row| {
                Ok((row.get::<_, String>(2)?, row.get::<_, String>(6)?))
            })
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(
            fk_list
                .iter()
                .any(|(table, on_delete)| table == "members" && on_delete == "CASCADE"),
            "attendance should cascade with members"
        );
        assert!(
            fk_list
                .iter()
                .any(|(table, on_delete)| table == "events" && on_delete == "SET NULL"),
            "attendance should outlive its event"
        );
    }
}
