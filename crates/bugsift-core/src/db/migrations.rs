//! Schema migrations driven by `PRAGMA user_version`.

use super::schema;
use rusqlite::{Connection, types::Type};

/// Latest schema version understood by this binary.
pub const LATEST_SCHEMA_VERSION: u32 = 2;

const MIGRATIONS: &[(u32, &str)] = &[(1, schema::MIGRATION_V1_SQL), (2, schema::MIGRATION_V2_SQL)];

/// Read `PRAGMA user_version` as a `u32`.
///
/// # Errors
///
/// Returns an error if querying SQLite fails or the stored value is negative.
pub fn current_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    u32::try_from(version).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(error))
    })
}

/// Apply all pending migrations in ascending order, each in its own
/// transaction.
///
/// # Errors
///
/// Returns an error if any migration fails.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<u32> {
    let mut current = current_schema_version(conn)?;

    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", i64::from(*version))?;
        tx.commit()?;
        tracing::info!(version, "applied schema migration");
        current = *version;
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::{LATEST_SCHEMA_VERSION, current_schema_version, migrate};
    use crate::db::schema;
    use rusqlite::{Connection, params};

    fn sqlite_object_exists(
        conn: &Connection,
        object_type: &str,
        object_name: &str,
    ) -> rusqlite::Result<bool> {
        conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = ?1 AND name = ?2
            )",
            params![object_type, object_name],
            |row| row.get(0),
        )
    }

    #[test]
    fn migrate_empty_db_to_latest() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;

        let applied = migrate(&mut conn)?;
        assert_eq!(applied, LATEST_SCHEMA_VERSION);
        assert_eq!(current_schema_version(&conn)?, LATEST_SCHEMA_VERSION);

        for table in ["reports", "duplicate_history", "audit_log", "low_quality_queue"] {
            assert!(sqlite_object_exists(&conn, "table", table)?, "missing table {table}");
        }
        for index in schema::REQUIRED_INDEXES {
            assert!(
                sqlite_object_exists(&conn, "index", index)?,
                "missing expected index {index}"
            );
        }
        for trigger in schema::REQUIRED_TRIGGERS {
            assert!(
                sqlite_object_exists(&conn, "trigger", trigger)?,
                "missing expected trigger {trigger}"
            );
        }

        Ok(())
    }

    #[test]
    fn migrate_is_idempotent() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;

        assert_eq!(migrate(&mut conn)?, LATEST_SCHEMA_VERSION);
        assert_eq!(migrate(&mut conn)?, LATEST_SCHEMA_VERSION);
        Ok(())
    }

    #[test]
    fn migrate_upgrades_from_v1_keeping_rows() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;

        conn.execute_batch(schema::MIGRATION_V1_SQL)?;
        conn.pragma_update(None, "user_version", 1_i64)?;
        conn.execute(
            "INSERT INTO duplicate_history (
                match_method, submission_json, was_blocked, recorded_at_us
            ) VALUES ('hybrid', '{}', 0, 1)",
            [],
        )?;

        assert_eq!(migrate(&mut conn)?, LATEST_SCHEMA_VERSION);

        let rows: i64 =
            conn.query_row("SELECT COUNT(*) FROM duplicate_history", [], |row| row.get(0))?;
        assert_eq!(rows, 1);
        assert!(sqlite_object_exists(&conn, "table", "low_quality_queue")?);
        Ok(())
    }

    #[test]
    fn history_rejects_update_and_delete() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;
        migrate(&mut conn)?;
        conn.execute(
            "INSERT INTO duplicate_history (
                match_method, submission_json, was_blocked, recorded_at_us
            ) VALUES ('vector', '{}', 0, 1)",
            [],
        )?;

        let update = conn.execute("UPDATE duplicate_history SET note = 'edited'", []);
        assert!(update.is_err());
        let delete = conn.execute("DELETE FROM duplicate_history", []);
        assert!(delete.is_err());
        Ok(())
    }

    #[test]
    fn reports_enforce_parent_invariant() -> rusqlite::Result<()> {
        let mut conn = Connection::open_in_memory()?;
        migrate(&mut conn)?;
        let orphan_duplicate = conn.execute(
            "INSERT INTO reports (
                report_id, title, description, tag, created_at_us, updated_at_us
            ) VALUES ('bug-0000000001', 't', 'd', 'duplicate', 1, 1)",
            [],
        );
        assert!(orphan_duplicate.is_err());
        Ok(())
    }
}
