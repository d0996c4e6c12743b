//! Schema migrations.
//!
//! Applied migrations are tracked in `_migrations`; the highest applied
//! version is mirrored into the `settings` table as `schema_version`.

use rusqlite::{params, Connection, OptionalExtension};

use super::error::StoreError;

pub const SCHEMA_VERSION_KEY: &str = "schema_version";

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// All migrations in order. Each is applied at most once.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_records_table",
        sql: include_str!("sql/001_create_records.sql"),
    },
    Migration {
        version: 2,
        description: "create_settings_table",
        sql: include_str!("sql/002_create_settings.sql"),
    },
    Migration {
        version: 3,
        description: "add_vendor_date_index",
        sql: include_str!("sql/003_add_vendor_index.sql"),
    },
];

/// Schema version this build writes.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Runs all pending migrations, each inside its own transaction.
pub fn run_all(conn: &mut Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        log::info!(
            "Running migration v{}: {}",
            migration.version,
            migration.description
        );

        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql)
            .map_err(|e| StoreError::Migration {
                version: migration.version,
                reason: e.to_string(),
            })?;
        tx.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            params![migration.version, migration.description],
        )?;
        tx.commit()?;
    }

    if latest_version() > current_version {
        write_setting(conn, SCHEMA_VERSION_KEY, &latest_version().to_string())?;
    }

    Ok(())
}

pub(crate) fn read_setting(conn: &Connection, key: &str) -> Result<Option<String>, StoreError> {
    let value = conn
        .query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |r| r.get(0),
        )
        .optional()?;
    Ok(value)
}

pub(crate) fn write_setting(conn: &Connection, key: &str, value: &str) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn migrated() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        run_all(&mut conn).unwrap();
        conn
    }

    #[test]
    fn test_migrations_run_on_fresh_db() {
        let conn = migrated();
        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let mut conn = migrated();
        run_all(&mut conn).unwrap();
        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_schema_version_recorded() {
        let conn = migrated();
        let version = read_setting(&conn, SCHEMA_VERSION_KEY).unwrap();
        assert_eq!(version, Some(latest_version().to_string()));
    }

    #[test]
    fn test_records_table_rejects_negative_amounts() {
        let conn = migrated();
        let result = conn.execute(
            "INSERT INTO records (date, type, amount, created_at, modified_at)
             VALUES ('2025-01-01', 'expense', -1, 'x', 'x')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_setting_upsert() {
        let conn = migrated();
        write_setting(&conn, "currency", "CAD").unwrap();
        write_setting(&conn, "currency", "USD").unwrap();
        assert_eq!(
            read_setting(&conn, "currency").unwrap(),
            Some("USD".to_string())
        );
        assert_eq!(read_setting(&conn, "missing").unwrap(), None);
    }
}
