//! Record persistence.
//!
//! Uses rusqlite (SQLite) with a thread-safe `Database` handle. All access is
//! serialized through a `Mutex<Connection>`, so every store call is atomic
//! with respect to the persisted state.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

pub mod duplicates;
pub mod error;
pub mod migrations;
pub mod records;
pub mod stats;

pub use error::StoreError;
pub use records::{RecordFilter, SortColumn, SortDirection};
pub use stats::{CategorySummary, ReportMetadata, ReportSummary, ReportType, Statistics, TypeTotals};

/// Thread-safe database handle wrapping a single rusqlite connection.
///
/// Cloning is cheap (inner `Arc`).
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) the database at the given path and runs all
    /// pending migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        migrations::run_all(&mut conn)?;

        log::info!("Database opened at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let mut conn = Connection::open_in_memory()?;
        migrations::run_all(&mut conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Provides locked access to the underlying connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError>,
    {
        let mut conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&mut conn)
    }
}

/// Returns the canonical database path: `~/.ledgerscan/data/ledgerscan.db`.
pub fn default_database_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".ledgerscan")
        .join("data")
        .join("ledgerscan.db")
}

/// CRUD, query, aggregation and duplicate detection over persisted records.
///
/// Operations live in the `records`, `stats` and `duplicates` modules.
#[derive(Clone)]
pub struct RecordStore {
    db: Database,
}

impl RecordStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Schema version recorded in the `settings` table (0 if absent).
    pub fn schema_version(&self) -> Result<u32, StoreError> {
        let stored = self.get_setting(migrations::SCHEMA_VERSION_KEY)?;
        Ok(stored.and_then(|v| v.trim().parse().ok()).unwrap_or(0))
    }

    /// Whether the stored schema is older than this build's.
    pub fn needs_upgrade(&self) -> Result<bool, StoreError> {
        Ok(self.schema_version()? < migrations::latest_version())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.db.with_conn(|conn| migrations::read_setting(conn, key))
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.db
            .with_conn(|conn| migrations::write_setting(conn, key, value))
    }
}
