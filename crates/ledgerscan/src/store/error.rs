//! Record store error types.

use std::path::PathBuf;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::record::RecordId;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    #[error("Database lock poisoned")]
    LockPoisoned,

    /// A stored row no longer satisfies the record rules.
    #[error("Stored record {id} is corrupt: {reason}")]
    CorruptRecord { id: RecordId, reason: String },

    #[error("Field '{field}' value {value} cannot be stored")]
    AmountOutOfRange { field: &'static str, value: Decimal },

    #[error("Invalid date range: {start} is after {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
}
