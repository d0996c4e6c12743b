//! Advisory duplicate detection.

use chrono::{Datelike, Days, NaiveDate};
use rusqlite::params;

use super::records::{collect_records, to_cents, RecordRow, COLUMNS};
use super::{RecordStore, StoreError};
use crate::record::{Record, DATE_FORMAT};

/// Amounts this close (in cents, inclusive) count as the same amount.
const AMOUNT_TOLERANCE_CENTS: i64 = 1;

fn vendor_key(vendor: &str) -> String {
    vendor.trim().to_lowercase()
}

/// Stored dates are four-digit years; wider bounds would not compare as text.
fn bound_text(date: Option<NaiveDate>, fallback: &str) -> String {
    date.filter(|d| (0..=9999).contains(&d.year()))
        .map(|d| d.format(DATE_FORMAT).to_string())
        .unwrap_or_else(|| fallback.to_string())
}

impl RecordStore {
    /// Stored records that look like `candidate`: same vendor/customer
    /// (case-insensitive, trimmed), amount within 0.01 and date within
    /// `window_days` either side. The candidate's own row is excluded.
    ///
    /// A candidate without a vendor has nothing to match on.
    pub fn find_duplicates(
        &self,
        candidate: &Record,
        window_days: u32,
    ) -> Result<Vec<Record>, StoreError> {
        let Some(vendor) = candidate.vendor_customer().map(vendor_key) else {
            return Ok(Vec::new());
        };

        let window = Days::new(u64::from(window_days));
        let earliest = bound_text(candidate.date().checked_sub_days(window), "0000-01-01");
        let latest = bound_text(candidate.date().checked_add_days(window), "9999-12-31");
        let cents = to_cents("amount", candidate.amount())?;
        // Unsaved candidates have no row to exclude.
        let own_id = candidate.id().unwrap_or(0);

        // Vendor names are compared here because SQLite's lower() only folds ASCII.
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM records
                 WHERE date >= ?1 AND date <= ?2
                   AND amount >= ?3 AND amount <= ?4
                   AND vendor_customer IS NOT NULL
                   AND id != ?5
                 ORDER BY date ASC, id ASC",
                COLUMNS
            ))?;
            let rows = stmt
                .query_map(
                    params![
                        earliest,
                        latest,
                        cents.saturating_sub(AMOUNT_TOLERANCE_CENTS),
                        cents.saturating_add(AMOUNT_TOLERANCE_CENTS),
                        own_id,
                    ],
                    RecordRow::from_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        let duplicates = collect_records(rows)?
            .into_iter()
            .filter(|r| r.vendor_customer().map(vendor_key).as_deref() == Some(vendor.as_str()))
            .collect::<Vec<_>>();

        if !duplicates.is_empty() {
            log::info!(
                "Possible duplicate of {}: {} stored record(s) within {} day(s)",
                candidate,
                duplicates.len(),
                window_days
            );
        }
        Ok(duplicates)
    }
}
