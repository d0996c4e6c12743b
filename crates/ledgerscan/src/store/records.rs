//! Record CRUD, filtered queries and text search.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::ToSql;
use rusqlite::{params, Row};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::{RecordStore, StoreError};
use crate::record::{round_money, Record, RecordFields, RecordId, TransactionType, DATE_FORMAT};

pub(crate) const COLUMNS: &str = "id, date, type, category, vendor_customer, description, \
     amount, tax_amount, source_document, created_at, modified_at";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortColumn {
    #[default]
    Date,
    Amount,
    Category,
    VendorCustomer,
    CreatedAt,
    Id,
}

impl SortColumn {
    fn column(&self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::Amount => "amount",
            Self::Category => "category",
            Self::VendorCustomer => "vendor_customer",
            Self::CreatedAt => "created_at",
            Self::Id => "id",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    fn keyword(&self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// Conjunctive record filter. Every bound is inclusive; unset fields do not
/// restrict. Results are sorted by `sort` then by id, so `limit`/`offset`
/// windows partition an unchanged dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub transaction_type: Option<TransactionType>,
    pub category: Option<String>,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub sort: SortColumn,
    pub direction: SortDirection,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn between(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    pub fn of_type(mut self, transaction_type: TransactionType) -> Self {
        self.transaction_type = Some(transaction_type);
        self
    }

    pub fn in_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn amount_between(mut self, min: Decimal, max: Decimal) -> Self {
        self.min_amount = Some(min);
        self.max_amount = Some(max);
        self
    }

    pub fn page(mut self, limit: u32, offset: u32) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }

    pub fn sorted_by(mut self, sort: SortColumn, direction: SortDirection) -> Self {
        self.sort = sort;
        self.direction = direction;
        self
    }

    /// Builds the WHERE clause and its positional parameters.
    fn where_clause(&self) -> Result<(String, Vec<Box<dyn ToSql>>), StoreError> {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(start) = self.start_date {
            conditions.push(format!("date >= ?{}", param_values.len() + 1));
            param_values.push(Box::new(start.format(DATE_FORMAT).to_string()));
        }
        if let Some(end) = self.end_date {
            conditions.push(format!("date <= ?{}", param_values.len() + 1));
            param_values.push(Box::new(end.format(DATE_FORMAT).to_string()));
        }
        if let Some(kind) = self.transaction_type {
            conditions.push(format!("type = ?{}", param_values.len() + 1));
            param_values.push(Box::new(kind.as_str()));
        }
        if let Some(category) = &self.category {
            conditions.push(format!("category = ?{}", param_values.len() + 1));
            param_values.push(Box::new(category.clone()));
        }
        // Stored amounts are whole cents, so bounds snap inward to cents.
        if let Some(min) = self.min_amount {
            conditions.push(format!("amount >= ?{}", param_values.len() + 1));
            param_values.push(Box::new(bound_cents("min_amount", min, Decimal::ceil)?));
        }
        if let Some(max) = self.max_amount {
            conditions.push(format!("amount <= ?{}", param_values.len() + 1));
            param_values.push(Box::new(bound_cents("max_amount", max, Decimal::floor)?));
        }

        let clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        Ok((clause, param_values))
    }

    fn order_clause(&self) -> String {
        let primary = format!("{} {}", self.sort.column(), self.direction.keyword());
        if self.sort == SortColumn::Id {
            format!("ORDER BY {}", primary)
        } else {
            format!("ORDER BY {}, id ASC", primary)
        }
    }
}

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Raw `records` row, before the record rules are re-applied.
pub(crate) struct RecordRow {
    pub(crate) id: RecordId,
    date: String,
    kind: String,
    category: String,
    vendor_customer: Option<String>,
    description: Option<String>,
    amount: i64,
    tax_amount: i64,
    source_document: Option<String>,
    created_at: String,
    modified_at: String,
}

impl RecordRow {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            date: row.get("date")?,
            kind: row.get("type")?,
            category: row.get("category")?,
            vendor_customer: row.get("vendor_customer")?,
            description: row.get("description")?,
            amount: row.get("amount")?,
            tax_amount: row.get("tax_amount")?,
            source_document: row.get("source_document")?,
            created_at: row.get("created_at")?,
            modified_at: row.get("modified_at")?,
        })
    }

    pub(crate) fn into_record(self) -> Result<Record, StoreError> {
        let id = self.id;
        let corrupt = |reason: String| StoreError::CorruptRecord { id, reason };

        let record = Record::new(RecordFields {
            date: self.date,
            transaction_type: self.kind,
            category: self.category,
            vendor_customer: self.vendor_customer,
            description: self.description,
            amount: from_cents(self.amount),
            tax_amount: from_cents(self.tax_amount),
            source_document: self.source_document,
        })
        .map_err(|e| corrupt(e.to_string()))?;

        let created_at = parse_timestamp(&self.created_at).map_err(corrupt)?;
        let modified_at = parse_timestamp(&self.modified_at).map_err(corrupt)?;
        Ok(record.persisted(id, created_at, modified_at))
    }
}

pub(crate) fn collect_records(rows: Vec<RecordRow>) -> Result<Vec<Record>, StoreError> {
    rows.into_iter().map(RecordRow::into_record).collect()
}

/// Converts a money amount to whole cents for storage.
pub(crate) fn to_cents(field: &'static str, value: Decimal) -> Result<i64, StoreError> {
    round_money(value)
        .checked_mul(HUNDRED)
        .and_then(|cents| cents.to_i64())
        .ok_or(StoreError::AmountOutOfRange { field, value })
}

pub(crate) fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

fn bound_cents(
    field: &'static str,
    value: Decimal,
    snap: fn(&Decimal) -> Decimal,
) -> Result<i64, StoreError> {
    value
        .checked_mul(HUNDRED)
        .map(|cents| snap(&cents))
        .and_then(|cents| cents.to_i64())
        .ok_or(StoreError::AmountOutOfRange { field, value })
}

fn timestamp_text(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp '{}': {}", text, e))
}

impl RecordStore {
    /// Persists `record` under a new id. Any id the value already carries is
    /// ignored.
    pub fn create(&self, record: &Record) -> Result<RecordId, StoreError> {
        let amount = to_cents("amount", record.amount())?;
        let tax_amount = to_cents("tax_amount", record.tax_amount())?;
        let now = timestamp_text(Utc::now());

        let id = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO records (date, type, category, vendor_customer, description,
                 amount, tax_amount, source_document, created_at, modified_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    record.date_string(),
                    record.transaction_type().as_str(),
                    record.category(),
                    record.vendor_customer(),
                    record.description(),
                    amount,
                    tax_amount,
                    record.source_document(),
                    now,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        log::debug!("Created record {}: {}", id, record);
        Ok(id)
    }

    pub fn get(&self, id: RecordId) -> Result<Option<Record>, StoreError> {
        let row = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {} FROM records WHERE id = ?1", COLUMNS))?;
            let mut rows = stmt.query_map(params![id], RecordRow::from_row)?;
            match rows.next() {
                Some(row) => Ok(Some(row?)),
                None => Ok(None),
            }
        })?;
        row.map(RecordRow::into_record).transpose()
    }

    /// Overwrites the stored business fields of `record` and refreshes
    /// `modified_at`. Returns false if the record has no id or the id is
    /// unknown.
    pub fn update(&self, record: &Record) -> Result<bool, StoreError> {
        let Some(id) = record.id() else {
            return Ok(false);
        };
        let amount = to_cents("amount", record.amount())?;
        let tax_amount = to_cents("tax_amount", record.tax_amount())?;
        let now = timestamp_text(Utc::now());

        let changed = self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE records SET date = ?1, type = ?2, category = ?3, vendor_customer = ?4,
                 description = ?5, amount = ?6, tax_amount = ?7, source_document = ?8,
                 modified_at = ?9
                 WHERE id = ?10",
                params![
                    record.date_string(),
                    record.transaction_type().as_str(),
                    record.category(),
                    record.vendor_customer(),
                    record.description(),
                    amount,
                    tax_amount,
                    record.source_document(),
                    now,
                    id,
                ],
            )?;
            Ok(changed)
        })?;

        if changed == 0 {
            log::debug!("Update skipped: record {} does not exist", id);
        }
        Ok(changed > 0)
    }

    pub fn delete(&self, id: RecordId) -> Result<bool, StoreError> {
        let changed = self.db.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM records WHERE id = ?1", params![id])?)
        })?;
        if changed > 0 {
            log::debug!("Deleted record {}", id);
        }
        Ok(changed > 0)
    }

    pub fn query(&self, filter: &RecordFilter) -> Result<Vec<Record>, StoreError> {
        let (where_clause, mut param_values) = filter.where_clause()?;

        let mut sql = format!(
            "SELECT {} FROM records {} {}",
            COLUMNS,
            where_clause,
            filter.order_clause()
        );
        if filter.limit.is_some() || filter.offset.is_some() {
            // SQLite needs a LIMIT before OFFSET; -1 means unbounded.
            let limit = filter.limit.map(i64::from).unwrap_or(-1);
            let offset = i64::from(filter.offset.unwrap_or(0));
            sql.push_str(&format!(
                " LIMIT ?{} OFFSET ?{}",
                param_values.len() + 1,
                param_values.len() + 2
            ));
            param_values.push(Box::new(limit));
            param_values.push(Box::new(offset));
        }

        let rows = self.db.with_conn(|conn| {
            let params_ref: Vec<&dyn ToSql> = param_values.iter().map(|p| p.as_ref()).collect();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_ref.as_slice(), RecordRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        collect_records(rows)
    }

    /// Number of records matching `filter`, ignoring `limit` and `offset`.
    pub fn count(&self, filter: &RecordFilter) -> Result<u64, StoreError> {
        let (where_clause, param_values) = filter.where_clause()?;
        let sql = format!("SELECT COUNT(*) FROM records {}", where_clause);

        self.db.with_conn(|conn| {
            let params_ref: Vec<&dyn ToSql> = param_values.iter().map(|p| p.as_ref()).collect();
            let count: i64 = conn.query_row(&sql, params_ref.as_slice(), |r| r.get(0))?;
            Ok(count as u64)
        })
    }

    /// Case-insensitive substring search over description and vendor/customer,
    /// ordered by date.
    pub fn search(&self, term: &str) -> Result<Vec<Record>, StoreError> {
        let needle = term.trim().to_lowercase();

        // SQLite's LIKE only folds ASCII, so matching happens here.
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM records
                 WHERE description IS NOT NULL OR vendor_customer IS NOT NULL
                 ORDER BY date ASC, id ASC",
                COLUMNS
            ))?;
            let rows = stmt
                .query_map([], RecordRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        let contains = |text: &Option<String>| {
            text.as_deref()
                .is_some_and(|t| t.to_lowercase().contains(&needle))
        };
        let hits: Vec<RecordRow> = rows
            .into_iter()
            .filter(|row| contains(&row.description) || contains(&row.vendor_customer))
            .collect();

        collect_records(hits)
    }
}
