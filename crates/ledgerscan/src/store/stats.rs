//! Aggregates for reporting: per-type totals, per-category sums and the
//! combined report summary.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rusqlite::types::ToSql;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use super::records::from_cents;
use super::{RecordStore, StoreError};
use crate::record::{Jurisdiction, TransactionType, DATE_FORMAT};

/// Summed amount per category, ordered by category name.
pub type CategorySummary = BTreeMap<String, Decimal>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypeTotals {
    pub count: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub income: TypeTotals,
    pub expense: TypeTotals,
    /// Income total minus expense total.
    #[serde(with = "rust_decimal::serde::float")]
    pub net: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    ProfitAndLoss,
    Income,
    Expense,
    Tax,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportMetadata {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub report_type: ReportType,
    pub jurisdiction: Jurisdiction,
    pub currency: String,
}

impl ReportMetadata {
    /// Metadata for `jurisdiction`, using its reporting currency.
    pub fn new(
        start_date: NaiveDate,
        end_date: NaiveDate,
        report_type: ReportType,
        jurisdiction: Jurisdiction,
    ) -> Self {
        Self {
            start_date,
            end_date,
            report_type,
            jurisdiction,
            currency: jurisdiction.currency().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub metadata: ReportMetadata,
    pub statistics: Statistics,
    #[serde(serialize_with = "serialize_amounts")]
    pub income_by_category: CategorySummary,
    #[serde(serialize_with = "serialize_amounts")]
    pub expense_by_category: CategorySummary,
}

fn serialize_amounts<S: Serializer>(amounts: &CategorySummary, s: S) -> Result<S::Ok, S::Error> {
    let mut map = s.serialize_map(Some(amounts.len()))?;
    for (category, amount) in amounts {
        map.serialize_entry(category, &amount.to_f64().unwrap_or_default())?;
    }
    map.end()
}

/// Optional inclusive date bounds as SQL conditions and parameters.
fn date_conditions(range: Option<(NaiveDate, NaiveDate)>) -> (Vec<String>, Vec<Box<dyn ToSql>>) {
    let mut conditions = Vec::new();
    let mut param_values: Vec<Box<dyn ToSql>> = Vec::new();
    if let Some((start, end)) = range {
        conditions.push(format!("date >= ?{}", param_values.len() + 1));
        param_values.push(Box::new(start.format(DATE_FORMAT).to_string()));
        conditions.push(format!("date <= ?{}", param_values.len() + 1));
        param_values.push(Box::new(end.format(DATE_FORMAT).to_string()));
    }
    (conditions, param_values)
}

impl RecordStore {
    pub fn statistics(&self) -> Result<Statistics, StoreError> {
        self.statistics_in(None)
    }

    /// Statistics over records dated within `[start, end]`.
    pub fn statistics_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Statistics, StoreError> {
        self.statistics_in(Some((start, end)))
    }

    pub fn category_summary(
        &self,
        transaction_type: TransactionType,
    ) -> Result<CategorySummary, StoreError> {
        self.category_summary_in(transaction_type, None)
    }

    /// Per-category sums over records dated within `[start, end]`.
    pub fn category_summary_between(
        &self,
        transaction_type: TransactionType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<CategorySummary, StoreError> {
        self.category_summary_in(transaction_type, Some((start, end)))
    }

    /// Statistics and per-category totals for the metadata's date range.
    pub fn report_summary(&self, metadata: &ReportMetadata) -> Result<ReportSummary, StoreError> {
        if metadata.start_date > metadata.end_date {
            return Err(StoreError::InvalidDateRange {
                start: metadata.start_date,
                end: metadata.end_date,
            });
        }
        let range = Some((metadata.start_date, metadata.end_date));

        let summary = ReportSummary {
            metadata: metadata.clone(),
            statistics: self.statistics_in(range)?,
            income_by_category: self.category_summary_in(TransactionType::Income, range)?,
            expense_by_category: self.category_summary_in(TransactionType::Expense, range)?,
        };

        log::debug!(
            "Built {:?} report for {}..{}: net {}",
            metadata.report_type,
            metadata.start_date,
            metadata.end_date,
            summary.statistics.net
        );
        Ok(summary)
    }

    fn statistics_in(
        &self,
        range: Option<(NaiveDate, NaiveDate)>,
    ) -> Result<Statistics, StoreError> {
        let (conditions, param_values) = date_conditions(range);
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let sql = format!(
            "SELECT type, COUNT(*), COALESCE(SUM(amount), 0) FROM records {} GROUP BY type",
            where_clause
        );

        let rows: Vec<(String, i64, i64)> = self.db.with_conn(|conn| {
            let params_ref: Vec<&dyn ToSql> = param_values.iter().map(|p| p.as_ref()).collect();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_ref.as_slice(), |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        let mut stats = Statistics::default();
        for (kind, count, cents) in rows {
            let totals = TypeTotals {
                count: count as u64,
                total: from_cents(cents),
            };
            match kind.as_str() {
                "income" => stats.income = totals,
                "expense" => stats.expense = totals,
                other => log::warn!("Ignoring records with unknown type '{}'", other),
            }
        }
        stats.net = stats.income.total - stats.expense.total;
        Ok(stats)
    }

    fn category_summary_in(
        &self,
        transaction_type: TransactionType,
        range: Option<(NaiveDate, NaiveDate)>,
    ) -> Result<CategorySummary, StoreError> {
        let (mut conditions, mut param_values) = date_conditions(range);
        conditions.push(format!("type = ?{}", param_values.len() + 1));
        param_values.push(Box::new(transaction_type.as_str()));

        let sql = format!(
            "SELECT category, SUM(amount) FROM records WHERE {} GROUP BY category",
            conditions.join(" AND ")
        );

        let rows: Vec<(String, i64)> = self.db.with_conn(|conn| {
            let params_ref: Vec<&dyn ToSql> = param_values.iter().map(|p| p.as_ref()).collect();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_ref.as_slice(), |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        Ok(rows
            .into_iter()
            .map(|(category, cents)| (category, from_cents(cents)))
            .collect())
    }
}
