//! The validated bookkeeping record.
//!
//! A [`Record`] can only be obtained through [`Record::new`] (or
//! [`Record::from_dict`], which funnels into it), so every value in
//! circulation satisfies the field rules: ISO date, known transaction type,
//! non-negative amounts rounded half-up to cents.

pub mod category;

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Number, Value};
use thiserror::Error;

pub use category::{categories_for, is_valid_category, CategoryError, Jurisdiction};

/// `chrono` format of the `date` field.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Store-assigned record identifier (always positive).
pub type RecordId = i64;

/// A field on a record violated one of its construction rules.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("Invalid date '{value}' in field 'date': expected YYYY-MM-DD")]
    InvalidDate { value: String },

    #[error("Invalid transaction type '{value}' in field 'type': expected 'income' or 'expense'")]
    InvalidType { value: String },

    #[error("Field '{field}' must not be negative (got {value})")]
    NegativeAmount { field: &'static str, value: Decimal },

    #[error("Field '{field}' is not a valid number: '{value}'")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Field '{field}' is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl RecordError {
    /// Name of the field that failed validation.
    pub fn field(&self) -> &'static str {
        match self {
            Self::InvalidDate { .. } => "date",
            Self::InvalidType { .. } => "type",
            Self::NegativeAmount { field, .. }
            | Self::InvalidNumber { field, .. }
            | Self::InvalidField { field, .. } => *field,
            Self::MissingField(field) => *field,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = RecordError;

    /// Accepts exactly `income` or `expense`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            other => Err(RecordError::InvalidType {
                value: other.to_string(),
            }),
        }
    }
}

/// Unvalidated input for [`Record::new`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFields {
    pub date: String,
    pub transaction_type: String,
    pub category: String,
    pub vendor_customer: Option<String>,
    pub description: Option<String>,
    pub amount: Decimal,
    pub tax_amount: Decimal,
    pub source_document: Option<String>,
}

/// One income or expense entry.
///
/// Equality and ordering only look at business fields; `id` and the
/// timestamps are store bookkeeping.
#[derive(Debug, Clone)]
pub struct Record {
    id: Option<RecordId>,
    date: NaiveDate,
    transaction_type: TransactionType,
    category: String,
    vendor_customer: Option<String>,
    description: Option<String>,
    amount: Decimal,
    tax_amount: Decimal,
    source_document: Option<String>,
    created_at: Option<DateTime<Utc>>,
    modified_at: Option<DateTime<Utc>>,
}

impl Record {
    /// Validates `fields` and builds a record that has not been persisted yet.
    ///
    /// Amounts are checked for sign first and rounded afterwards, so a value
    /// such as `-0.001` is rejected even though it would round to zero.
    pub fn new(fields: RecordFields) -> Result<Self, RecordError> {
        let date = parse_date(&fields.date)?;
        let transaction_type = TransactionType::from_str(fields.transaction_type.trim())?;
        let amount = check_non_negative("amount", fields.amount)?;
        let tax_amount = check_non_negative("tax_amount", fields.tax_amount)?;

        Ok(Self {
            id: None,
            date,
            transaction_type,
            category: fields.category.trim().to_string(),
            vendor_customer: non_blank(fields.vendor_customer),
            description: non_blank(fields.description),
            amount: round_money(amount),
            tax_amount: round_money(tax_amount),
            source_document: non_blank(fields.source_document),
            created_at: None,
            modified_at: None,
        })
    }

    /// Builds an edited copy that keeps this record's id and timestamps.
    ///
    /// The edit only reaches storage through `RecordStore::update`.
    pub fn revise(&self, fields: RecordFields) -> Result<Self, RecordError> {
        let mut revised = Self::new(fields)?;
        revised.id = self.id;
        revised.created_at = self.created_at;
        revised.modified_at = self.modified_at;
        Ok(revised)
    }

    /// Returns the business fields as editable input.
    pub fn fields(&self) -> RecordFields {
        RecordFields {
            date: self.date_string(),
            transaction_type: self.transaction_type.as_str().to_string(),
            category: self.category.clone(),
            vendor_customer: self.vendor_customer.clone(),
            description: self.description.clone(),
            amount: self.amount,
            tax_amount: self.tax_amount,
            source_document: self.source_document.clone(),
        }
    }

    pub(crate) fn persisted(
        mut self,
        id: RecordId,
        created_at: DateTime<Utc>,
        modified_at: DateTime<Utc>,
    ) -> Self {
        self.id = Some(id);
        self.created_at = Some(created_at);
        self.modified_at = Some(modified_at);
        self
    }

    pub fn id(&self) -> Option<RecordId> {
        self.id
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// The date in `YYYY-MM-DD` form.
    pub fn date_string(&self) -> String {
        self.date.format(DATE_FORMAT).to_string()
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.transaction_type
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn vendor_customer(&self) -> Option<&str> {
        self.vendor_customer.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn tax_amount(&self) -> Decimal {
        self.tax_amount
    }

    pub fn source_document(&self) -> Option<&str> {
        self.source_document.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.modified_at
    }

    /// Flat mapping of every attribute, with amounts as JSON numbers.
    pub fn to_dict(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("id".into(), self.id.map(Value::from).unwrap_or(Value::Null));
        map.insert("date".into(), Value::String(self.date_string()));
        map.insert(
            "type".into(),
            Value::String(self.transaction_type.as_str().to_string()),
        );
        map.insert("category".into(), Value::String(self.category.clone()));
        map.insert("vendor_customer".into(), text_value(&self.vendor_customer));
        map.insert("description".into(), text_value(&self.description));
        map.insert("amount".into(), decimal_value(self.amount));
        map.insert("tax_amount".into(), decimal_value(self.tax_amount));
        map.insert("source_document".into(), text_value(&self.source_document));
        map.insert("created_at".into(), timestamp_value(self.created_at));
        map.insert("modified_at".into(), timestamp_value(self.modified_at));
        map
    }

    /// Inverse of [`Record::to_dict`]. Amounts may be numbers or numeric
    /// strings; `transaction_type` is accepted as an alias for `type`.
    pub fn from_dict(map: &Map<String, Value>) -> Result<Self, RecordError> {
        let type_value = map.get("type").or_else(|| map.get("transaction_type"));

        let fields = RecordFields {
            date: required_text(map.get("date"), "date")?,
            transaction_type: required_text(type_value, "type")?,
            category: optional_text(map.get("category"), "category")?.unwrap_or_default(),
            vendor_customer: optional_text(map.get("vendor_customer"), "vendor_customer")?,
            description: optional_text(map.get("description"), "description")?,
            amount: decimal_field(map.get("amount"), "amount")?
                .ok_or(RecordError::MissingField("amount"))?,
            tax_amount: decimal_field(map.get("tax_amount"), "tax_amount")?
                .unwrap_or(Decimal::ZERO),
            source_document: optional_text(map.get("source_document"), "source_document")?,
        };

        let mut record = Self::new(fields)?;
        record.id = id_field(map.get("id"))?;
        record.created_at = timestamp_field(map.get("created_at"), "created_at")?;
        record.modified_at = timestamp_field(map.get("modified_at"), "modified_at")?;
        Ok(record)
    }

    #[allow(clippy::type_complexity)]
    fn business_key(
        &self,
    ) -> (
        &NaiveDate,
        &TransactionType,
        &str,
        &Option<String>,
        &Option<String>,
        &Decimal,
        &Decimal,
        &Option<String>,
    ) {
        (
            &self.date,
            &self.transaction_type,
            &self.category,
            &self.vendor_customer,
            &self.description,
            &self.amount,
            &self.tax_amount,
            &self.source_document,
        )
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.business_key() == other.business_key()
    }
}

impl Eq for Record {}

impl PartialOrd for Record {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Record {
    /// Date first; remaining business fields only break ties.
    fn cmp(&self, other: &Self) -> Ordering {
        self.business_key().cmp(&other.business_key())
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_dict().serialize(serializer)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} [{}]",
            self.date_string(),
            self.transaction_type,
            self.amount,
            self.category
        )?;
        if let Some(vendor) = &self.vendor_customer {
            write!(f, " {}", vendor)?;
        }
        Ok(())
    }
}

/// Rounds half away from zero to two decimals (half-up for the non-negative
/// amounts records hold).
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Converts a JSON number to a decimal via its textual form, so `13.005`
/// stays `13.005` instead of picking up binary noise.
pub(crate) fn decimal_from_number(number: &Number) -> Option<Decimal> {
    let text = number.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn parse_date(value: &str) -> Result<NaiveDate, RecordError> {
    let trimmed = value.trim();
    let invalid = || RecordError::InvalidDate {
        value: value.to_string(),
    };
    // chrono accepts unpadded fields; the stored form must be exactly 10 chars.
    if trimmed.len() != 10 {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT).map_err(|_| invalid())
}

fn check_non_negative(field: &'static str, value: Decimal) -> Result<Decimal, RecordError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(RecordError::NegativeAmount { field, value });
    }
    Ok(value)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn text_value(value: &Option<String>) -> Value {
    value.clone().map(Value::String).unwrap_or(Value::Null)
}

/// A JSON number when the `f64` reads back as the same amount, otherwise the
/// decimal's exact text.
fn decimal_value(value: Decimal) -> Value {
    value
        .to_f64()
        .and_then(Number::from_f64)
        .filter(|n| decimal_from_number(n) == Some(value))
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(value.to_string()))
}

fn timestamp_value(value: Option<DateTime<Utc>>) -> Value {
    value
        .map(|t| Value::String(t.to_rfc3339()))
        .unwrap_or(Value::Null)
}

fn required_text(value: Option<&Value>, field: &'static str) -> Result<String, RecordError> {
    optional_text(value, field)?.ok_or(RecordError::MissingField(field))
}

fn optional_text(value: Option<&Value>, field: &'static str) -> Result<Option<String>, RecordError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(RecordError::InvalidField {
            field,
            reason: format!("expected a string, got {}", other),
        }),
    }
}

fn decimal_field(value: Option<&Value>, field: &'static str) -> Result<Option<Decimal>, RecordError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => decimal_from_number(n)
            .map(Some)
            .ok_or_else(|| RecordError::InvalidNumber {
                field,
                value: n.to_string(),
            }),
        Some(Value::String(s)) => Decimal::from_str(s.trim())
            .map(Some)
            .map_err(|_| RecordError::InvalidNumber {
                field,
                value: s.clone(),
            }),
        Some(other) => Err(RecordError::InvalidNumber {
            field,
            value: other.to_string(),
        }),
    }
}

fn id_field(value: Option<&Value>) -> Result<Option<RecordId>, RecordError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .filter(|id| *id > 0)
            .map(Some)
            .ok_or_else(|| RecordError::InvalidField {
                field: "id",
                reason: format!("expected a positive integer, got {}", v),
            }),
    }
}

fn timestamp_field(
    value: Option<&Value>,
    field: &'static str,
) -> Result<Option<DateTime<Utc>>, RecordError> {
    match optional_text(value, field)? {
        None => Ok(None),
        Some(text) => DateTime::parse_from_rfc3339(&text)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| RecordError::InvalidField {
                field,
                reason: e.to_string(),
            }),
    }
}
