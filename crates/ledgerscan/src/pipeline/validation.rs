//! Turning raw backend output into a record, and the checks run on it.

use std::str::FromStr;

use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use tracing::warn;

use super::error::PipelineWarning;
use crate::record::{decimal_from_number, Jurisdiction, Record, RecordError, RecordFields};

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥', '₹'];

/// Builds record input from a backend response.
///
/// Null or empty amounts become zero; text amounts may carry a currency
/// symbol, a currency code or thousands separators. The transaction type
/// is trimmed and lower-cased. A missing date or type is an error.
pub fn normalize_fields(
    raw: &Map<String, Value>,
    source_document: Option<&str>,
) -> Result<RecordFields, RecordError> {
    let type_value = raw.get("transaction_type").or_else(|| raw.get("type"));

    Ok(RecordFields {
        date: text(raw.get("date"))
            .map(|d| d.trim().to_string())
            .ok_or(RecordError::MissingField("date"))?,
        transaction_type: text(type_value)
            .map(|t| t.trim().to_lowercase())
            .ok_or(RecordError::MissingField("type"))?,
        category: text(raw.get("category")).unwrap_or_default(),
        vendor_customer: text(raw.get("vendor_customer")),
        description: text(raw.get("description")),
        amount: money(raw.get("amount"), "amount")?,
        tax_amount: money(raw.get("tax_amount"), "tax_amount")?,
        source_document: source_document.map(String::from),
    })
}

/// Non-empty text of a string value. Numbers are accepted for free-text
/// fields since models sometimes emit invoice numbers as such.
fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn money(value: Option<&Value>, field: &'static str) -> Result<Decimal, RecordError> {
    let invalid = |value: String| RecordError::InvalidNumber { field, value };
    match value {
        None | Some(Value::Null) => Ok(Decimal::ZERO),
        Some(Value::Number(n)) => decimal_from_number(n).ok_or_else(|| invalid(n.to_string())),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(Decimal::ZERO),
        Some(Value::String(s)) => {
            let cleaned: String = s
                .trim()
                .trim_start_matches(|c: char| c.is_ascii_alphabetic())
                .trim_end_matches(|c: char| c.is_ascii_alphabetic())
                .chars()
                .filter(|c| !CURRENCY_SYMBOLS.contains(c) && *c != ',' && !c.is_whitespace())
                .collect();
            Decimal::from_str(&cleaned)
                .or_else(|_| Decimal::from_scientific(&cleaned))
                .map_err(|_| invalid(s.clone()))
        }
        Some(other) => Err(invalid(other.to_string())),
    }
}

/// Checks an extracted record against bookkeeping rules.
///
/// A zero amount or a category outside the jurisdiction's list makes the
/// record invalid. A missing category or vendor, tax above the amount and a
/// future date are reported without invalidating it.
pub fn validate_extraction(record: &Record, jurisdiction: Jurisdiction) -> (bool, Vec<String>) {
    validate_as_of(record, jurisdiction, Local::now().date_naive())
}

fn validate_as_of(
    record: &Record,
    jurisdiction: Jurisdiction,
    today: NaiveDate,
) -> (bool, Vec<String>) {
    let mut valid = true;
    let mut messages = Vec::new();

    if record.amount().is_zero() {
        valid = false;
        messages.push("Amount is zero; the document amount could not be read".to_string());
    }

    if record.category().is_empty() {
        messages.push("Warning: no category was extracted".to_string());
    } else if !jurisdiction.allows(record.category()) {
        valid = false;
        messages.push(format!(
            "Category '{}' is not a valid {} category",
            record.category(),
            jurisdiction.tag()
        ));
    }

    if record.vendor_customer().is_none() {
        messages.push("Warning: no vendor or customer was extracted".to_string());
    }

    if record.tax_amount() > record.amount() {
        messages.push(format!(
            "Warning: tax amount {} exceeds amount {}",
            record.tax_amount(),
            record.amount()
        ));
    }

    if record.date() > today {
        messages.push(format!(
            "Warning: date {} is in the future",
            record.date_string()
        ));
    }

    (valid, messages)
}

/// Compares the model's `document_type` with the transaction type: an
/// invoice should be income and a receipt an expense. Logged, never blocking.
pub fn consistency_check(raw: &Map<String, Value>) -> Option<PipelineWarning> {
    let document_type = raw.get("document_type")?.as_str()?.trim().to_lowercase();
    let transaction_type = raw
        .get("transaction_type")
        .or_else(|| raw.get("type"))
        .and_then(Value::as_str)
        .map(|t| t.trim().to_lowercase())
        .unwrap_or_default();

    let expected = match document_type.as_str() {
        "invoice" => "income",
        "receipt" => "expense",
        _ => return None,
    };
    if transaction_type == expected {
        return None;
    }

    warn!(
        document_type = %document_type,
        transaction_type = %transaction_type,
        "Document type disagrees with transaction type"
    );
    Some(PipelineWarning::TypeMismatch {
        document_type,
        transaction_type,
    })
}
