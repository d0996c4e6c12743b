//! Builders for model replies and records used across integration tests.

#![allow(dead_code)]

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Map, Value};

use ledgerscan::{Record, RecordFields};

use super::harness::Step;

/// Builder for the JSON a model would send back.
pub struct ReplyBuilder {
    fields: Map<String, Value>,
}

impl ReplyBuilder {
    /// A clean office-supplies receipt.
    pub fn receipt() -> Self {
        let fields = json!({
            "date": "2025-01-15",
            "transaction_type": "expense",
            "category": "Office expenses",
            "vendor_customer": "Staples",
            "description": "Printer paper",
            "amount": 45.99,
            "tax_amount": 5.98,
            "document_type": "receipt",
        });
        Self {
            fields: fields.as_object().cloned().unwrap_or_default(),
        }
    }

    /// A consulting invoice issued to a customer.
    pub fn invoice() -> Self {
        Self::receipt()
            .set("transaction_type", "income")
            .set("category", "Sales")
            .set("vendor_customer", "Acme Corp")
            .set("description", "Consulting, January")
            .set("amount", 2000.0)
            .set("tax_amount", 260.0)
            .set("document_type", "invoice")
    }

    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn remove(mut self, key: &str) -> Self {
        self.fields.remove(key);
        self
    }

    pub fn confidence(self, confidence: f64) -> Self {
        self.set("confidence", confidence)
    }

    pub fn to_json(&self) -> String {
        Value::Object(self.fields.clone()).to_string()
    }

    /// Reply wrapped the way chat models like to answer.
    pub fn fenced(&self) -> String {
        format!("Here is the data:\n```json\n{}\n```", self.to_json())
    }

    pub fn step(&self) -> Step {
        Step::Reply(self.to_json())
    }
}

/// Builder for `Record` instances.
pub struct RecordBuilder {
    fields: RecordFields,
}

impl RecordBuilder {
    pub fn expense(date: &str, category: &str, amount: Decimal) -> Self {
        Self {
            fields: RecordFields {
                date: date.to_string(),
                transaction_type: "expense".to_string(),
                category: category.to_string(),
                amount,
                ..RecordFields::default()
            },
        }
    }

    pub fn income(date: &str, category: &str, amount: Decimal) -> Self {
        let mut builder = Self::expense(date, category, amount);
        builder.fields.transaction_type = "income".to_string();
        builder
    }

    pub fn vendor(mut self, vendor: &str) -> Self {
        self.fields.vendor_customer = Some(vendor.to_string());
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.fields.description = Some(description.to_string());
        self
    }

    pub fn tax(mut self, tax_amount: Decimal) -> Self {
        self.fields.tax_amount = tax_amount;
        self
    }

    pub fn build(self) -> Record {
        Record::new(self.fields).expect("builder produced an invalid record")
    }
}

/// The four January 2025 records used by store tests:
/// advertising 250, office 100, sales 2000 (income), travel 500.
pub fn january_fixture() -> Vec<Record> {
    vec![
        RecordBuilder::expense("2025-01-10", "Advertising", dec!(250))
            .vendor("Google Ads")
            .description("Search campaign")
            .build(),
        RecordBuilder::expense("2025-01-15", "Office expenses", dec!(100))
            .vendor("Staples")
            .description("Printer paper")
            .build(),
        RecordBuilder::income("2025-01-20", "Sales", dec!(2000))
            .vendor("Acme Corp")
            .description("Consulting, January")
            .build(),
        RecordBuilder::expense("2025-01-25", "Travel", dec!(500))
            .vendor("Air Canada")
            .description("Flight to Toronto")
            .build(),
    ]
}
