//! Jurisdiction-scoped category whitelists.
//!
//! Each supported tax authority has a fixed, ordered list of bookkeeping
//! categories. Extraction prompts enumerate the list in this order, and
//! validation checks membership against it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canada Revenue Agency, form T2125 lines.
const CRA_CATEGORIES: &[&str] = &[
    "Sales",
    "Fees for services",
    "Commissions",
    "Other income",
    "Advertising",
    "Meals and entertainment",
    "Bad debts",
    "Insurance",
    "Interest and bank charges",
    "Business taxes, licences and memberships",
    "Office expenses",
    "Office stationery and supplies",
    "Professional fees",
    "Management and administration fees",
    "Rent",
    "Repairs and maintenance",
    "Salaries, wages, and benefits",
    "Property taxes",
    "Travel",
    "Telephone and utilities",
    "Fuel costs",
    "Delivery, freight and express",
    "Motor vehicle expenses",
    "Capital cost allowance",
    "Other expenses",
];

/// Internal Revenue Service, Schedule C lines.
const IRS_CATEGORIES: &[&str] = &[
    "Gross receipts",
    "Returns and allowances",
    "Other income",
    "Advertising",
    "Car and truck expenses",
    "Commissions and fees",
    "Contract labor",
    "Depreciation",
    "Employee benefit programs",
    "Insurance",
    "Interest",
    "Legal and professional services",
    "Office expense",
    "Pension and profit-sharing plans",
    "Rent or lease",
    "Repairs and maintenance",
    "Supplies",
    "Taxes and licenses",
    "Travel",
    "Meals",
    "Utilities",
    "Wages",
    "Other expenses",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CategoryError {
    #[error("Unknown jurisdiction '{0}' (expected one of: CRA, IRS)")]
    UnknownJurisdiction(String),
}

/// Tax authority whose rules decide which categories are allowed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum Jurisdiction {
    #[default]
    Cra,
    Irs,
}

impl Jurisdiction {
    /// Resolves a jurisdiction tag, case-insensitively.
    pub fn from_tag(tag: &str) -> Result<Self, CategoryError> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "CRA" => Ok(Self::Cra),
            "IRS" => Ok(Self::Irs),
            _ => Err(CategoryError::UnknownJurisdiction(tag.to_string())),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Cra => "CRA",
            Self::Irs => "IRS",
        }
    }

    /// ISO 4217 currency used for reports under this jurisdiction.
    pub fn currency(&self) -> &'static str {
        match self {
            Self::Cra => "CAD",
            Self::Irs => "USD",
        }
    }

    pub fn categories(&self) -> &'static [&'static str] {
        match self {
            Self::Cra => CRA_CATEGORIES,
            Self::Irs => IRS_CATEGORIES,
        }
    }

    /// Exact, case-sensitive membership test.
    pub fn allows(&self, category: &str) -> bool {
        self.categories().contains(&category)
    }
}

impl fmt::Display for Jurisdiction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl TryFrom<String> for Jurisdiction {
    type Error = CategoryError;

    fn try_from(tag: String) -> Result<Self, Self::Error> {
        Self::from_tag(&tag)
    }
}

impl FromStr for Jurisdiction {
    type Err = CategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s)
    }
}

/// Checks `category` against the whitelist selected by `jurisdiction_tag`.
///
/// An unrecognized tag is an error rather than a fallback to some default
/// whitelist.
pub fn is_valid_category(jurisdiction_tag: &str, category: &str) -> Result<bool, CategoryError> {
    Ok(Jurisdiction::from_tag(jurisdiction_tag)?.allows(category))
}

/// Returns the whitelist for `jurisdiction_tag`.
pub fn categories_for(jurisdiction_tag: &str) -> Result<&'static [&'static str], CategoryError> {
    Ok(Jurisdiction::from_tag(jurisdiction_tag)?.categories())
}
