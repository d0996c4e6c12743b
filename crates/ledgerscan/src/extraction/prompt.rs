//! Prompt construction and model-reply parsing shared by every backend.

use std::fmt::Write;

use serde_json::{Map, Value};

use super::error::ProviderError;

/// Date format the model is told to use, in human-readable form.
pub const PROMPT_DATE_FORMAT: &str = "YYYY-MM-DD";

/// Output fields the model must fill, with their instructions.
pub const OUTPUT_FIELDS: &[(&str, &str)] = &[
    (
        "date",
        "transaction date in YYYY-MM-DD format (for example 2025-01-15)",
    ),
    ("transaction_type", "exactly \"income\" or \"expense\""),
    (
        "category",
        "exactly one of the allowed categories below, copied verbatim",
    ),
    (
        "vendor_customer",
        "the business that issued a receipt, or the customer billed on an invoice",
    ),
    ("description", "a short description of what was bought or sold"),
    (
        "amount",
        "the total amount as a plain number without currency symbols",
    ),
    (
        "tax_amount",
        "the total sales tax (GST/HST/VAT/sales tax) as a plain number, 0 if none",
    ),
    ("document_type", "\"invoice\", \"receipt\" or \"other\""),
    ("confidence", "your confidence in the extraction, from 0.0 to 1.0"),
];

/// Builds the extraction instructions for `allowed_categories`.
pub fn build_extraction_prompt(allowed_categories: &[&str]) -> String {
    let mut prompt = String::new();

    prompt.push_str(
        "You are a bookkeeping assistant. Extract the single financial transaction \
         shown in the attached document image.\n\n",
    );
    prompt.push_str(
        "Respond with ONLY one JSON object (no Markdown, no commentary) containing \
         exactly these fields:\n",
    );
    // Writing to a String cannot fail.
    for (name, instruction) in OUTPUT_FIELDS {
        let _ = writeln!(prompt, "- \"{}\": {}", name, instruction);
    }

    let _ = write!(
        prompt,
        "\nDATES: always write the date as {fmt}. Never use DD/MM/YYYY, MM/DD/YYYY \
         or month names.\n",
        fmt = PROMPT_DATE_FORMAT
    );

    prompt.push_str("\nAllowed categories (use one of these EXACTLY as written):\n");
    for category in allowed_categories {
        let _ = writeln!(prompt, "- {}", category);
    }

    prompt.push_str(
        "\nCRITICAL RULE - TRANSACTION TYPE (MANDATORY, NO EXCEPTIONS):\n\
         - An INVOICE means INCOME. If the document is an invoice, \"transaction_type\" \
         MUST be \"income\".\n\
         - A RECEIPT means EXPENSE. If the document is a receipt, \"transaction_type\" \
         MUST be \"expense\".\n\
         This rule ALWAYS overrides anything else you infer from the document.\n",
    );

    prompt.push_str("\nUse null for any field you cannot read.\n");
    prompt
}

/// Pulls the JSON object out of a model reply.
///
/// Models sometimes wrap the object in a Markdown fence or add prose around
/// it, so the first opening brace that starts a complete JSON object wins and
/// anything after that object is ignored.
pub fn parse_model_output(text: &str) -> Result<Map<String, Value>, ProviderError> {
    let mut first_error = None;

    for (start, _) in text.match_indices('{') {
        let mut values = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match values.next() {
            Some(Ok(Value::Object(map))) => return Ok(map),
            Some(Ok(_)) | None => {}
            Some(Err(e)) => {
                first_error.get_or_insert(e);
            }
        }
    }

    Err(ProviderError::InvalidResponse(match first_error {
        Some(e) => format!("malformed JSON in model output: {}", e),
        None => "no JSON object in model output".to_string(),
    }))
}
