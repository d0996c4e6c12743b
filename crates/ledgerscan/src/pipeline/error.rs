use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::record::RecordError;

/// Why a document was rejected. Never returned to callers of `process`;
/// logged and listed in the process report.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to read document '{path}': {source}")]
    ReadDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create scratch directory: {0}")]
    Scratch(#[source] std::io::Error),

    #[error("PDF processing failed: {0}")]
    Pdf(String),

    #[error("Image processing failed: {0}")]
    Image(String),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Invalid extracted record: {0}")]
    InvalidRecord(#[from] RecordError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Internal failure during {step}: {message}")]
    Panicked { step: &'static str, message: String },
}

/// Non-blocking findings attached to an otherwise processed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineWarning {
    /// The document type the model saw disagrees with the transaction type.
    TypeMismatch {
        document_type: String,
        transaction_type: String,
    },
    /// The response lacked a required field or had an unknown type.
    IncompleteResponse,
}

impl std::fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TypeMismatch {
                document_type,
                transaction_type,
            } => write!(
                f,
                "document looks like a {} but was extracted as {}",
                document_type, transaction_type
            ),
            Self::IncompleteResponse => f.write_str("response is missing required fields"),
        }
    }
}
