//! Extraction backend error types.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Why a backend call did not yield structured data.
///
/// These never escape [`ExtractionProvider::extract`](super::ExtractionProvider::extract);
/// they are rendered into the response's error message and counted.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),

    #[error("Failed to read document '{path}': {source}")]
    ReadDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Allowed category list is empty")]
    EmptyCategories,

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

impl ProviderError {
    /// Whether retrying the same request later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited(_) | Self::Timeout(_) | Self::Transport(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
