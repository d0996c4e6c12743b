//! Pluggable document-to-data extraction.
//!
//! An [`ExtractionProvider`] turns a document image into a raw mapping of
//! candidate record fields. Backends only implement [`ExtractionProvider::execute`];
//! the shared `extract` wrapper handles prompting, parsing, timing, counting and
//! error capture, so ordinary failures never surface as `Err`.

pub mod anthropic;
pub mod error;
pub mod http;
pub mod openai;
pub mod prompt;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use secrecy::SecretString;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, info_span, warn};

pub use anthropic::AnthropicProvider;
pub use error::ProviderError;
pub use openai::OpenAiProvider;
pub use prompt::{build_extraction_prompt, parse_model_output};

use crate::config::{ProviderConfig, ProviderKind};
use crate::sanitize::{redact_path, redact_url};
use crate::secrets::{resolve_secret, resolve_secret_optional, SecretError};

/// Fields a model is asked to fill; the fallback confidence is the share present.
pub const EXPECTED_FIELDS: [&str; 7] = [
    "date",
    "transaction_type",
    "category",
    "vendor_customer",
    "description",
    "amount",
    "tax_amount",
];

/// Fields without which no record can be built.
pub const REQUIRED_FIELDS: [&str; 3] = ["date", "transaction_type", "amount"];

/// Outcome of one extraction call.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResponse {
    pub data: Map<String, Value>,
    pub success: bool,
    pub confidence: f64,
    pub provider: String,
    pub elapsed: Duration,
    pub error: Option<String>,
}

impl ExtractionResponse {
    pub fn succeeded(
        provider: &str,
        data: Map<String, Value>,
        confidence: f64,
        elapsed: Duration,
    ) -> Self {
        Self {
            data,
            success: true,
            confidence: confidence.clamp(0.0, 1.0),
            provider: provider.to_string(),
            elapsed,
            error: None,
        }
    }

    pub fn failed(provider: &str, error: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            data: Map::new(),
            success: false,
            confidence: 0.0,
            provider: provider.to_string(),
            elapsed,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    requests: u64,
    errors: u64,
}

/// Per-instance request/error counters.
#[derive(Debug, Default)]
pub struct ProviderStats {
    counters: Mutex<Counters>,
}

impl ProviderStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, success: bool) {
        let mut counters = self.lock();
        counters.requests += 1;
        if !success {
            counters.errors += 1;
        }
    }

    pub fn snapshot(&self, provider: &str) -> StatsSnapshot {
        let counters = *self.lock();
        let success_rate = if counters.requests > 0 {
            (counters.requests - counters.errors) as f64 / counters.requests as f64
        } else {
            0.0
        };
        StatsSnapshot {
            provider: provider.to_string(),
            request_count: counters.requests,
            error_count: counters.errors,
            success_rate,
        }
    }

    pub fn reset(&self) {
        *self.lock() = Counters::default();
    }

    // Counters stay meaningful even if a holder panicked.
    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub provider: String,
    pub request_count: u64,
    pub error_count: u64,
    pub success_rate: f64,
}

pub trait ExtractionProvider: Send + Sync {
    /// Identifier reported in responses and statistics.
    fn name(&self) -> &str;

    fn stats(&self) -> &ProviderStats;

    /// Sends one request and returns the model's raw reply text.
    fn execute(&self, document_path: &Path, prompt: &str) -> Result<String, ProviderError>;

    fn build_prompt(&self, allowed_categories: &[&str]) -> String {
        build_extraction_prompt(allowed_categories)
    }

    fn extract(&self, document_path: &Path, allowed_categories: &[&str]) -> ExtractionResponse {
        let span = info_span!(
            "extract",
            provider = self.name(),
            document = %redact_path(document_path)
        );
        let _guard = span.enter();
        let started = Instant::now();

        let outcome = if allowed_categories.is_empty() {
            Err(ProviderError::EmptyCategories)
        } else {
            let prompt = self.build_prompt(allowed_categories);
            self.execute(document_path, &prompt)
                .and_then(|reply| parse_model_output(&reply))
        };
        let elapsed = started.elapsed();

        let response = match outcome {
            Ok(mut data) => {
                let confidence = take_confidence(&mut data);
                debug!(
                    confidence,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Extraction succeeded"
                );
                ExtractionResponse::succeeded(self.name(), data, confidence, elapsed)
            }
            Err(e) => {
                warn!(error = %e, "Extraction failed");
                ExtractionResponse::failed(self.name(), e.to_string(), elapsed)
            }
        };

        self.stats().record(response.success);
        response
    }

    fn validate_response(&self, raw: &Map<String, Value>) -> bool {
        validate_response(raw)
    }

    fn get_stats(&self) -> StatsSnapshot {
        self.stats().snapshot(self.name())
    }

    fn reset_stats(&self) {
        self.stats().reset();
    }
}

/// True iff the required fields are filled and the type is a known value.
pub fn validate_response(raw: &Map<String, Value>) -> bool {
    if !REQUIRED_FIELDS.iter().all(|f| is_filled(raw.get(*f))) {
        return false;
    }
    matches!(
        raw.get("transaction_type")
            .and_then(Value::as_str)
            .map(|t| t.trim().to_lowercase())
            .as_deref(),
        Some("income") | Some("expense")
    )
}

/// Removes the model's self-reported confidence from `data`, falling back to
/// the fraction of expected fields that were filled.
fn take_confidence(data: &mut Map<String, Value>) -> f64 {
    let reported = data
        .remove("confidence")
        .and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
        .filter(|c| c.is_finite());

    match reported {
        Some(confidence) => confidence.clamp(0.0, 1.0),
        None => {
            let filled = EXPECTED_FIELDS
                .iter()
                .filter(|f| is_filled(data.get(**f)))
                .count();
            filled as f64 / EXPECTED_FIELDS.len() as f64
        }
    }
}

fn is_filled(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

/// Builds the backend described by `config`.
pub fn provider_from_config(
    config: &ProviderConfig,
) -> Result<Arc<dyn ExtractionProvider>, ProviderSetupError> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let api_key = resolve_api_key(config)?;

    let base_url = config.base_url.as_deref().unwrap_or(match config.kind {
        ProviderKind::Openai => openai::DEFAULT_BASE_URL,
        ProviderKind::Anthropic => anthropic::DEFAULT_BASE_URL,
    });

    let provider: Arc<dyn ExtractionProvider> = match config.kind {
        ProviderKind::Openai => Arc::new(OpenAiProvider::with_options(
            api_key,
            &config.model,
            base_url,
            timeout,
        )?),
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::with_options(
            api_key,
            &config.model,
            base_url,
            timeout,
        )?),
    };

    info!(
        provider = provider.name(),
        model = %config.model,
        endpoint = %redact_url(base_url),
        timeout_secs = config.timeout_secs,
        "Extraction provider configured"
    );
    Ok(provider)
}

/// Local compatible servers often take no key; vendor endpoints require one.
fn resolve_api_key(config: &ProviderConfig) -> Result<SecretString, SecretError> {
    let direct = config.api_key.as_deref();
    let file = config.api_key_file.as_deref();
    let env = config.api_key_env.as_deref();

    if config.base_url.is_some() {
        Ok(resolve_secret_optional(direct, file, env)?.unwrap_or_else(|| SecretString::from("")))
    } else {
        resolve_secret(direct, file, env)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderSetupError {
    #[error("Failed to resolve API key: {0}")]
    Secret(#[from] SecretError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}
