//! HTTP plumbing shared by the network backends.

use std::path::Path;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::Value;

use super::error::ProviderError;

/// Maximum length of an error body quoted in messages and logs.
const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Default bound on a single extraction request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// A document image ready to embed in a request body.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub media_type: String,
    pub data: String,
}

impl EncodedImage {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }
}

pub fn build_client(timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::Client(e.to_string()))
}

pub fn encode_image(path: &Path) -> Result<EncodedImage, ProviderError> {
    let bytes = std::fs::read(path).map_err(|e| ProviderError::ReadDocument {
        path: path.to_path_buf(),
        source: e,
    })?;
    let media_type = mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();

    Ok(EncodedImage {
        media_type,
        data: STANDARD.encode(bytes),
    })
}

/// Sends `request` and returns the decoded JSON body of a 2xx response.
pub fn send_json(request: RequestBuilder, timeout: Duration) -> Result<Value, ProviderError> {
    let response = request
        .send()
        .map_err(|e| transport_error(e, timeout))?;
    let status = response.status();
    let body = response.text().map_err(|e| transport_error(e, timeout))?;

    if !status.is_success() {
        return Err(status_error(status.as_u16(), &body));
    }

    serde_json::from_str(&body)
        .map_err(|e| ProviderError::InvalidResponse(format!("response body is not JSON: {}", e)))
}

pub fn status_error(status: u16, body: &str) -> ProviderError {
    let message = truncate_body(body);
    match status {
        401 | 403 => ProviderError::Authentication(message),
        429 => ProviderError::RateLimited(message),
        _ => ProviderError::Api { status, message },
    }
}

fn transport_error(error: reqwest::Error, timeout: Duration) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout(timeout)
    } else {
        ProviderError::Transport(error.to_string())
    }
}

/// Truncates an error body so provider responses cannot flood the logs.
fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() > MAX_ERROR_BODY_LENGTH {
        let head: String = trimmed.chars().take(MAX_ERROR_BODY_LENGTH).collect();
        format!("{}... (truncated)", head)
    } else {
        trimmed.to_string()
    }
}
