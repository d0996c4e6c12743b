//! Anthropic Messages API backend.

use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::debug;

use super::error::ProviderError;
use super::http::{build_client, encode_image, send_json, EncodedImage, DEFAULT_TIMEOUT};
use super::prompt::build_extraction_prompt;
use super::{ExtractionProvider, ProviderStats};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

pub struct AnthropicProvider {
    client: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
    timeout: Duration,
    stats: ProviderStats,
}

impl AnthropicProvider {
    pub fn new(api_key: SecretString, model: &str) -> Result<Self, ProviderError> {
        Self::with_options(api_key, model, DEFAULT_BASE_URL, DEFAULT_TIMEOUT)
    }

    pub fn with_options(
        api_key: SecretString,
        model: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(timeout)?,
            api_key,
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            stats: ProviderStats::new(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, image: &EncodedImage, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": image.media_type,
                            "data": image.data
                        }
                    },
                    {"type": "text", "text": prompt}
                ]
            }]
        })
    }
}

/// Concatenates the text blocks of a Messages response.
fn reply_text(body: &Value) -> Result<String, ProviderError> {
    let blocks = body
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::InvalidResponse("response has no content".to_string()))?;

    let text: String = blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .collect();

    if text.is_empty() {
        return Err(ProviderError::InvalidResponse(
            "response has no text block".to_string(),
        ));
    }
    Ok(text)
}

impl ExtractionProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn stats(&self) -> &ProviderStats {
        &self.stats
    }

    fn build_prompt(&self, allowed_categories: &[&str]) -> String {
        let mut prompt = build_extraction_prompt(allowed_categories);
        prompt.push_str("\nYour reply must start with '{' and end with '}'.\n");
        prompt
    }

    fn execute(&self, document_path: &Path, prompt: &str) -> Result<String, ProviderError> {
        let image = encode_image(document_path)?;
        let url = format!("{}/v1/messages", self.base_url);
        debug!(model = %self.model, media_type = %image.media_type, "Sending message");

        let request = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .json(&self.request_body(&image, prompt));

        let body = send_json(request, self.timeout)?;
        reply_text(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(base_url: &str) -> AnthropicProvider {
        AnthropicProvider::with_options(
            SecretString::from("sk-ant-test"),
            "claude-3-5-sonnet-latest",
            base_url,
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[test]
    fn test_request_body_has_base64_image_block() {
        let provider = provider(DEFAULT_BASE_URL);
        let image = EncodedImage {
            media_type: "image/jpeg".to_string(),
            data: "BBBB".to_string(),
        };
        let body = provider.request_body(&image, "extract");
        let source = &body["messages"][0]["content"][0]["source"];
        assert_eq!(source["type"], "base64");
        assert_eq!(source["media_type"], "image/jpeg");
        assert_eq!(source["data"], "BBBB");
        assert_eq!(body["messages"][0]["content"][1]["text"], "extract");
    }

    #[test]
    fn test_reply_text_joins_text_blocks() {
        let body = serde_json::json!({
            "content": [
                {"type": "text", "text": "{\"amount\":"},
                {"type": "text", "text": " 2}"}
            ]
        });
        assert_eq!(reply_text(&body).unwrap(), "{\"amount\": 2}");
        assert!(reply_text(&serde_json::json!({"content": []})).is_err());
        assert!(reply_text(&serde_json::json!({"error": "x"})).is_err());
    }

    #[test]
    fn test_prompt_extends_shared_helper() {
        let provider = provider(DEFAULT_BASE_URL);
        let prompt = provider.build_prompt(&["Travel"]);
        assert!(prompt.starts_with(&build_extraction_prompt(&["Travel"])));
        assert!(prompt.contains("must start with '{'"));
    }

    #[test]
    fn test_unreachable_server_yields_unsuccessful_response() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("invoice.jpg");
        std::fs::write(&image, b"\xFF\xD8 fake").unwrap();

        let provider = provider("http://127.0.0.1:9");
        let response = provider.extract(&image, &["Sales"]);

        assert!(!response.success);
        assert_eq!(response.provider, "anthropic");
        assert_eq!(provider.get_stats().error_count, 1);
    }
}
