//! Chat-completions backend (OpenAI and compatible local servers).

use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::debug;

use super::error::ProviderError;
use super::http::{build_client, encode_image, send_json, EncodedImage, DEFAULT_TIMEOUT};
use super::{ExtractionProvider, ProviderStats};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const MAX_TOKENS: u32 = 1024;

pub struct OpenAiProvider {
    client: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
    timeout: Duration,
    stats: ProviderStats,
}

impl OpenAiProvider {
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
            "temperature": 0,
            "response_format": {"type": "json_object"},
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": prompt},
                    {"type": "image_url", "image_url": {"url": image.data_url()}}
                ]
            }]
        })
    }
}

/// Pulls `choices[0].message.content` out of a completion.
fn reply_text(body: &Value) -> Result<String, ProviderError> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            ProviderError::InvalidResponse("completion has no message content".to_string())
        })
}

impl ExtractionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn stats(&self) -> &ProviderStats {
        &self.stats
    }

    fn execute(&self, document_path: &Path, prompt: &str) -> Result<String, ProviderError> {
        let image = encode_image(document_path)?;
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, media_type = %image.media_type, "Sending chat completion");

        let mut request = self.client.post(&url).json(&self.request_body(&image, prompt));
        let key = self.api_key.expose_secret();
        if !key.is_empty() {
            request = request.bearer_auth(key);
        }

        let body = send_json(request, self.timeout)?;
        reply_text(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(base_url: &str) -> OpenAiProvider {
        OpenAiProvider::with_options(
            SecretString::from("sk-test"),
            "gpt-4o-mini",
            base_url,
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[test]
    fn test_request_body_embeds_prompt_and_image() {
        let provider = provider(DEFAULT_BASE_URL);
        let image = EncodedImage {
            media_type: "image/png".to_string(),
            data: "AAAA".to_string(),
        };
        let body = provider.request_body(&image, "extract please");
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["content"][0]["text"], "extract please");
        assert_eq!(
            body["messages"][0]["content"][1]["image_url"]["url"],
            "data:image/png;base64,AAAA"
        );
    }

    #[test]
    fn test_reply_text() {
        let body = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"amount\": 1}"}}]
        });
        assert_eq!(reply_text(&body).unwrap(), "{\"amount\": 1}");
        assert!(matches!(
            reply_text(&serde_json::json!({"choices": []})),
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        assert_eq!(provider("http://localhost:11434/v1/").base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn test_unreachable_server_yields_unsuccessful_response() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("receipt.png");
        std::fs::write(&image, b"\x89PNG fake").unwrap();

        let provider = provider("http://127.0.0.1:9/v1");
        let response = provider.extract(&image, &["Travel"]);

        assert!(!response.success);
        assert_eq!(response.provider, "openai");
        assert!(response.error.is_some());
        let stats = provider.get_stats();
        assert_eq!(stats.request_count, 1);
        assert_eq!(stats.error_count, 1);
    }

    #[test]
    fn test_missing_document_yields_unsuccessful_response() {
        let provider = provider("http://127.0.0.1:9/v1");
        let response = provider.extract(Path::new("/nonexistent/receipt.png"), &["Travel"]);
        assert!(!response.success);
        assert!(response.error.unwrap().contains("Failed to read document"));
    }
}
