//! Anthropic Claude API client implementation
//!
//! Implements [`LlmClient`](super::LlmClient) over the Messages API. Vision
//! completions attach the screenshot as a base64 image source block.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{LlmClient, LlmError};
use crate::config::LlmConfig;

/// Anthropic Claude API client
pub struct AnthropicClient {
    model: String,
    vision_model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
}

impl AnthropicClient {
    /// Create a new client from configuration
    ///
    /// Reads the API key from the environment variable specified in config.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| LlmError::InvalidResponse(format!("Environment variable {} not set", config.api_key_env)))?;

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(LlmError::Network)?;

        Ok(Self {
            model: config.model.clone(),
            vision_model: config.vision_model.clone().unwrap_or_else(|| config.model.clone()),
            api_key,
            base_url: config.base_url.clone(),
            http,
            max_tokens: config.max_tokens,
        })
    }

    async fn post_messages(&self, body: serde_json::Value) -> Result<String, LlmError> {
        let url = format!("{}/v1/messages", self.base_url);
        debug!(%url, "AnthropicClient: sending request");

        let response = self
            .http
            .post(url)
            .header("x-api-key", self.api_key.clone())
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if response.status().as_u16() == 429 {
            // Rate limited - extract retry-after header
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);

            return Err(LlmError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError { status, message: text });
        }

        let api_response: AnthropicResponse = response.json().await?;
        let text = api_response
            .content
            .into_iter()
            .find_map(|block| match block {
                AnthropicContentBlock::Text { text } => Some(text),
            })
            .ok_or_else(|| LlmError::InvalidResponse("response contained no text block".to_string()))?;

        debug!(len = text.len(), "AnthropicClient: response received");
        Ok(text)
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete_text(&self, prompt: &str) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        });
        self.post_messages(body).await
    }

    async fn complete_vision(&self, prompt: &str, image_jpeg: &[u8]) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model": self.vision_model,
            "max_tokens": self.max_tokens,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": "image/jpeg",
                            "data": BASE64.encode(image_jpeg),
                        }
                    },
                    {"type": "text", "text": prompt}
                ]
            }],
        });
        self.post_messages(body).await
    }
}

/// Response shape from the Messages API (text blocks only; the planner
/// never requests tool use)
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text { text: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_config_requires_api_key_env() {
        let config = LlmConfig {
            api_key_env: "DESKPILOT_TEST_MISSING_KEY".to_string(),
            ..Default::default()
        };
        assert!(AnthropicClient::from_config(&config).is_err());
    }

    #[test]
    #[serial]
    fn test_from_config_with_key() {
        unsafe { std::env::set_var("DESKPILOT_TEST_KEY", "k") };
        let config = LlmConfig {
            api_key_env: "DESKPILOT_TEST_KEY".to_string(),
            vision_model: Some("claude-vision-test".to_string()),
            ..Default::default()
        };
        let client = AnthropicClient::from_config(&config).unwrap();
        assert_eq!(client.vision_model, "claude-vision-test");
        unsafe { std::env::remove_var("DESKPILOT_TEST_KEY") };
    }

    #[test]
    fn test_response_parse() {
        let json = r#"{"content": [{"type": "text", "text": "hello"}]}"#;
        let parsed: AnthropicResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.content.len(), 1);
    }
}
