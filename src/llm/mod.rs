//! LLM client module
//!
//! The planner needs exactly two capabilities from a model provider: plain
//! text completion (intent parsing, protocol generation) and vision
//! completion over a screenshot (navigation analysis). Everything else is
//! provider detail behind [`LlmClient`].

mod anthropic;
mod error;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub use anthropic::AnthropicClient;
pub use error::LlmError;

use crate::config::LlmConfig;

/// Stateless LLM client - each call is independent
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Text in, text out
    async fn complete_text(&self, prompt: &str) -> Result<String, LlmError>;

    /// Text plus one JPEG image in, text out
    async fn complete_vision(&self, prompt: &str, image_jpeg: &[u8]) -> Result<String, LlmError>;
}

/// Create an LLM client based on the provider specified in config
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_client: called");
    match config.provider.as_str() {
        "anthropic" => Ok(Arc::new(AnthropicClient::from_config(config)?)),
        other => Err(LlmError::InvalidResponse(format!(
            "Unknown LLM provider: '{}'. Supported: anthropic",
            other
        ))),
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock LLM client for unit tests: returns scripted responses in order
    pub struct MockLlmClient {
        responses: Mutex<Vec<String>>,
        call_count: AtomicUsize,
        vision_calls: AtomicUsize,
    }

    impl MockLlmClient {
        pub fn new(responses: Vec<String>) -> Self {
            Self {
                responses: Mutex::new(responses),
                call_count: AtomicUsize::new(0),
                vision_calls: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        pub fn vision_calls(&self) -> usize {
            self.vision_calls.load(Ordering::SeqCst)
        }

        fn next(&self) -> Result<String, LlmError> {
            let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .get(idx)
                .cloned()
                .ok_or_else(|| LlmError::InvalidResponse("No more mock responses".to_string()))
        }
    }

    #[async_trait]
    impl LlmClient for MockLlmClient {
        async fn complete_text(&self, _prompt: &str) -> Result<String, LlmError> {
            self.next()
        }

        async fn complete_vision(&self, _prompt: &str, _image_jpeg: &[u8]) -> Result<String, LlmError> {
            self.vision_calls.fetch_add(1, Ordering::SeqCst);
            self.next()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_mock_returns_in_order() {
            let client = MockLlmClient::new(vec!["one".to_string(), "two".to_string()]);
            assert_eq!(client.complete_text("p").await.unwrap(), "one");
            assert_eq!(client.complete_vision("p", &[0xFF]).await.unwrap(), "two");
            assert_eq!(client.call_count(), 2);
            assert_eq!(client.vision_calls(), 1);
        }

        #[tokio::test]
        async fn test_mock_errors_when_exhausted() {
            let client = MockLlmClient::new(vec![]);
            assert!(client.complete_text("p").await.is_err());
        }
    }
}
