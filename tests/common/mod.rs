//! Shared fixtures for integration tests

// Not every test binary uses every fixture
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use deskpilot::config::Config;
use deskpilot::llm::{LlmClient, LlmError};

/// Scripted LLM client: returns canned responses in order, optionally
/// sleeping before each reply to simulate provider latency
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<String>>,
    delay: Duration,
    vision_calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            delay: Duration::ZERO,
            vision_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn vision_calls(&self) -> usize {
        self.vision_calls.load(Ordering::SeqCst)
    }

    async fn next(&self) -> Result<String, LlmError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::InvalidResponse("scripted responses exhausted".to_string()))
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete_text(&self, _prompt: &str) -> Result<String, LlmError> {
        self.next().await
    }

    async fn complete_vision(&self, _prompt: &str, _image_jpeg: &[u8]) -> Result<String, LlmError> {
        self.vision_calls.fetch_add(1, Ordering::SeqCst);
        self.next().await
    }
}

/// Config tuned for tests: fast polls, short timeouts, broker rooted in a
/// temp directory, audit log off
pub fn test_config(broker_root: &Path) -> Config {
    let mut config = Config::default();
    config.broker.root_dir = broker_root.to_path_buf();
    config.broker.poll_interval_ms = 10;
    config.execution.control_poll_ms = 10;
    config.vision.enable_audit_log = false;
    config.planner.status_timeout_s = 3;
    config.planner.state_timeout_s = 2;
    config.planner.action_timeout_s = 2;
    config
}

/// Arc-wrap a scripted LLM as the trait object the library expects
pub fn llm(responses: Vec<String>) -> (Arc<ScriptedLlm>, Arc<dyn LlmClient>) {
    let scripted = Arc::new(ScriptedLlm::new(responses));
    (scripted.clone(), scripted as Arc<dyn LlmClient>)
}
