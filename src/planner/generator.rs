//! Protocol generation - turning intent into a validated protocol
//!
//! The model gets the action-library contract and must return protocol
//! JSON. Common output defects (code fences, leading prose, trailing
//! commas, unbalanced braces) are repaired before parsing; a validation
//! failure earns one retry with a stripped-down prompt.

use std::sync::Arc;
use std::sync::LazyLock;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::actions::ActionRegistry;
use crate::llm::{LlmClient, LlmError};
use crate::protocol::{ParseIssue, Protocol, ProtocolError, ProtocolParser};

static TRAILING_COMMA_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("valid regex"));

/// Generation failure after the retry
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("generated protocol invalid: {0}")]
    Invalid(#[from] ProtocolError),
}

/// Best-effort cleanup of LLM-produced JSON text
pub fn repair_json(text: &str) -> String {
    let mut body = text.trim();

    // Strip a markdown code fence
    if let Some(inner) = body.strip_prefix("```") {
        let inner = inner.strip_prefix("json").unwrap_or(inner);
        body = inner.strip_suffix("```").unwrap_or(inner).trim();
    }

    // Cut leading/trailing prose around the outermost object
    if let (Some(start), Some(end)) = (body.find('{'), body.rfind('}')) {
        if start < end {
            body = &body[start..=end];
        }
    }

    // Drop trailing commas before a closing brace/bracket
    let mut repaired = TRAILING_COMMA_RE.replace_all(body, "$1").into_owned();

    // Close an unterminated string
    let quotes = repaired.chars().filter(|&c| c == '"').count()
        - repaired.matches("\\\"").count();
    if quotes % 2 == 1 {
        repaired.push('"');
    }

    // Balance braces and brackets
    let opens = repaired.matches('{').count();
    let closes = repaired.matches('}').count();
    for _ in closes..opens {
        repaired.push('}');
    }
    let opens = repaired.matches('[').count();
    let closes = repaired.matches(']').count();
    for _ in closes..opens {
        repaired.push(']');
    }

    repaired
}

/// Generates protocols from user text against a registry's action library
pub struct ProtocolGenerator {
    llm: Arc<dyn LlmClient>,
    registry: Arc<ActionRegistry>,
    strict: bool,
    max_macro_depth: u32,
}

impl ProtocolGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, registry: Arc<ActionRegistry>) -> Self {
        Self {
            llm,
            registry,
            strict: false,
            max_macro_depth: 5,
        }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn max_macro_depth(mut self, depth: u32) -> Self {
        self.max_macro_depth = depth;
        self
    }

    fn full_prompt(&self, user_text: &str) -> String {
        format!(
            "You are a desktop automation planner. Convert the user's command \
             into a protocol JSON document.\n\n\
             USER COMMAND: {user_text}\n\n\
             Available actions (name [category] and parameter contract):\n{library}\n\n\
             Rules:\n\
             - Output ONLY the JSON document, no commentary.\n\
             - \"version\" must be \"1.0\".\n\
             - metadata needs \"description\", \"complexity\" (simple|medium|complex) and \"uses_vision\".\n\
             - Each action: {{\"action\": name, \"params\": {{...}}, \"wait_after_ms\": int}}.\n\
             - Define a macro for any sequence you would repeat, and invoke it \
               with {{\"action\": \"macro\", \"params\": {{\"name\": ..., \"vars\": {{...}}}}}}.\n\
             - Reference context variables as \"{{{{name}}}}\" inside params.\n\
             - For anything that needs looking at the screen, prefer a single \
               visual_navigate action over verify/move/click chains.",
            user_text = user_text,
            library = self.registry.library_prompt(),
        )
    }

    fn retry_prompt(&self, user_text: &str, error: &str) -> String {
        format!(
            "Return ONLY a valid protocol JSON document for this command, no \
             other text.\n\n\
             COMMAND: {user_text}\n\n\
             Your previous attempt failed validation: {error}\n\n\
             Keep it minimal: {{\"version\": \"1.0\", \"metadata\": {{\"description\": ..., \
             \"complexity\": \"simple\", \"uses_vision\": ...}}, \"actions\": [...]}}",
        )
    }

    /// Generate, repair, validate; retry once on validation failure.
    ///
    /// The returned protocol carries a fresh v7 UUID in `metadata.id` and is
    /// marked as generated content.
    pub async fn generate(&self, user_text: &str) -> Result<(Protocol, Vec<ParseIssue>), GenerateError> {
        let first = self.attempt(&self.full_prompt(user_text)).await;
        let (protocol, warnings) = match first {
            Ok(result) => result,
            Err(GenerateError::Invalid(e)) => {
                warn!(error = %e, "generated protocol invalid, retrying with simpler prompt");
                self.attempt(&self.retry_prompt(user_text, &e.to_string())).await?
            }
            Err(e) => return Err(e),
        };

        let mut protocol = protocol;
        protocol.metadata.id = Some(Uuid::now_v7());
        protocol.metadata.generated_content = Some(true);
        debug!(id = ?protocol.metadata.id, actions = protocol.actions.len(), "protocol generated");
        Ok((protocol, warnings))
    }

    async fn attempt(&self, prompt: &str) -> Result<(Protocol, Vec<ParseIssue>), GenerateError> {
        let response = self.llm.complete_text(prompt).await?;
        let repaired = repair_json(&response);
        let parser = ProtocolParser::new(&*self.registry)
            .strict(self.strict)
            .max_macro_depth(self.max_macro_depth);
        let parsed = parser.parse_str(&repaired)?;
        Ok((parsed.protocol, parsed.warnings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockLlmClient;
    use serde_json::json;

    fn smoke_json() -> String {
        json!({
            "version": "1.0",
            "metadata": {"description": "press enter", "complexity": "simple", "uses_vision": false},
            "actions": [{"action": "press_key", "params": {"key": "enter"}}]
        })
        .to_string()
    }

    fn generator(llm: Arc<MockLlmClient>) -> ProtocolGenerator {
        ProtocolGenerator::new(llm, Arc::new(ActionRegistry::standard()))
    }

    #[test]
    fn test_repair_strips_fences_and_prose() {
        let input = "Sure! Here is the protocol:\n```json\n{\"a\": 1}\n```\nLet me know.";
        assert_eq!(repair_json(input), "{\"a\": 1}");
    }

    #[test]
    fn test_repair_trailing_commas() {
        assert_eq!(repair_json("{\"a\": [1, 2,], }"), "{\"a\": [1, 2] }");
    }

    #[test]
    fn test_repair_balances_braces() {
        let repaired = repair_json("{\"a\": {\"b\": 1}");
        assert_eq!(repaired.matches('{').count(), repaired.matches('}').count());
        serde_json::from_str::<serde_json::Value>(&repaired).unwrap();
    }

    #[tokio::test]
    async fn test_generates_valid_protocol() {
        let llm = Arc::new(MockLlmClient::new(vec![smoke_json()]));
        let (protocol, warnings) = generator(llm).generate("press enter").await.unwrap();
        assert_eq!(protocol.actions.len(), 1);
        assert!(protocol.metadata.id.is_some());
        assert_eq!(protocol.metadata.generated_content, Some(true));
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn test_fenced_output_is_accepted() {
        let llm = Arc::new(MockLlmClient::new(vec![format!("```json\n{}\n```", smoke_json())]));
        let (protocol, _) = generator(llm).generate("press enter").await.unwrap();
        assert_eq!(protocol.actions[0].name, "press_key");
    }

    #[tokio::test]
    async fn test_retry_after_invalid_first_attempt() {
        let llm = Arc::new(MockLlmClient::new(vec![
            json!({"version": "2.0", "metadata": {"description": "bad"}, "actions": []}).to_string(),
            smoke_json(),
        ]));
        let (protocol, _) = generator(llm.clone()).generate("press enter").await.unwrap();
        assert_eq!(protocol.actions.len(), 1);
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test]
    async fn test_two_invalid_attempts_fail() {
        let bad = json!({"version": "2.0", "metadata": {"description": "bad"}, "actions": []}).to_string();
        let llm = Arc::new(MockLlmClient::new(vec![bad.clone(), bad]));
        let err = generator(llm).generate("press enter").await.unwrap_err();
        assert!(matches!(err, GenerateError::Invalid(_)));
    }
}
