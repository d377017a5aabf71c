//! Intent parsing - first stage of the user-command pipeline

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::llm::{LlmClient, LlmError};

use super::generator::repair_json;

/// What the user asked for, as the model understood it
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandIntent {
    /// Verb class, e.g. "open", "search", "navigate"
    pub action: String,

    /// Object of the command, e.g. "firefox", "the downloads folder"
    #[serde(default)]
    pub target: String,

    /// Free-form qualifiers the generator may use
    #[serde(default)]
    pub params: Value,

    /// Model's own certainty in [0, 1]
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    0.5
}

impl CommandIntent {
    /// Low-confidence fallback when the model output is unusable
    fn fallback(text: &str) -> Self {
        Self {
            action: "unknown".to_string(),
            target: text.to_string(),
            params: Value::Null,
            confidence: 0.3,
        }
    }
}

fn intent_prompt(text: &str) -> String {
    format!(
        "Classify this desktop automation command.\n\n\
         Command: {text}\n\n\
         Respond with ONLY a JSON object:\n\
         {{\n\
           \"action\": \"<verb: open|close|type|click|search|navigate|copy|other>\",\n\
           \"target\": \"<what the command acts on>\",\n\
           \"params\": {{ ... any extracted details ... }},\n\
           \"confidence\": 0.0-1.0\n\
         }}"
    )
}

/// Ask the model what the user meant.
///
/// Provider errors propagate; an unparseable reply degrades to a
/// low-confidence fallback so the pipeline can warn and continue.
pub async fn parse_intent(llm: &Arc<dyn LlmClient>, text: &str) -> Result<CommandIntent, LlmError> {
    let response = llm.complete_text(&intent_prompt(text)).await?;
    let repaired = repair_json(&response);

    match serde_json::from_str::<CommandIntent>(&repaired) {
        Ok(intent) => {
            debug!(action = %intent.action, target = %intent.target, confidence = intent.confidence, "intent parsed");
            Ok(intent)
        }
        Err(e) => {
            warn!(error = %e, "intent response unparseable, using fallback");
            Ok(CommandIntent::fallback(text))
        }
    }
}
