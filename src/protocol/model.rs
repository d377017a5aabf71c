//! In-memory representation of the protocol document

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// The only protocol schema version this build understands
pub const PROTOCOL_VERSION: &str = "1.0";

/// A validated protocol document.
///
/// Immutable after construction; build one through
/// [`ProtocolParser`](super::ProtocolParser) rather than deserializing
/// directly, so the structured validation order applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Protocol {
    /// Schema version, must equal [`PROTOCOL_VERSION`]
    pub version: String,

    /// Descriptive metadata; `metadata.id` carries the planner-assigned UUID
    pub metadata: Metadata,

    /// Named reusable action sequences
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub macros: BTreeMap<String, Vec<Action>>,

    /// The ordered action list; never empty in a validated protocol
    pub actions: Vec<Action>,
}

impl Protocol {
    /// The correlation id used on the broker: `metadata.id` when the
    /// planner assigned one, otherwise derived from the description.
    pub fn protocol_id(&self) -> String {
        match self.metadata.id {
            Some(id) => id.to_string(),
            None => self.metadata.description.clone(),
        }
    }

    /// Pretty-printed JSON for operator display
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "<unserializable protocol>".to_string())
    }

    /// One-line summary used by the planner when showing a generated protocol
    pub fn summary(&self) -> String {
        format!(
            "{} ({} action{}, {} macro{}, complexity {})",
            self.metadata.description,
            self.actions.len(),
            if self.actions.len() == 1 { "" } else { "s" },
            self.macros.len(),
            if self.macros.len() == 1 { "" } else { "s" },
            self.metadata.complexity,
        )
    }
}

/// Protocol metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Human-readable description of what the protocol does
    pub description: String,

    /// Rough difficulty class assigned by the generator
    #[serde(default)]
    pub complexity: Complexity,

    /// Whether any action relies on the vision loop
    #[serde(default)]
    pub uses_vision: bool,

    /// Planner-assigned protocol id; the broker correlation key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,

    /// Generator's duration estimate
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "estimated_duration_ms")]
    pub estimated_duration_ms: Option<u64>,

    /// Free-form tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// Set when the document came out of an LLM rather than a file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_content: Option<bool>,
}

impl Metadata {
    /// Minimal metadata for hand-built protocols (mostly tests)
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            complexity: Complexity::Simple,
            uses_vision: false,
            id: None,
            estimated_duration_ms: None,
            tags: Vec::new(),
            author: None,
            generated_content: None,
        }
    }
}

/// Complexity class of a protocol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    #[default]
    Simple,
    Medium,
    Complex,
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Complexity::Simple => "simple",
            Complexity::Medium => "medium",
            Complexity::Complex => "complex",
        };
        f.write_str(s)
    }
}

/// A single protocol action.
///
/// The JSON key for the handler name is `action`; `params` values may
/// contain `{{var}}` template references resolved at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Handler name, or `"macro"` for a macro invocation
    #[serde(rename = "action")]
    pub name: String,

    /// Handler parameters; always a JSON object
    #[serde(default = "empty_params")]
    pub params: Value,

    /// Delay after the action completes, in milliseconds
    #[serde(default)]
    pub wait_after_ms: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn empty_params() -> Value {
    Value::Object(serde_json::Map::new())
}

impl Action {
    /// Build an action with the given name and params object
    pub fn new(name: impl Into<String>, params: Value) -> Self {
        Self {
            name: name.into(),
            params,
            wait_after_ms: 0,
            description: None,
        }
    }

    /// Whether this is a macro invocation
    pub fn is_macro(&self) -> bool {
        self.name == "macro"
    }

    /// For macro invocations, the referenced macro name
    pub fn macro_name(&self) -> Option<&str> {
        if !self.is_macro() {
            return None;
        }
        self.params.get("name").and_then(Value::as_str)
    }
}
