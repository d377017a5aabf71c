//! Vision prompt construction and response parsing

use serde::Deserialize;
use tracing::debug;

use crate::broker::VisionAction;

/// Parsed output of one vision analysis
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VisionNavigationResult {
    pub action: VisionAction,
    #[serde(default)]
    pub coordinates: Option<(i32, i32)>,
    #[serde(default)]
    pub text_to_type: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub requires_followup: bool,
}

fn default_confidence() -> f64 {
    0.5
}

impl VisionNavigationResult {
    /// The diagnostic no-op used when the model output is unusable
    pub fn no_action(reasoning: impl Into<String>) -> Self {
        Self {
            action: VisionAction::NoAction,
            coordinates: None,
            text_to_type: None,
            confidence: 0.0,
            reasoning: reasoning.into(),
            requires_followup: false,
        }
    }
}

/// Build the analysis prompt for one iteration
pub fn build_prompt(
    task: &str,
    goal: &str,
    screen_wh: (u32, u32),
    mouse_xy: (i32, i32),
    history_summary: &str,
) -> String {
    format!(
        "You are a desktop automation agent controlling the computer through \
         vision and single actions.\n\n\
         TASK: {task}\n\
         GOAL: {goal}\n\n\
         Screen resolution: {w}x{h} pixels (0,0 is the top-left corner).\n\
         Current mouse position: ({mx}, {my}).\n\
         Recent actions (do not repeat them): {history}.\n\n\
         Look at the screenshot and choose the SINGLE next action that makes \
         progress toward the goal. If the goal is already achieved, use \
         \"complete\".\n\n\
         Respond with ONLY a JSON object:\n\
         {{\n\
           \"action\": \"click\" | \"double_click\" | \"right_click\" | \"type\" | \"no_action\" | \"complete\",\n\
           \"coordinates\": [x, y],        // required for click variants\n\
           \"text_to_type\": \"...\",        // required for type\n\
           \"confidence\": 0.0-1.0,\n\
           \"reasoning\": \"what you see and why this action\",\n\
           \"requires_followup\": true/false  // want a screenshot after the action?\n\
         }}",
        task = task,
        goal = goal,
        w = screen_wh.0,
        h = screen_wh.1,
        mx = mouse_xy.0,
        my = mouse_xy.1,
        history = history_summary,
    )
}

/// Strip optional markdown code fences around a JSON body
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop a language tag like `json` on the fence line
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    inner.trim()
}

/// Parse a model response; unusable output degrades to `no_action` with
/// confidence 0 (it still consumes an iteration).
pub fn parse_response(text: &str) -> VisionNavigationResult {
    let body = strip_code_fences(text);
    if body.is_empty() {
        return VisionNavigationResult::no_action("model returned an empty response");
    }
    match serde_json::from_str::<VisionNavigationResult>(body) {
        Ok(result) => {
            debug!(action = %result.action, confidence = result.confidence, "vision response parsed");
            result
        }
        Err(e) => VisionNavigationResult::no_action(format!("unparseable model response: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let result = parse_response(
            r#"{"action": "click", "coordinates": [500, 300], "confidence": 0.9, "reasoning": "submit button"}"#,
        );
        assert_eq!(result.action, VisionAction::Click);
        assert_eq!(result.coordinates, Some((500, 300)));
        assert!((result.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_parse_fenced_json() {
        let text = "```json\n{\"action\": \"complete\", \"reasoning\": \"done\"}\n```";
        let result = parse_response(text);
        assert_eq!(result.action, VisionAction::Complete);
        assert_eq!(result.reasoning, "done");
    }

    #[test]
    fn test_parse_garbage_degrades_to_no_action() {
        let result = parse_response("I think you should click somewhere in the middle");
        assert_eq!(result.action, VisionAction::NoAction);
        assert_eq!(result.confidence, 0.0);
        assert!(result.reasoning.contains("unparseable"));
    }

    #[test]
    fn test_parse_empty_degrades_to_no_action() {
        let result = parse_response("   ");
        assert_eq!(result.action, VisionAction::NoAction);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_parse_type_action() {
        let result =
            parse_response(r#"{"action": "type", "text_to_type": "hello", "confidence": 0.8, "reasoning": "field"}"#);
        assert_eq!(result.action, VisionAction::Type);
        assert_eq!(result.text_to_type.as_deref(), Some("hello"));
    }

    #[test]
    fn test_prompt_mentions_inputs() {
        let prompt = build_prompt("click submit", "form sent", (1920, 1080), (10, 20), "click at (5, 5)");
        assert!(prompt.contains("click submit"));
        assert!(prompt.contains("1920x1080"));
        assert!(prompt.contains("(10, 20)"));
        assert!(prompt.contains("click at (5, 5)"));
    }
}
