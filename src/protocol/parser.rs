//! Protocol parser and validator
//!
//! Validation runs as ordered phases over the whole document (top-level
//! actions and macro bodies alike): schema shape, action resolution, macro
//! graph, delays, then parameter checks. The first error aborts; warnings
//! are collected alongside and promoted to errors in strict mode.

use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use tracing::debug;

use crate::errors::ErrorKind;

use super::model::{Action, Metadata, PROTOCOL_VERSION, Protocol};

/// The parser's view of the action registry: which names exist and which
/// parameters they declare. Implemented by `ActionRegistry`.
pub trait ActionCatalog: Send + Sync {
    /// Whether `name` resolves to a registered handler
    fn contains(&self, name: &str) -> bool;

    /// Declared required parameter names, `None` for unknown actions
    fn required_params(&self, name: &str) -> Option<Vec<&'static str>>;

    /// All declared parameter names (required + optional), `None` for unknown
    fn known_params(&self, name: &str) -> Option<Vec<&'static str>>;
}

/// A single validation finding
#[derive(Debug, Clone, PartialEq)]
pub struct ParseIssue {
    pub kind: ErrorKind,
    /// Where in the document, e.g. `actions[3]` or `macros.search[0].params.query`
    pub path: String,
    pub message: String,
}

impl ParseIssue {
    fn new(kind: ErrorKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}: {}", self.kind, self.path, self.message)
    }
}

/// Parser failure: malformed JSON or a structured validation error
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{issue}")]
    Invalid {
        issue: ParseIssue,
        /// Warnings collected before the error was hit
        warnings: Vec<ParseIssue>,
    },
}

impl ProtocolError {
    /// The stable kind for this failure (JSON errors map to MALFORMED_ACTION)
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProtocolError::Json(_) => ErrorKind::MalformedAction,
            ProtocolError::Invalid { issue, .. } => issue.kind,
        }
    }
}

/// Successful parse: the protocol plus any non-fatal findings
#[derive(Debug)]
pub struct ParsedProtocol {
    pub protocol: Protocol,
    pub warnings: Vec<ParseIssue>,
}

/// Protocol parser with a registry view and a strictness switch
pub struct ProtocolParser<'a> {
    catalog: &'a dyn ActionCatalog,
    strict: bool,
    max_macro_depth: u32,
}

impl<'a> ProtocolParser<'a> {
    pub fn new(catalog: &'a dyn ActionCatalog) -> Self {
        Self {
            catalog,
            strict: false,
            max_macro_depth: 5,
        }
    }

    /// Promote every warning to an error
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Cap for nested macro expansion
    pub fn max_macro_depth(mut self, depth: u32) -> Self {
        self.max_macro_depth = depth;
        self
    }

    /// Parse and validate raw JSON text
    pub fn parse_str(&self, text: &str) -> Result<ParsedProtocol, ProtocolError> {
        debug!(len = text.len(), "parse_str: called");
        let value: Value = serde_json::from_str(text)?;
        self.parse_value(&value)
    }

    /// Parse and validate an already-deserialized object tree
    pub fn parse_value(&self, value: &Value) -> Result<ParsedProtocol, ProtocolError> {
        let mut warnings = Vec::new();

        // Phase 1: version
        let version = value.get("version").and_then(Value::as_str).unwrap_or_default();
        if version != PROTOCOL_VERSION {
            return Err(self.fail(
                ParseIssue::new(
                    ErrorKind::VersionMismatch,
                    "version",
                    format!("expected \"{}\", got \"{}\"", PROTOCOL_VERSION, version),
                ),
                warnings,
            ));
        }

        // Phase 2: metadata with a non-empty description
        let metadata: Metadata = match value.get("metadata") {
            Some(meta) => serde_json::from_value(meta.clone()).map_err(|e| {
                self.fail(
                    ParseIssue::new(ErrorKind::MetadataMissing, "metadata", format!("unreadable metadata: {}", e)),
                    Vec::new(),
                )
            })?,
            None => {
                return Err(self.fail(
                    ParseIssue::new(ErrorKind::MetadataMissing, "metadata", "metadata object is required"),
                    warnings,
                ));
            }
        };
        if metadata.description.trim().is_empty() {
            return Err(self.fail(
                ParseIssue::new(
                    ErrorKind::MetadataMissing,
                    "metadata.description",
                    "description must be a non-empty string",
                ),
                warnings,
            ));
        }

        // Phase 3: non-empty actions array
        let raw_actions = match value.get("actions").and_then(Value::as_array) {
            Some(actions) if !actions.is_empty() => actions,
            _ => {
                return Err(self.fail(
                    ParseIssue::new(ErrorKind::EmptyActions, "actions", "actions must be a non-empty array"),
                    warnings,
                ));
            }
        };

        // Phase 4: shape of every action, in macros too
        let mut macros: BTreeMap<String, Vec<Action>> = BTreeMap::new();
        if let Some(raw_macros) = value.get("macros") {
            let map = raw_macros.as_object().ok_or_else(|| {
                self.fail(
                    ParseIssue::new(ErrorKind::MalformedAction, "macros", "macros must be an object"),
                    Vec::new(),
                )
            })?;
            for (name, body) in map {
                let raw_body = body.as_array().ok_or_else(|| {
                    self.fail(
                        ParseIssue::new(
                            ErrorKind::MalformedAction,
                            format!("macros.{}", name),
                            "macro body must be an array of actions",
                        ),
                        Vec::new(),
                    )
                })?;
                let mut parsed_body = Vec::with_capacity(raw_body.len());
                for (idx, raw) in raw_body.iter().enumerate() {
                    parsed_body.push(self.parse_action(raw, &format!("macros.{}[{}]", name, idx))?);
                }
                macros.insert(name.clone(), parsed_body);
            }
        }

        let mut actions = Vec::with_capacity(raw_actions.len());
        for (idx, raw) in raw_actions.iter().enumerate() {
            actions.push(self.parse_action(raw, &format!("actions[{}]", idx))?);
        }

        // Remaining phases walk every action with its document path
        let all_actions: Vec<(String, &Action)> = actions
            .iter()
            .enumerate()
            .map(|(i, a)| (format!("actions[{}]", i), a))
            .chain(macros.iter().flat_map(|(name, body)| {
                body.iter()
                    .enumerate()
                    .map(move |(i, a)| (format!("macros.{}[{}]", name, i), a))
            }))
            .collect();

        // Phase 5: every name registered or "macro"
        for (path, action) in &all_actions {
            if !action.is_macro() && !self.catalog.contains(&action.name) {
                return Err(self.fail(
                    ParseIssue::new(
                        ErrorKind::UnknownAction,
                        path.clone(),
                        format!("no handler registered for \"{}\"", action.name),
                    ),
                    warnings,
                ));
            }
        }

        // Phase 6: macro invocations resolve
        for (path, action) in &all_actions {
            if action.is_macro() {
                match action.macro_name() {
                    Some(name) if macros.contains_key(name) => {}
                    Some(name) => {
                        return Err(self.fail(
                            ParseIssue::new(
                                ErrorKind::UnresolvedMacro,
                                path.clone(),
                                format!("macro \"{}\" is not defined", name),
                            ),
                            warnings,
                        ));
                    }
                    None => {
                        return Err(self.fail(
                            ParseIssue::new(
                                ErrorKind::UnresolvedMacro,
                                path.clone(),
                                "macro invocation requires params.name",
                            ),
                            warnings,
                        ));
                    }
                }
            }
        }

        // Phase 7: macro graph is acyclic within the depth bound
        self.check_macro_graph(&macros, &warnings)?;

        // Phase 8: non-negative delays
        for (path, action) in &all_actions {
            if action.wait_after_ms < 0 {
                return Err(self.fail(
                    ParseIssue::new(
                        ErrorKind::BadDelay,
                        format!("{}.wait_after_ms", path),
                        format!("delay must be non-negative, got {}", action.wait_after_ms),
                    ),
                    warnings,
                ));
            }
        }

        // Phase 9/10: declared parameters
        for (path, action) in &all_actions {
            if action.is_macro() {
                continue;
            }
            let params = action.params.as_object().expect("checked in parse_action");

            if let Some(required) = self.catalog.required_params(&action.name) {
                for name in required {
                    if !params.contains_key(name) {
                        let issue = ParseIssue::new(
                            ErrorKind::ParamMissing,
                            format!("{}.params.{}", path, name),
                            format!("\"{}\" requires parameter \"{}\"", action.name, name),
                        );
                        if self.strict {
                            return Err(self.fail(issue, warnings));
                        }
                        warnings.push(issue);
                    }
                }
            }

            if let Some(known) = self.catalog.known_params(&action.name) {
                let known: HashSet<&str> = known.into_iter().collect();
                for key in params.keys() {
                    if !known.contains(key.as_str()) {
                        let issue = ParseIssue::new(
                            ErrorKind::ParamUnknown,
                            format!("{}.params.{}", path, key),
                            format!("\"{}\" does not declare parameter \"{}\"", action.name, key),
                        );
                        if self.strict {
                            return Err(self.fail(issue, warnings));
                        }
                        warnings.push(issue);
                    }
                }
            }
        }

        debug!(
            actions = actions.len(),
            macros = macros.len(),
            warnings = warnings.len(),
            "parse_value: protocol accepted"
        );

        Ok(ParsedProtocol {
            protocol: Protocol {
                version: version.to_string(),
                metadata,
                macros,
                actions,
            },
            warnings,
        })
    }

    /// Shape-check one raw action and convert it
    fn parse_action(&self, raw: &Value, path: &str) -> Result<Action, ProtocolError> {
        let obj = raw.as_object().ok_or_else(|| {
            self.fail(
                ParseIssue::new(ErrorKind::MalformedAction, path, "action must be an object"),
                Vec::new(),
            )
        })?;

        let name = obj.get("action").and_then(Value::as_str).ok_or_else(|| {
            self.fail(
                ParseIssue::new(ErrorKind::MalformedAction, path, "missing \"action\" name"),
                Vec::new(),
            )
        })?;

        let params = match obj.get("params") {
            Some(params @ Value::Object(_)) => params.clone(),
            Some(_) => {
                return Err(self.fail(
                    ParseIssue::new(ErrorKind::MalformedAction, format!("{}.params", path), "params must be an object"),
                    Vec::new(),
                ));
            }
            None => {
                return Err(self.fail(
                    ParseIssue::new(ErrorKind::MalformedAction, format!("{}.params", path), "params object is required"),
                    Vec::new(),
                ));
            }
        };

        let wait_after_ms = match obj.get("wait_after_ms") {
            Some(v) => v.as_i64().ok_or_else(|| {
                self.fail(
                    ParseIssue::new(
                        ErrorKind::MalformedAction,
                        format!("{}.wait_after_ms", path),
                        "wait_after_ms must be an integer",
                    ),
                    Vec::new(),
                )
            })?,
            None => 0,
        };

        let description = obj.get("description").and_then(Value::as_str).map(str::to_string);

        Ok(Action {
            name: name.to_string(),
            params,
            wait_after_ms,
            description,
        })
    }

    /// Detect macro cycles and over-deep expansion chains
    fn check_macro_graph(
        &self,
        macros: &BTreeMap<String, Vec<Action>>,
        warnings: &[ParseIssue],
    ) -> Result<(), ProtocolError> {
        for start in macros.keys() {
            let depth = self.walk_macro(start, macros, &mut Vec::new())?;
            if depth > self.max_macro_depth {
                return Err(self.fail(
                    ParseIssue::new(
                        ErrorKind::CyclicMacro,
                        format!("macros.{}", start),
                        format!("expansion depth {} exceeds the limit of {}", depth, self.max_macro_depth),
                    ),
                    warnings.to_vec(),
                ));
            }
        }
        Ok(())
    }

    /// Depth-first walk returning the expansion depth rooted at `name`
    fn walk_macro(
        &self,
        name: &str,
        macros: &BTreeMap<String, Vec<Action>>,
        stack: &mut Vec<String>,
    ) -> Result<u32, ProtocolError> {
        if stack.iter().any(|s| s == name) {
            let mut cycle = stack.clone();
            cycle.push(name.to_string());
            return Err(self.fail(
                ParseIssue::new(
                    ErrorKind::CyclicMacro,
                    format!("macros.{}", name),
                    format!("macro cycle: {}", cycle.join(" -> ")),
                ),
                Vec::new(),
            ));
        }

        let Some(body) = macros.get(name) else {
            // Unresolved references were reported in an earlier phase
            return Ok(1);
        };

        stack.push(name.to_string());
        let mut max_child = 0;
        for action in body {
            if let Some(child) = action.macro_name() {
                max_child = max_child.max(self.walk_macro(child, macros, stack)?);
            }
        }
        stack.pop();

        Ok(1 + max_child)
    }

    fn fail(&self, issue: ParseIssue, warnings: Vec<ParseIssue>) -> ProtocolError {
        debug!(kind = %issue.kind, path = %issue.path, "validation failed");
        ProtocolError::Invalid { issue, warnings }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Fixed catalog standing in for the registry
    struct StubCatalog;

    impl ActionCatalog for StubCatalog {
        fn contains(&self, name: &str) -> bool {
            matches!(name, "press_key" | "type" | "mouse_move" | "delay" | "verify_screen")
        }

        fn required_params(&self, name: &str) -> Option<Vec<&'static str>> {
            match name {
                "press_key" => Some(vec!["key"]),
                "type" => Some(vec!["text"]),
                "mouse_move" => Some(vec!["x", "y"]),
                "delay" => Some(vec!["ms"]),
                "verify_screen" => Some(vec![]),
                _ => None,
            }
        }

        fn known_params(&self, name: &str) -> Option<Vec<&'static str>> {
            match name {
                "press_key" => Some(vec!["key"]),
                "type" => Some(vec!["text"]),
                "mouse_move" => Some(vec!["x", "y", "smooth"]),
                "delay" => Some(vec!["ms"]),
                "verify_screen" => Some(vec!["expectation"]),
                _ => None,
            }
        }
    }

    fn parser(catalog: &StubCatalog) -> ProtocolParser<'_> {
        ProtocolParser::new(catalog)
    }

    fn smoke_doc() -> Value {
        json!({
            "version": "1.0",
            "metadata": {"description": "smoke", "complexity": "simple", "uses_vision": false},
            "actions": [{"action": "press_key", "params": {"key": "enter"}, "wait_after_ms": 50}]
        })
    }

    #[test]
    fn test_smoke_protocol_parses() {
        let catalog = StubCatalog;
        let parsed = parser(&catalog).parse_value(&smoke_doc()).unwrap();
        assert_eq!(parsed.protocol.actions.len(), 1);
        assert_eq!(parsed.protocol.actions[0].name, "press_key");
        assert_eq!(parsed.protocol.actions[0].wait_after_ms, 50);
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_round_trip_is_structurally_identical() {
        let catalog = StubCatalog;
        let p = parser(&catalog);
        let first = p.parse_value(&smoke_doc()).unwrap().protocol;
        let serialized = serde_json::to_value(&first).unwrap();
        let second = p.parse_value(&serialized).unwrap().protocol;
        assert_eq!(first, second);
    }

    #[test]
    fn test_version_mismatch() {
        let catalog = StubCatalog;
        let mut doc = smoke_doc();
        doc["version"] = json!("2.0");
        let err = parser(&catalog).parse_value(&doc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::VersionMismatch);
    }

    #[test]
    fn test_missing_description() {
        let catalog = StubCatalog;
        let mut doc = smoke_doc();
        doc["metadata"]["description"] = json!("   ");
        let err = parser(&catalog).parse_value(&doc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MetadataMissing);
    }

    #[test]
    fn test_empty_actions() {
        let catalog = StubCatalog;
        let mut doc = smoke_doc();
        doc["actions"] = json!([]);
        let err = parser(&catalog).parse_value(&doc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyActions);
    }

    #[test]
    fn test_action_without_params_is_malformed() {
        let catalog = StubCatalog;
        let mut doc = smoke_doc();
        doc["actions"] = json!([{"action": "press_key"}]);
        let err = parser(&catalog).parse_value(&doc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedAction);
    }

    #[test]
    fn test_unknown_action() {
        let catalog = StubCatalog;
        let mut doc = smoke_doc();
        doc["actions"] = json!([{"action": "teleport", "params": {}}]);
        let err = parser(&catalog).parse_value(&doc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownAction);
    }

    #[test]
    fn test_unresolved_macro() {
        let catalog = StubCatalog;
        let mut doc = smoke_doc();
        doc["actions"] = json!([{"action": "macro", "params": {"name": "missing"}}]);
        let err = parser(&catalog).parse_value(&doc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnresolvedMacro);
    }

    #[test]
    fn test_cyclic_macro() {
        let catalog = StubCatalog;
        let mut doc = smoke_doc();
        doc["macros"] = json!({
            "a": [{"action": "macro", "params": {"name": "b"}}],
            "b": [{"action": "macro", "params": {"name": "a"}}]
        });
        doc["actions"] = json!([{"action": "macro", "params": {"name": "a"}}]);
        let err = parser(&catalog).parse_value(&doc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CyclicMacro);
    }

    #[test]
    fn test_macro_depth_limit() {
        let catalog = StubCatalog;
        let mut doc = smoke_doc();
        // a -> b -> c, depth 3, limit 2
        doc["macros"] = json!({
            "a": [{"action": "macro", "params": {"name": "b"}}],
            "b": [{"action": "macro", "params": {"name": "c"}}],
            "c": [{"action": "press_key", "params": {"key": "enter"}}]
        });
        doc["actions"] = json!([{"action": "macro", "params": {"name": "a"}}]);
        let err = parser(&catalog).max_macro_depth(2).parse_value(&doc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CyclicMacro);
    }

    #[test]
    fn test_negative_delay() {
        let catalog = StubCatalog;
        let mut doc = smoke_doc();
        doc["actions"][0]["wait_after_ms"] = json!(-10);
        let err = parser(&catalog).parse_value(&doc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadDelay);
    }

    #[test]
    fn test_missing_param_is_warning_when_relaxed() {
        let catalog = StubCatalog;
        let mut doc = smoke_doc();
        doc["actions"] = json!([{"action": "press_key", "params": {}}]);
        let parsed = parser(&catalog).parse_value(&doc).unwrap();
        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(parsed.warnings[0].kind, ErrorKind::ParamMissing);
    }

    #[test]
    fn test_missing_param_is_error_when_strict() {
        let catalog = StubCatalog;
        let mut doc = smoke_doc();
        doc["actions"] = json!([{"action": "press_key", "params": {}}]);
        let err = parser(&catalog).strict(true).parse_value(&doc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParamMissing);
    }

    #[test]
    fn test_unknown_param_is_warning() {
        let catalog = StubCatalog;
        let mut doc = smoke_doc();
        doc["actions"] = json!([{"action": "press_key", "params": {"key": "enter", "hardness": 11}}]);
        let parsed = parser(&catalog).parse_value(&doc).unwrap();
        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(parsed.warnings[0].kind, ErrorKind::ParamUnknown);
    }

    #[test]
    fn test_macro_bodies_are_validated() {
        let catalog = StubCatalog;
        let mut doc = smoke_doc();
        doc["macros"] = json!({"bad": [{"action": "teleport", "params": {}}]});
        doc["actions"] = json!([{"action": "macro", "params": {"name": "bad"}}]);
        let err = parser(&catalog).parse_value(&doc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownAction);
    }

    #[test]
    fn test_parse_str_rejects_bad_json() {
        let catalog = StubCatalog;
        let err = parser(&catalog).parse_str("{not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Json(_)));
    }

    #[test]
    fn test_template_params_satisfy_presence_checks() {
        let catalog = StubCatalog;
        let mut doc = smoke_doc();
        doc["actions"] = json!([{"action": "mouse_move", "params": {"x": "{{verified_x}}", "y": "{{verified_y}}"}}]);
        let parsed = parser(&catalog).parse_value(&doc).unwrap();
        assert!(parsed.warnings.is_empty());
    }
}
