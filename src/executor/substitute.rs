//! Variable substitution for action parameters
//!
//! `{{key}}` references resolve against the execution context. A string
//! that is exactly one reference takes the raw context value, keeping its
//! JSON type; anything else is string interpolation.

use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::errors::{ActionError, ErrorKind};

static VAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("valid var regex"));

static WHOLE_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}$").expect("valid whole-token regex"));

/// Substitute every `{{key}}` reference in a value tree.
///
/// Fails with `VARIABLE_MISSING` (listing the available keys) when a
/// referenced variable is absent.
pub fn substitute_value(value: &Value, vars: &HashMap<String, Value>) -> Result<Value, ActionError> {
    match value {
        Value::String(s) => substitute_string(s, vars),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(substitute_value(item, vars)?);
            }
            Ok(Value::Array(out))
        }
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), substitute_value(v, vars)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// Substitute a params object; thin convenience over [`substitute_value`]
pub fn substitute_params(params: &Value, vars: &HashMap<String, Value>) -> Result<Value, ActionError> {
    substitute_value(params, vars)
}

fn substitute_string(s: &str, vars: &HashMap<String, Value>) -> Result<Value, ActionError> {
    // Whole-token reference: the context value replaces the string, type
    // preserved (integers stay integers, objects stay objects).
    if let Some(caps) = WHOLE_TOKEN_RE.captures(s) {
        let key = caps.get(1).expect("group 1").as_str();
        return vars.get(key).cloned().ok_or_else(|| missing(key, vars));
    }

    // Otherwise interpolate each occurrence as text
    let mut result = String::new();
    let mut last = 0;
    for caps in VAR_RE.captures_iter(s) {
        let whole = caps.get(0).expect("match");
        let key = caps.get(1).expect("group 1").as_str();
        let value = vars.get(key).ok_or_else(|| missing(key, vars))?;
        result.push_str(&s[last..whole.start()]);
        result.push_str(&render(value));
        last = whole.end();
    }
    result.push_str(&s[last..]);
    Ok(Value::String(result))
}

/// Text rendering used inside interpolated strings
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn missing(key: &str, vars: &HashMap<String, Value>) -> ActionError {
    let mut available: Vec<&str> = vars.keys().map(String::as_str).collect();
    available.sort_unstable();
    ActionError::new(
        ErrorKind::VariableMissing,
        format!("variable \"{}\" is not set; available: [{}]", key, available.join(", ")),
    )
}
