//! Action system: handler trait, registry and the builtin library
//!
//! Handlers are small async units keyed by name. Each declares its category
//! and parameter/output contract; the registry gates them by configuration
//! and holds the shared collaborators (driver, broker, mouse controller)
//! injected once at startup.

mod registry;

pub mod builtin;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::broker::MessageBus;
use crate::config::VisionConfig;
use crate::driver::PlatformDriver;
use crate::errors::ActionError;
use crate::executor::ControlHandle;
use crate::mouse::MouseController;

pub use registry::ActionRegistry;

/// Gating categories for the action library. The executor treats these as
/// opaque tags; only enable/disable configuration consults them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Keyboard,
    Mouse,
    Window,
    Browser,
    Clipboard,
    File,
    Screen,
    Timing,
    Vision,
    System,
    Edit,
    Macro,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Keyboard => "keyboard",
            Category::Mouse => "mouse",
            Category::Window => "window",
            Category::Browser => "browser",
            Category::Clipboard => "clipboard",
            Category::File => "file",
            Category::Screen => "screen",
            Category::Timing => "timing",
            Category::Vision => "vision",
            Category::System => "system",
            Category::Edit => "edit",
            Category::Macro => "macro",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared collaborators certain handlers need, injected once at startup
#[derive(Clone)]
pub struct HandlerDeps {
    pub driver: Arc<dyn PlatformDriver>,
    pub bus: Arc<dyn MessageBus>,
    pub mouse: Arc<MouseController>,
}

impl HandlerDeps {
    pub fn new(driver: Arc<dyn PlatformDriver>, bus: Arc<dyn MessageBus>, mouse: Arc<MouseController>) -> Self {
        Self { driver, bus, mouse }
    }
}

/// Everything a handler may touch during one invocation
pub struct HandlerContext<'a> {
    deps: Option<&'a HandlerDeps>,

    /// Read view of the execution context variables
    pub vars: &'a HashMap<String, Value>,

    /// Stop/pause flags for cancellable waits
    pub control: &'a ControlHandle,

    /// Clamp rules and screenshot quality for the executor-side vision work
    pub vision: &'a VisionConfig,

    /// Poll interval for cancellable sleeps, milliseconds
    pub poll_interval_ms: u64,
}

impl<'a> HandlerContext<'a> {
    pub fn new(
        deps: Option<&'a HandlerDeps>,
        vars: &'a HashMap<String, Value>,
        control: &'a ControlHandle,
        vision: &'a VisionConfig,
        poll_interval_ms: u64,
    ) -> Self {
        Self {
            deps,
            vars,
            control,
            vision,
            poll_interval_ms,
        }
    }

    /// The platform driver; `VALIDATION_FAILURE` when nothing was injected
    pub fn driver(&self) -> Result<&Arc<dyn PlatformDriver>, ActionError> {
        self.deps
            .map(|d| &d.driver)
            .ok_or_else(|| ActionError::validation("platform driver not injected into the registry"))
    }

    /// The message bus; `VALIDATION_FAILURE` when nothing was injected
    pub fn bus(&self) -> Result<&Arc<dyn MessageBus>, ActionError> {
        self.deps
            .map(|d| &d.bus)
            .ok_or_else(|| ActionError::validation("message bus not injected into the registry"))
    }

    /// The mouse controller; `VALIDATION_FAILURE` when nothing was injected
    pub fn mouse(&self) -> Result<&Arc<MouseController>, ActionError> {
        self.deps
            .map(|d| &d.mouse)
            .ok_or_else(|| ActionError::validation("mouse controller not injected into the registry"))
    }
}

/// Variables a handler hands back to the execution context
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ActionOutput {
    pub vars: HashMap<String, Value>,
}

impl ActionOutput {
    /// No output variables
    pub fn none() -> Self {
        Self::default()
    }

    /// A single output variable
    pub fn var(key: impl Into<String>, value: Value) -> Self {
        Self {
            vars: HashMap::from([(key.into(), value)]),
        }
    }

    /// Add another output variable
    pub fn and(mut self, key: impl Into<String>, value: Value) -> Self {
        self.vars.insert(key.into(), value);
        self
    }
}

/// One named, parameterized operation the executor can invoke
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Externally visible action name
    fn name(&self) -> &'static str;

    /// Gating category
    fn category(&self) -> Category;

    /// Parameters that must be present after substitution
    fn required_params(&self) -> &'static [&'static str] {
        &[]
    }

    /// Parameters that may be present
    fn optional_params(&self) -> &'static [&'static str] {
        &[]
    }

    /// Context variables this handler produces
    fn outputs(&self) -> &'static [&'static str] {
        &[]
    }

    /// Execute against substituted params. Soft handlers (verification)
    /// record their outcome in outputs instead of failing.
    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError>;
}

/// Pull a required string parameter out of a substituted params object
pub(crate) fn require_str<'v>(params: &'v Value, key: &str, action: &str) -> Result<&'v str, ActionError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ActionError::validation(format!("\"{}\" requires string parameter \"{}\"", action, key)))
}

/// Pull a required integer parameter out of a substituted params object
pub(crate) fn require_i64(params: &Value, key: &str, action: &str) -> Result<i64, ActionError> {
    params
        .get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| ActionError::validation(format!("\"{}\" requires integer parameter \"{}\"", action, key)))
}

/// Optional string parameter
pub(crate) fn optional_str<'v>(params: &'v Value, key: &str) -> Option<&'v str> {
    params.get(key).and_then(Value::as_str)
}

/// Optional integer parameter
pub(crate) fn optional_i64(params: &Value, key: &str) -> Option<i64> {
    params.get(key).and_then(Value::as_i64)
}

/// Optional boolean parameter
pub(crate) fn optional_bool(params: &Value, key: &str) -> Option<bool> {
    params.get(key).and_then(Value::as_bool)
}
