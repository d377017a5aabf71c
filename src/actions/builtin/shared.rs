//! Handlers shared across categories

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::actions::{ActionHandler, ActionOutput, Category, HandlerContext};
use crate::errors::ActionError;

/// An action whose whole body is one fixed key combination.
///
/// Covers browser navigation, clipboard chords, most edit commands and the
/// window-manipulation combos. Keeping these as data instead of one struct
/// per action keeps the library honest about how little they do.
pub struct KeyComboShortcut {
    name: &'static str,
    keys: &'static [&'static str],
    category: Category,
}

impl KeyComboShortcut {
    pub const fn new(name: &'static str, keys: &'static [&'static str], category: Category) -> Self {
        Self { name, keys, category }
    }
}

#[async_trait]
impl ActionHandler for KeyComboShortcut {
    fn name(&self) -> &'static str {
        self.name
    }

    fn category(&self) -> Category {
        self.category
    }

    async fn invoke(&self, _params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        debug!(action = self.name, keys = ?self.keys, "KeyComboShortcut: invoke");
        let keys: Vec<String> = self.keys.iter().map(|k| k.to_string()).collect();
        cx.driver()?.key_combo(&keys).await?;
        Ok(ActionOutput::none())
    }
}

/// An action that launches a fixed system command
pub struct SystemCommandAction {
    name: &'static str,
    command: &'static str,
}

impl SystemCommandAction {
    pub const fn new(name: &'static str, command: &'static str) -> Self {
        Self { name, command }
    }
}

#[async_trait]
impl ActionHandler for SystemCommandAction {
    fn name(&self) -> &'static str {
        self.name
    }

    fn category(&self) -> Category {
        Category::System
    }

    async fn invoke(&self, _params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        debug!(action = self.name, command = self.command, "SystemCommandAction: invoke");
        cx.driver()?.launch_app(self.command).await?;
        Ok(ActionOutput::none())
    }
}
