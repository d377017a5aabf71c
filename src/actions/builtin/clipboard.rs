//! Clipboard actions

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::actions::{ActionHandler, ActionOutput, Category, HandlerContext, optional_str, require_str};
use crate::errors::ActionError;

use super::shared::KeyComboShortcut;

pub fn handlers() -> Vec<Arc<dyn ActionHandler>> {
    vec![
        Arc::new(KeyComboShortcut::new("copy", &["ctrl", "c"], Category::Clipboard)),
        Arc::new(KeyComboShortcut::new("paste", &["ctrl", "v"], Category::Clipboard)),
        Arc::new(KeyComboShortcut::new("cut", &["ctrl", "x"], Category::Clipboard)),
        Arc::new(GetClipboardAction),
        Arc::new(SetClipboardAction),
        Arc::new(PasteFromClipboardAction),
    ]
}

/// Read clipboard text into the `clipboard_text` context variable
pub struct GetClipboardAction;

#[async_trait]
impl ActionHandler for GetClipboardAction {
    fn name(&self) -> &'static str {
        "get_clipboard"
    }

    fn category(&self) -> Category {
        Category::Clipboard
    }

    fn outputs(&self) -> &'static [&'static str] {
        &["clipboard_text"]
    }

    async fn invoke(&self, _params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let text = cx.driver()?.clipboard_get().await?;
        Ok(ActionOutput::var("clipboard_text", json!(text)))
    }
}

/// Replace the clipboard text
pub struct SetClipboardAction;

#[async_trait]
impl ActionHandler for SetClipboardAction {
    fn name(&self) -> &'static str {
        "set_clipboard"
    }

    fn category(&self) -> Category {
        Category::Clipboard
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["text"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let text = require_str(params, "text", self.name())?;
        cx.driver()?.clipboard_set(text).await?;
        Ok(ActionOutput::none())
    }
}

/// Paste given text through the clipboard (set then ctrl-v); with no `text`
/// param this is a plain paste
pub struct PasteFromClipboardAction;

#[async_trait]
impl ActionHandler for PasteFromClipboardAction {
    fn name(&self) -> &'static str {
        "paste_from_clipboard"
    }

    fn category(&self) -> Category {
        Category::Clipboard
    }

    fn optional_params(&self) -> &'static [&'static str] {
        &["text"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let driver = cx.driver()?;
        if let Some(text) = optional_str(params, "text") {
            driver.clipboard_set(text).await?;
        }
        driver.key_combo(&["ctrl".to_string(), "v".to_string()]).await?;
        Ok(ActionOutput::none())
    }
}
