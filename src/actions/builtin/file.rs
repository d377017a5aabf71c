//! File actions
//!
//! Driven through the focused application's standard dialogs and shortcuts.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::actions::{ActionHandler, ActionOutput, Category, HandlerContext, optional_str, require_str};
use crate::errors::ActionError;

use super::shared::KeyComboShortcut;

/// Pause after opening a dialog before typing into it
const DIALOG_SETTLE: Duration = Duration::from_millis(300);

pub fn handlers() -> Vec<Arc<dyn ActionHandler>> {
    vec![
        Arc::new(OpenFileAction),
        Arc::new(KeyComboShortcut::new("save_file", &["ctrl", "s"], Category::File)),
        Arc::new(SaveAsAction),
        Arc::new(KeyComboShortcut::new("open_file_dialog", &["ctrl", "o"], Category::File)),
        Arc::new(KeyComboShortcut::new("create_folder", &["ctrl", "shift", "n"], Category::File)),
        Arc::new(KeyComboShortcut::new("delete_file", &["delete"], Category::File)),
    ]
}

/// Open a file through the app's open dialog
pub struct OpenFileAction;

#[async_trait]
impl ActionHandler for OpenFileAction {
    fn name(&self) -> &'static str {
        "open_file"
    }

    fn category(&self) -> Category {
        Category::File
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["path"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let path = require_str(params, "path", self.name())?;
        debug!(%path, "open_file: invoke");
        let driver = cx.driver()?;
        driver.key_combo(&["ctrl".to_string(), "o".to_string()]).await?;
        tokio::time::sleep(DIALOG_SETTLE).await;
        driver.type_text(path).await?;
        driver.key_press("enter").await?;
        Ok(ActionOutput::none())
    }
}

/// Save under a new name through the save-as dialog
pub struct SaveAsAction;

#[async_trait]
impl ActionHandler for SaveAsAction {
    fn name(&self) -> &'static str {
        "save_as"
    }

    fn category(&self) -> Category {
        Category::File
    }

    fn optional_params(&self) -> &'static [&'static str] {
        &["path"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let driver = cx.driver()?;
        driver
            .key_combo(&["ctrl".to_string(), "shift".to_string(), "s".to_string()])
            .await?;
        if let Some(path) = optional_str(params, "path") {
            tokio::time::sleep(DIALOG_SETTLE).await;
            driver.type_text(path).await?;
            driver.key_press("enter").await?;
        }
        Ok(ActionOutput::none())
    }
}
