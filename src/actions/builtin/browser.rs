//! Browser actions
//!
//! All keyboard-driven so they work in any mainstream browser.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::actions::{ActionHandler, ActionOutput, Category, HandlerContext, optional_str, require_str};
use crate::errors::ActionError;

use super::shared::KeyComboShortcut;

pub fn handlers() -> Vec<Arc<dyn ActionHandler>> {
    vec![
        Arc::new(OpenUrlAction),
        Arc::new(KeyComboShortcut::new("browser_back", &["alt", "left"], Category::Browser)),
        Arc::new(KeyComboShortcut::new("browser_forward", &["alt", "right"], Category::Browser)),
        Arc::new(KeyComboShortcut::new("browser_refresh", &["f5"], Category::Browser)),
        Arc::new(KeyComboShortcut::new("browser_new_tab", &["ctrl", "t"], Category::Browser)),
        Arc::new(KeyComboShortcut::new("browser_close_tab", &["ctrl", "w"], Category::Browser)),
        Arc::new(KeyComboShortcut::new("browser_switch_tab", &["ctrl", "tab"], Category::Browser)),
        Arc::new(KeyComboShortcut::new("browser_address_bar", &["ctrl", "l"], Category::Browser)),
        Arc::new(KeyComboShortcut::new("browser_bookmark", &["ctrl", "d"], Category::Browser)),
        Arc::new(BrowserFindAction),
    ]
}

/// Focus the address bar, type the URL, hit enter
pub struct OpenUrlAction;

#[async_trait]
impl ActionHandler for OpenUrlAction {
    fn name(&self) -> &'static str {
        "open_url"
    }

    fn category(&self) -> Category {
        Category::Browser
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["url"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let url = require_str(params, "url", self.name())?;
        debug!(%url, "open_url: invoke");
        let driver = cx.driver()?;
        driver.key_combo(&["ctrl".to_string(), "l".to_string()]).await?;
        // Give the address bar a beat to take focus
        tokio::time::sleep(Duration::from_millis(100)).await;
        driver.type_text(url).await?;
        driver.key_press("enter").await?;
        Ok(ActionOutput::none())
    }
}

/// Open in-page find, optionally typing the needle
pub struct BrowserFindAction;

#[async_trait]
impl ActionHandler for BrowserFindAction {
    fn name(&self) -> &'static str {
        "browser_find"
    }

    fn category(&self) -> Category {
        Category::Browser
    }

    fn optional_params(&self) -> &'static [&'static str] {
        &["text"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let driver = cx.driver()?;
        driver.key_combo(&["ctrl".to_string(), "f".to_string()]).await?;
        if let Some(text) = optional_str(params, "text") {
            driver.type_text(text).await?;
        }
        Ok(ActionOutput::none())
    }
}
