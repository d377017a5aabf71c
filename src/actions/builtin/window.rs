//! Window actions
//!
//! The driver only enumerates windows and launches apps; everything else in
//! this family is composed from key combos or focus calls.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

use crate::actions::{ActionHandler, ActionOutput, Category, HandlerContext, optional_str, require_str};
use crate::errors::ActionError;

use super::shared::KeyComboShortcut;

pub fn handlers() -> Vec<Arc<dyn ActionHandler>> {
    vec![
        Arc::new(OpenAppAction),
        Arc::new(CloseAppAction),
        Arc::new(SwitchWindowAction),
        Arc::new(KeyComboShortcut::new("minimize_window", &["super", "h"], Category::Window)),
        Arc::new(KeyComboShortcut::new("maximize_window", &["super", "up"], Category::Window)),
        Arc::new(KeyComboShortcut::new("restore_window", &["super", "down"], Category::Window)),
        Arc::new(GetActiveWindowAction),
    ]
}

/// Launch an application by name or command line
pub struct OpenAppAction;

#[async_trait]
impl ActionHandler for OpenAppAction {
    fn name(&self) -> &'static str {
        "open_app"
    }

    fn category(&self) -> Category {
        Category::Window
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["name"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let name = require_str(params, "name", self.name())?;
        debug!(%name, "open_app: invoke");
        cx.driver()?.launch_app(name).await?;
        Ok(ActionOutput::none())
    }
}

/// Close the focused window, optionally focusing a titled window first
pub struct CloseAppAction;

#[async_trait]
impl ActionHandler for CloseAppAction {
    fn name(&self) -> &'static str {
        "close_app"
    }

    fn category(&self) -> Category {
        Category::Window
    }

    fn optional_params(&self) -> &'static [&'static str] {
        &["title"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let driver = cx.driver()?;
        if let Some(title) = optional_str(params, "title") {
            if !driver.focus_window(title).await? {
                return Err(ActionError::validation(format!("no window matching \"{}\"", title)));
            }
        }
        driver.key_combo(&["alt".to_string(), "f4".to_string()]).await?;
        Ok(ActionOutput::none())
    }
}

/// Focus a titled window, or cycle with alt-tab when no title is given
pub struct SwitchWindowAction;

#[async_trait]
impl ActionHandler for SwitchWindowAction {
    fn name(&self) -> &'static str {
        "switch_window"
    }

    fn category(&self) -> Category {
        Category::Window
    }

    fn optional_params(&self) -> &'static [&'static str] {
        &["title"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let driver = cx.driver()?;
        match optional_str(params, "title") {
            Some(title) => {
                debug!(%title, "switch_window: by title");
                if !driver.focus_window(title).await? {
                    return Err(ActionError::validation(format!("no window matching \"{}\"", title)));
                }
            }
            None => {
                debug!("switch_window: alt-tab");
                driver.key_combo(&["alt".to_string(), "tab".to_string()]).await?;
            }
        }
        Ok(ActionOutput::none())
    }
}

/// Read the focused window into context variables. Soft: sets empty strings
/// when nothing is focused.
pub struct GetActiveWindowAction;

#[async_trait]
impl ActionHandler for GetActiveWindowAction {
    fn name(&self) -> &'static str {
        "get_active_window"
    }

    fn category(&self) -> Category {
        Category::Window
    }

    fn outputs(&self) -> &'static [&'static str] {
        &["active_window_title", "active_window_app"]
    }

    async fn invoke(&self, _params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let window = cx.driver()?.active_window().await?;
        let (title, app) = window.map(|w| (w.title, w.app)).unwrap_or_default();
        Ok(ActionOutput::var("active_window_title", json!(title)).and("active_window_app", json!(app)))
    }
}
