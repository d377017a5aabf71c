//! Keyboard actions

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::actions::{ActionHandler, ActionOutput, Category, HandlerContext, optional_i64, require_str};
use crate::errors::ActionError;
use crate::executor::sleep_cancellable;

pub fn handlers() -> Vec<Arc<dyn ActionHandler>> {
    vec![
        Arc::new(PressKeyAction),
        Arc::new(ShortcutAction),
        Arc::new(TypeTextAction),
        Arc::new(TypeWithDelayAction),
        Arc::new(HoldKeyAction),
        Arc::new(ReleaseKeyAction),
    ]
}

/// Tap a single named key
pub struct PressKeyAction;

#[async_trait]
impl ActionHandler for PressKeyAction {
    fn name(&self) -> &'static str {
        "press_key"
    }

    fn category(&self) -> Category {
        Category::Keyboard
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["key"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let key = require_str(params, "key", self.name())?;
        debug!(%key, "press_key: invoke");
        cx.driver()?.key_press(key).await?;
        Ok(ActionOutput::none())
    }
}

/// Press a key combination given as an array of key names
pub struct ShortcutAction;

#[async_trait]
impl ActionHandler for ShortcutAction {
    fn name(&self) -> &'static str {
        "shortcut"
    }

    fn category(&self) -> Category {
        Category::Keyboard
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["keys"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let keys: Vec<String> = params
            .get("keys")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        if keys.is_empty() {
            return Err(ActionError::validation("\"shortcut\" requires a non-empty \"keys\" array"));
        }
        debug!(?keys, "shortcut: invoke");
        cx.driver()?.key_combo(&keys).await?;
        Ok(ActionOutput::none())
    }
}

/// Type literal text at the driver's native speed
pub struct TypeTextAction;

#[async_trait]
impl ActionHandler for TypeTextAction {
    fn name(&self) -> &'static str {
        "type"
    }

    fn category(&self) -> Category {
        Category::Keyboard
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["text"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let text = require_str(params, "text", self.name())?;
        debug!(len = text.len(), "type: invoke");
        cx.driver()?.type_text(text).await?;
        Ok(ActionOutput::none())
    }
}

/// Type text with a fixed inter-character delay; cancellable mid-string
pub struct TypeWithDelayAction;

#[async_trait]
impl ActionHandler for TypeWithDelayAction {
    fn name(&self) -> &'static str {
        "type_with_delay"
    }

    fn category(&self) -> Category {
        Category::Keyboard
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["text"]
    }

    fn optional_params(&self) -> &'static [&'static str] {
        &["delay_ms"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let text = require_str(params, "text", self.name())?;
        let delay = Duration::from_millis(optional_i64(params, "delay_ms").unwrap_or(50).max(0) as u64);
        let poll = Duration::from_millis(cx.poll_interval_ms);
        debug!(len = text.len(), ?delay, "type_with_delay: invoke");

        let driver = cx.driver()?;
        let mut buf = [0u8; 4];
        for ch in text.chars() {
            driver.type_text(ch.encode_utf8(&mut buf)).await?;
            if !sleep_cancellable(delay, poll, cx.control).await {
                return Err(ActionError::cancelled("typing interrupted"));
            }
        }
        Ok(ActionOutput::none())
    }
}

/// Hold a key down until a matching `release_key`
pub struct HoldKeyAction;

#[async_trait]
impl ActionHandler for HoldKeyAction {
    fn name(&self) -> &'static str {
        "hold_key"
    }

    fn category(&self) -> Category {
        Category::Keyboard
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["key"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let key = require_str(params, "key", self.name())?;
        cx.driver()?.key_down(key).await?;
        Ok(ActionOutput::none())
    }
}

/// Release a held key
pub struct ReleaseKeyAction;

#[async_trait]
impl ActionHandler for ReleaseKeyAction {
    fn name(&self) -> &'static str {
        "release_key"
    }

    fn category(&self) -> Category {
        Category::Keyboard
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["key"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let key = require_str(params, "key", self.name())?;
        cx.driver()?.key_up(key).await?;
        Ok(ActionOutput::none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::HandlerDeps;
    use crate::broker::MemoryBus;
    use crate::config::VisionConfig;
    use crate::driver::{DriverCall, RecordingDriver};
    use crate::executor::ControlHandle;
    use crate::mouse::MouseController;
    use serde_json::json;
    use std::collections::HashMap;

    fn deps(driver: Arc<RecordingDriver>) -> HandlerDeps {
        HandlerDeps::new(
            driver.clone(),
            Arc::new(MemoryBus::new()),
            Arc::new(MouseController::new(driver).with_steps(2).with_step_delay(Duration::ZERO)),
        )
    }

    #[tokio::test]
    async fn test_press_key() {
        let driver = Arc::new(RecordingDriver::new());
        let deps = deps(driver.clone());
        let vars = HashMap::new();
        let control = ControlHandle::new();
        let vision = VisionConfig::default();
        let cx = HandlerContext::new(Some(&deps), &vars, &control, &vision, 10);

        PressKeyAction.invoke(&json!({"key": "enter"}), &cx).await.unwrap();
        assert_eq!(driver.calls(), vec![DriverCall::KeyPress { key: "enter".into() }]);
    }

    #[tokio::test]
    async fn test_shortcut_requires_keys() {
        let driver = Arc::new(RecordingDriver::new());
        let deps = deps(driver.clone());
        let vars = HashMap::new();
        let control = ControlHandle::new();
        let vision = VisionConfig::default();
        let cx = HandlerContext::new(Some(&deps), &vars, &control, &vision, 10);

        assert!(ShortcutAction.invoke(&json!({"keys": []}), &cx).await.is_err());
        ShortcutAction.invoke(&json!({"keys": ["ctrl", "s"]}), &cx).await.unwrap();
        assert_eq!(
            driver.calls(),
            vec![DriverCall::KeyCombo {
                keys: vec!["ctrl".into(), "s".into()]
            }]
        );
    }

    #[tokio::test]
    async fn test_type_with_delay_emits_chars() {
        let driver = Arc::new(RecordingDriver::new());
        let deps = deps(driver.clone());
        let vars = HashMap::new();
        let control = ControlHandle::new();
        let vision = VisionConfig::default();
        let cx = HandlerContext::new(Some(&deps), &vars, &control, &vision, 1);

        TypeWithDelayAction
            .invoke(&json!({"text": "hi", "delay_ms": 1}), &cx)
            .await
            .unwrap();

        let typed: Vec<DriverCall> = driver.calls_where(|c| matches!(c, DriverCall::TypeText { .. }));
        assert_eq!(typed.len(), 2);
    }

    #[tokio::test]
    async fn test_hold_and_release() {
        let driver = Arc::new(RecordingDriver::new());
        let deps = deps(driver.clone());
        let vars = HashMap::new();
        let control = ControlHandle::new();
        let vision = VisionConfig::default();
        let cx = HandlerContext::new(Some(&deps), &vars, &control, &vision, 10);

        HoldKeyAction.invoke(&json!({"key": "shift"}), &cx).await.unwrap();
        ReleaseKeyAction.invoke(&json!({"key": "shift"}), &cx).await.unwrap();
        assert_eq!(
            driver.calls(),
            vec![
                DriverCall::KeyDown { key: "shift".into() },
                DriverCall::KeyUp { key: "shift".into() },
            ]
        );
    }
}
