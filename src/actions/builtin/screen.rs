//! Screen capture actions

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

use crate::actions::{ActionHandler, ActionOutput, Category, HandlerContext, optional_str, require_i64, require_str};
use crate::errors::ActionError;

pub fn handlers() -> Vec<Arc<dyn ActionHandler>> {
    vec![
        Arc::new(CaptureScreenAction),
        Arc::new(CaptureRegionAction),
        Arc::new(CaptureWindowAction),
        Arc::new(SaveScreenshotAction),
    ]
}

/// Capture the full screen into `screenshot_b64` (+ dimensions)
pub struct CaptureScreenAction;

#[async_trait]
impl ActionHandler for CaptureScreenAction {
    fn name(&self) -> &'static str {
        "capture_screen"
    }

    fn category(&self) -> Category {
        Category::Screen
    }

    fn outputs(&self) -> &'static [&'static str] {
        &["screenshot_b64", "screen_w", "screen_h"]
    }

    async fn invoke(&self, _params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let shot = cx.driver()?.capture_screen(cx.vision.screenshot_quality).await?;
        debug!(width = shot.width, height = shot.height, bytes = shot.jpeg.len(), "capture_screen");
        Ok(ActionOutput::var("screenshot_b64", json!(BASE64.encode(&shot.jpeg)))
            .and("screen_w", json!(shot.width))
            .and("screen_h", json!(shot.height)))
    }
}

/// Capture a rectangle into `screenshot_b64`
pub struct CaptureRegionAction;

#[async_trait]
impl ActionHandler for CaptureRegionAction {
    fn name(&self) -> &'static str {
        "capture_region"
    }

    fn category(&self) -> Category {
        Category::Screen
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["x", "y", "width", "height"]
    }

    fn outputs(&self) -> &'static [&'static str] {
        &["screenshot_b64"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let x = require_i64(params, "x", self.name())? as i32;
        let y = require_i64(params, "y", self.name())? as i32;
        let w = require_i64(params, "width", self.name())?.max(1) as u32;
        let h = require_i64(params, "height", self.name())?.max(1) as u32;
        let shot = cx
            .driver()?
            .capture_region(x, y, w, h, cx.vision.screenshot_quality)
            .await?;
        Ok(ActionOutput::var("screenshot_b64", json!(BASE64.encode(&shot.jpeg))))
    }
}

/// Focus a titled window (when given) and capture the screen
pub struct CaptureWindowAction;

#[async_trait]
impl ActionHandler for CaptureWindowAction {
    fn name(&self) -> &'static str {
        "capture_window"
    }

    fn category(&self) -> Category {
        Category::Screen
    }

    fn optional_params(&self) -> &'static [&'static str] {
        &["title"]
    }

    fn outputs(&self) -> &'static [&'static str] {
        &["screenshot_b64"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let driver = cx.driver()?;
        if let Some(title) = optional_str(params, "title") {
            if !driver.focus_window(title).await? {
                return Err(ActionError::validation(format!("no window matching \"{}\"", title)));
            }
        }
        let shot = driver.capture_screen(cx.vision.screenshot_quality).await?;
        Ok(ActionOutput::var("screenshot_b64", json!(BASE64.encode(&shot.jpeg))))
    }
}

/// Capture the screen and write the JPEG to a path
pub struct SaveScreenshotAction;

#[async_trait]
impl ActionHandler for SaveScreenshotAction {
    fn name(&self) -> &'static str {
        "save_screenshot"
    }

    fn category(&self) -> Category {
        Category::Screen
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["path"]
    }

    fn outputs(&self) -> &'static [&'static str] {
        &["screenshot_path"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let path = require_str(params, "path", self.name())?;
        let shot = cx.driver()?.capture_screen(cx.vision.screenshot_quality).await?;
        tokio::fs::write(path, &shot.jpeg)
            .await
            .map_err(|e| ActionError::driver(format!("failed to write {}: {}", path, e)))?;
        debug!(%path, bytes = shot.jpeg.len(), "save_screenshot");
        Ok(ActionOutput::var("screenshot_path", json!(path)))
    }
}
