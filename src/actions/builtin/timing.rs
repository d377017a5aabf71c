//! Timing actions - delays and condition waits
//!
//! All waits are cancellable: a stop request interrupts them with
//! `CANCELLED`, a missed deadline fails with `TIMEOUT`.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::actions::{ActionHandler, ActionOutput, Category, HandlerContext, optional_i64, require_i64, require_str};
use crate::errors::ActionError;
use crate::executor::sleep_cancellable;

const DEFAULT_WAIT_TIMEOUT_MS: i64 = 10_000;

pub fn handlers() -> Vec<Arc<dyn ActionHandler>> {
    vec![
        Arc::new(DelayAction),
        Arc::new(WaitForWindowAction),
        Arc::new(WaitForImageAction),
        Arc::new(WaitForColorAction),
    ]
}

/// Sleep for a fixed number of milliseconds
pub struct DelayAction;

#[async_trait]
impl ActionHandler for DelayAction {
    fn name(&self) -> &'static str {
        "delay"
    }

    fn category(&self) -> Category {
        Category::Timing
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["ms"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let ms = require_i64(params, "ms", self.name())?.max(0) as u64;
        debug!(ms, "delay: invoke");
        let poll = Duration::from_millis(cx.poll_interval_ms);
        if !sleep_cancellable(Duration::from_millis(ms), poll, cx.control).await {
            return Err(ActionError::cancelled("delay interrupted"));
        }
        Ok(ActionOutput::none())
    }
}

/// Poll window enumeration until a title appears
pub struct WaitForWindowAction;

#[async_trait]
impl ActionHandler for WaitForWindowAction {
    fn name(&self) -> &'static str {
        "wait_for_window"
    }

    fn category(&self) -> Category {
        Category::Timing
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["title"]
    }

    fn optional_params(&self) -> &'static [&'static str] {
        &["timeout_ms"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let title = require_str(params, "title", self.name())?;
        let timeout_ms = optional_i64(params, "timeout_ms").unwrap_or(DEFAULT_WAIT_TIMEOUT_MS).max(0) as u64;
        let poll = Duration::from_millis(cx.poll_interval_ms.max(50));
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        debug!(%title, timeout_ms, "wait_for_window: invoke");

        let driver = cx.driver()?;
        loop {
            if cx.control.is_stop_requested() {
                return Err(ActionError::cancelled("wait_for_window interrupted"));
            }
            let windows = driver.list_windows().await?;
            if windows.iter().any(|w| w.title.contains(title)) {
                return Ok(ActionOutput::none());
            }
            if Instant::now() >= deadline {
                return Err(ActionError::timeout(format!(
                    "window \"{}\" did not appear within {} ms",
                    title, timeout_ms
                )));
            }
            tokio::time::sleep(poll).await;
        }
    }
}

/// Poll a screen region until it matches a template capture byte-for-byte.
/// Exact-match only; a template from a different quality setting will never
/// match.
pub struct WaitForImageAction;

#[async_trait]
impl ActionHandler for WaitForImageAction {
    fn name(&self) -> &'static str {
        "wait_for_image"
    }

    fn category(&self) -> Category {
        Category::Timing
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["template_path", "x", "y", "width", "height"]
    }

    fn optional_params(&self) -> &'static [&'static str] {
        &["timeout_ms"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let template_path = require_str(params, "template_path", self.name())?;
        let x = require_i64(params, "x", self.name())? as i32;
        let y = require_i64(params, "y", self.name())? as i32;
        let w = require_i64(params, "width", self.name())?.max(1) as u32;
        let h = require_i64(params, "height", self.name())?.max(1) as u32;
        let timeout_ms = optional_i64(params, "timeout_ms").unwrap_or(DEFAULT_WAIT_TIMEOUT_MS).max(0) as u64;

        let template = tokio::fs::read(template_path)
            .await
            .map_err(|e| ActionError::validation(format!("cannot read template {}: {}", template_path, e)))?;

        let poll = Duration::from_millis(cx.poll_interval_ms.max(100));
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let driver = cx.driver()?;

        loop {
            if cx.control.is_stop_requested() {
                return Err(ActionError::cancelled("wait_for_image interrupted"));
            }
            let shot = driver.capture_region(x, y, w, h, cx.vision.screenshot_quality).await?;
            if shot.jpeg == template {
                return Ok(ActionOutput::none());
            }
            if Instant::now() >= deadline {
                return Err(ActionError::timeout(format!(
                    "region did not match {} within {} ms",
                    template_path, timeout_ms
                )));
            }
            tokio::time::sleep(poll).await;
        }
    }
}

/// Poll one pixel until it reaches a target color (within tolerance)
pub struct WaitForColorAction;

#[async_trait]
impl ActionHandler for WaitForColorAction {
    fn name(&self) -> &'static str {
        "wait_for_color"
    }

    fn category(&self) -> Category {
        Category::Timing
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["x", "y", "r", "g", "b"]
    }

    fn optional_params(&self) -> &'static [&'static str] {
        &["tolerance", "timeout_ms"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let x = require_i64(params, "x", self.name())? as i32;
        let y = require_i64(params, "y", self.name())? as i32;
        let target = (
            require_i64(params, "r", self.name())?.clamp(0, 255) as u8,
            require_i64(params, "g", self.name())?.clamp(0, 255) as u8,
            require_i64(params, "b", self.name())?.clamp(0, 255) as u8,
        );
        let tolerance = optional_i64(params, "tolerance").unwrap_or(10).clamp(0, 255) as i32;
        let timeout_ms = optional_i64(params, "timeout_ms").unwrap_or(DEFAULT_WAIT_TIMEOUT_MS).max(0) as u64;

        let poll = Duration::from_millis(cx.poll_interval_ms.max(50));
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let driver = cx.driver()?;
        debug!(x, y, ?target, tolerance, "wait_for_color: invoke");

        loop {
            if cx.control.is_stop_requested() {
                return Err(ActionError::cancelled("wait_for_color interrupted"));
            }
            let (r, g, b) = driver.pixel_at(x, y).await?;
            let close = (r as i32 - target.0 as i32).abs() <= tolerance
                && (g as i32 - target.1 as i32).abs() <= tolerance
                && (b as i32 - target.2 as i32).abs() <= tolerance;
            if close {
                return Ok(ActionOutput::none());
            }
            if Instant::now() >= deadline {
                return Err(ActionError::timeout(format!(
                    "pixel ({}, {}) did not reach rgb({}, {}, {}) within {} ms",
                    x, y, target.0, target.1, target.2, timeout_ms
                )));
            }
            tokio::time::sleep(poll).await;
        }
    }
}
