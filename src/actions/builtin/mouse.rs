//! Mouse actions
//!
//! Movement defaults to the smooth curve controller; pass `smooth: false`
//! to teleport.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

use crate::actions::{
    ActionHandler, ActionOutput, Category, HandlerContext, optional_bool, optional_i64, optional_str, require_i64,
};
use crate::driver::MouseButton;
use crate::errors::ActionError;

pub fn handlers() -> Vec<Arc<dyn ActionHandler>> {
    vec![
        Arc::new(MouseMoveAction),
        Arc::new(MouseClickAction),
        Arc::new(MouseDoubleClickAction),
        Arc::new(MouseRightClickAction),
        Arc::new(MouseDragAction),
        Arc::new(MouseScrollAction),
        Arc::new(MousePositionAction),
    ]
}

pub struct MouseMoveAction;

#[async_trait]
impl ActionHandler for MouseMoveAction {
    fn name(&self) -> &'static str {
        "mouse_move"
    }

    fn category(&self) -> Category {
        Category::Mouse
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["x", "y"]
    }

    fn optional_params(&self) -> &'static [&'static str] {
        &["smooth"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let x = require_i64(params, "x", self.name())? as i32;
        let y = require_i64(params, "y", self.name())? as i32;
        let smooth = optional_bool(params, "smooth").unwrap_or(true);
        debug!(x, y, smooth, "mouse_move: invoke");

        if smooth {
            cx.mouse()?.move_smooth(x, y).await?;
        } else {
            cx.driver()?.mouse_move(x, y).await?;
        }
        Ok(ActionOutput::none())
    }
}

fn parse_button(params: &Value) -> Result<MouseButton, ActionError> {
    match optional_str(params, "button") {
        None => Ok(MouseButton::Left),
        Some(name) => MouseButton::parse(name)
            .ok_or_else(|| ActionError::validation(format!("unknown mouse button \"{}\"", name))),
    }
}

/// Click at given coordinates, or at the current position when none given
pub struct MouseClickAction;

#[async_trait]
impl ActionHandler for MouseClickAction {
    fn name(&self) -> &'static str {
        "mouse_click"
    }

    fn category(&self) -> Category {
        Category::Mouse
    }

    fn optional_params(&self) -> &'static [&'static str] {
        &["x", "y", "button", "smooth"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let button = parse_button(params)?;
        match (optional_i64(params, "x"), optional_i64(params, "y")) {
            (Some(x), Some(y)) => {
                debug!(x, y, ?button, "mouse_click: at coordinates");
                cx.mouse()?.click_at(x as i32, y as i32, button).await?;
            }
            _ => {
                debug!(?button, "mouse_click: at current position");
                cx.driver()?.click(button).await?;
            }
        }
        Ok(ActionOutput::none())
    }
}

pub struct MouseDoubleClickAction;

#[async_trait]
impl ActionHandler for MouseDoubleClickAction {
    fn name(&self) -> &'static str {
        "mouse_double_click"
    }

    fn category(&self) -> Category {
        Category::Mouse
    }

    fn optional_params(&self) -> &'static [&'static str] {
        &["x", "y", "button"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let button = parse_button(params)?;
        match (optional_i64(params, "x"), optional_i64(params, "y")) {
            (Some(x), Some(y)) => cx.mouse()?.double_click_at(x as i32, y as i32, button).await?,
            _ => cx.driver()?.double_click(button).await?,
        }
        Ok(ActionOutput::none())
    }
}

pub struct MouseRightClickAction;

#[async_trait]
impl ActionHandler for MouseRightClickAction {
    fn name(&self) -> &'static str {
        "mouse_right_click"
    }

    fn category(&self) -> Category {
        Category::Mouse
    }

    fn optional_params(&self) -> &'static [&'static str] {
        &["x", "y"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        match (optional_i64(params, "x"), optional_i64(params, "y")) {
            (Some(x), Some(y)) => cx.mouse()?.click_at(x as i32, y as i32, MouseButton::Right).await?,
            _ => cx.driver()?.click(MouseButton::Right).await?,
        }
        Ok(ActionOutput::none())
    }
}

pub struct MouseDragAction;

#[async_trait]
impl ActionHandler for MouseDragAction {
    fn name(&self) -> &'static str {
        "mouse_drag"
    }

    fn category(&self) -> Category {
        Category::Mouse
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["from_x", "from_y", "to_x", "to_y"]
    }

    fn optional_params(&self) -> &'static [&'static str] {
        &["button"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let from = (
            require_i64(params, "from_x", self.name())? as i32,
            require_i64(params, "from_y", self.name())? as i32,
        );
        let to = (
            require_i64(params, "to_x", self.name())? as i32,
            require_i64(params, "to_y", self.name())? as i32,
        );
        let button = parse_button(params)?;
        debug!(?from, ?to, ?button, "mouse_drag: invoke");
        cx.mouse()?.drag(from, to, button).await?;
        Ok(ActionOutput::none())
    }
}

pub struct MouseScrollAction;

#[async_trait]
impl ActionHandler for MouseScrollAction {
    fn name(&self) -> &'static str {
        "mouse_scroll"
    }

    fn category(&self) -> Category {
        Category::Mouse
    }

    fn optional_params(&self) -> &'static [&'static str] {
        &["dx", "dy"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let dx = optional_i64(params, "dx").unwrap_or(0) as i32;
        let dy = optional_i64(params, "dy").unwrap_or(0) as i32;
        if dx == 0 && dy == 0 {
            return Err(ActionError::validation("\"mouse_scroll\" needs a non-zero dx or dy"));
        }
        cx.driver()?.scroll(dx, dy).await?;
        Ok(ActionOutput::none())
    }
}

/// Read the pointer position into context variables
pub struct MousePositionAction;

#[async_trait]
impl ActionHandler for MousePositionAction {
    fn name(&self) -> &'static str {
        "mouse_position"
    }

    fn category(&self) -> Category {
        Category::Mouse
    }

    fn outputs(&self) -> &'static [&'static str] {
        &["mouse_x", "mouse_y"]
    }

    async fn invoke(&self, _params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let (x, y) = cx.driver()?.mouse_position().await?;
        Ok(ActionOutput::var("mouse_x", json!(x)).and("mouse_y", json!(y)))
    }
}
