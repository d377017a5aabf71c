//! Platform driver - the OS capability boundary
//!
//! Everything the executor does to the host goes through [`PlatformDriver`]:
//! pointer, keys, screenshots, clipboard, window enumeration and app launch.
//! Window manipulation beyond enumeration (minimize, switch, ...) is composed
//! from key combos by the action handlers, keeping this surface thin.

mod null;
mod recording;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use null::NullDriver;
pub use recording::{DriverCall, RecordingDriver};

/// Driver-level failure, wrapped into `DRIVER_FAILURE` by handlers
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("{0}")]
    Failed(String),
}

/// Mouse button identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

impl MouseButton {
    /// Parse the wire name used in protocol params ("left", "middle", "right")
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "left" => Some(MouseButton::Left),
            "middle" => Some(MouseButton::Middle),
            "right" => Some(MouseButton::Right),
            _ => None,
        }
    }
}

/// An encoded screen capture
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub width: u32,
    pub height: u32,
    /// JPEG bytes at the quality requested from the driver
    pub jpeg: Vec<u8>,
}

/// One entry from window enumeration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub title: String,
    pub app: String,
    pub focused: bool,
}

/// The OS actuation surface.
///
/// Implementations must be cheap to call repeatedly; every method is
/// expected to complete in well under a second. Long waits belong to the
/// callers (timing handlers), not the driver.
#[async_trait]
pub trait PlatformDriver: Send + Sync {
    /// Primary screen size in pixels
    async fn screen_size(&self) -> Result<(u32, u32), DriverError>;

    /// Current pointer position
    async fn mouse_position(&self) -> Result<(i32, i32), DriverError>;

    /// Move the pointer to absolute coordinates
    async fn mouse_move(&self, x: i32, y: i32) -> Result<(), DriverError>;

    /// Press and hold a mouse button
    async fn mouse_down(&self, button: MouseButton) -> Result<(), DriverError>;

    /// Release a mouse button
    async fn mouse_up(&self, button: MouseButton) -> Result<(), DriverError>;

    /// Click at the current pointer position
    async fn click(&self, button: MouseButton) -> Result<(), DriverError>;

    /// Double-click at the current pointer position
    async fn double_click(&self, button: MouseButton) -> Result<(), DriverError>;

    /// Scroll by wheel notches; positive `dy` scrolls down
    async fn scroll(&self, dx: i32, dy: i32) -> Result<(), DriverError>;

    /// Tap a single named key ("enter", "tab", "f5", ...)
    async fn key_press(&self, key: &str) -> Result<(), DriverError>;

    /// Press a combination in order, release in reverse ("ctrl"+"c")
    async fn key_combo(&self, keys: &[String]) -> Result<(), DriverError>;

    /// Hold a key until `key_up`
    async fn key_down(&self, key: &str) -> Result<(), DriverError>;

    /// Release a held key
    async fn key_up(&self, key: &str) -> Result<(), DriverError>;

    /// Type literal text
    async fn type_text(&self, text: &str) -> Result<(), DriverError>;

    /// Capture the whole screen as JPEG at the given quality (1-100)
    async fn capture_screen(&self, quality: u8) -> Result<Screenshot, DriverError>;

    /// Capture a region of the screen
    async fn capture_region(&self, x: i32, y: i32, w: u32, h: u32, quality: u8) -> Result<Screenshot, DriverError>;

    /// Sample the RGB color of one pixel
    async fn pixel_at(&self, x: i32, y: i32) -> Result<(u8, u8, u8), DriverError>;

    /// Read the clipboard as text
    async fn clipboard_get(&self) -> Result<String, DriverError>;

    /// Replace the clipboard text
    async fn clipboard_set(&self, text: &str) -> Result<(), DriverError>;

    /// Enumerate top-level windows
    async fn list_windows(&self) -> Result<Vec<WindowInfo>, DriverError>;

    /// The currently focused window, if any
    async fn active_window(&self) -> Result<Option<WindowInfo>, DriverError>;

    /// Focus the first window whose title contains `title`; false if none
    async fn focus_window(&self, title: &str) -> Result<bool, DriverError>;

    /// Launch an application or command line, without waiting for it
    async fn launch_app(&self, command: &str) -> Result<(), DriverError>;
}
