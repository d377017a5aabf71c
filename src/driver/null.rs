//! Logging no-op driver
//!
//! Backs `dry_run` mode and environments without a display. Every call is
//! logged and succeeds; reads return canned values.

use async_trait::async_trait;
use std::sync::Mutex;
use tracing::debug;

use super::{DriverError, MouseButton, PlatformDriver, Screenshot, WindowInfo};

/// Smallest syntactically valid JPEG (SOI + EOI), enough for encoders
/// downstream that only base64 the bytes.
const PLACEHOLDER_JPEG: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xD9];

/// A driver that performs nothing against the OS
pub struct NullDriver {
    screen: (u32, u32),
    mouse: Mutex<(i32, i32)>,
    clipboard: Mutex<String>,
}

impl NullDriver {
    pub fn new() -> Self {
        Self::with_screen(1920, 1080)
    }

    /// Pretend the screen has the given size
    pub fn with_screen(width: u32, height: u32) -> Self {
        Self {
            screen: (width, height),
            mouse: Mutex::new((width as i32 / 2, height as i32 / 2)),
            clipboard: Mutex::new(String::new()),
        }
    }
}

impl Default for NullDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformDriver for NullDriver {
    async fn screen_size(&self) -> Result<(u32, u32), DriverError> {
        Ok(self.screen)
    }

    async fn mouse_position(&self) -> Result<(i32, i32), DriverError> {
        Ok(*self.mouse.lock().unwrap())
    }

    async fn mouse_move(&self, x: i32, y: i32) -> Result<(), DriverError> {
        debug!(x, y, "NullDriver: mouse_move");
        *self.mouse.lock().unwrap() = (x, y);
        Ok(())
    }

    async fn mouse_down(&self, button: MouseButton) -> Result<(), DriverError> {
        debug!(?button, "NullDriver: mouse_down");
        Ok(())
    }

    async fn mouse_up(&self, button: MouseButton) -> Result<(), DriverError> {
        debug!(?button, "NullDriver: mouse_up");
        Ok(())
    }

    async fn click(&self, button: MouseButton) -> Result<(), DriverError> {
        debug!(?button, "NullDriver: click");
        Ok(())
    }

    async fn double_click(&self, button: MouseButton) -> Result<(), DriverError> {
        debug!(?button, "NullDriver: double_click");
        Ok(())
    }

    async fn scroll(&self, dx: i32, dy: i32) -> Result<(), DriverError> {
        debug!(dx, dy, "NullDriver: scroll");
        Ok(())
    }

    async fn key_press(&self, key: &str) -> Result<(), DriverError> {
        debug!(%key, "NullDriver: key_press");
        Ok(())
    }

    async fn key_combo(&self, keys: &[String]) -> Result<(), DriverError> {
        debug!(?keys, "NullDriver: key_combo");
        Ok(())
    }

    async fn key_down(&self, key: &str) -> Result<(), DriverError> {
        debug!(%key, "NullDriver: key_down");
        Ok(())
    }

    async fn key_up(&self, key: &str) -> Result<(), DriverError> {
        debug!(%key, "NullDriver: key_up");
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), DriverError> {
        debug!(len = text.len(), "NullDriver: type_text");
        Ok(())
    }

    async fn capture_screen(&self, quality: u8) -> Result<Screenshot, DriverError> {
        debug!(quality, "NullDriver: capture_screen");
        Ok(Screenshot {
            width: self.screen.0,
            height: self.screen.1,
            jpeg: PLACEHOLDER_JPEG.to_vec(),
        })
    }

    async fn capture_region(&self, x: i32, y: i32, w: u32, h: u32, quality: u8) -> Result<Screenshot, DriverError> {
        debug!(x, y, w, h, quality, "NullDriver: capture_region");
        Ok(Screenshot {
            width: w,
            height: h,
            jpeg: PLACEHOLDER_JPEG.to_vec(),
        })
    }

    async fn pixel_at(&self, x: i32, y: i32) -> Result<(u8, u8, u8), DriverError> {
        debug!(x, y, "NullDriver: pixel_at");
        Ok((0, 0, 0))
    }

    async fn clipboard_get(&self) -> Result<String, DriverError> {
        Ok(self.clipboard.lock().unwrap().clone())
    }

    async fn clipboard_set(&self, text: &str) -> Result<(), DriverError> {
        debug!(len = text.len(), "NullDriver: clipboard_set");
        *self.clipboard.lock().unwrap() = text.to_string();
        Ok(())
    }

    async fn list_windows(&self) -> Result<Vec<WindowInfo>, DriverError> {
        Ok(Vec::new())
    }

    async fn active_window(&self) -> Result<Option<WindowInfo>, DriverError> {
        Ok(None)
    }

    async fn focus_window(&self, title: &str) -> Result<bool, DriverError> {
        debug!(%title, "NullDriver: focus_window");
        Ok(true)
    }

    async fn launch_app(&self, command: &str) -> Result<(), DriverError> {
        debug!(%command, "NullDriver: launch_app");
        Ok(())
    }
}
