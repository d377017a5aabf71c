//! Recording driver for tests
//!
//! Behaves like [`NullDriver`](super::NullDriver) but keeps an ordered log
//! of every actuation call so tests can assert on the exact driver sequence
//! a protocol produced.

use async_trait::async_trait;
use std::sync::Mutex;

use super::{DriverError, MouseButton, PlatformDriver, Screenshot, WindowInfo};

/// One recorded actuation call
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    MouseMove { x: i32, y: i32 },
    MouseDown { button: MouseButton },
    MouseUp { button: MouseButton },
    Click { button: MouseButton },
    DoubleClick { button: MouseButton },
    Scroll { dx: i32, dy: i32 },
    KeyPress { key: String },
    KeyCombo { keys: Vec<String> },
    KeyDown { key: String },
    KeyUp { key: String },
    TypeText { text: String },
    CaptureScreen,
    CaptureRegion { x: i32, y: i32, w: u32, h: u32 },
    ClipboardSet { text: String },
    FocusWindow { title: String },
    LaunchApp { command: String },
}

/// Driver that records calls and returns canned values
pub struct RecordingDriver {
    screen: (u32, u32),
    mouse: Mutex<(i32, i32)>,
    clipboard: Mutex<String>,
    windows: Vec<WindowInfo>,
    pixel: (u8, u8, u8),
    calls: Mutex<Vec<DriverCall>>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::with_screen(1920, 1080)
    }

    pub fn with_screen(width: u32, height: u32) -> Self {
        Self {
            screen: (width, height),
            mouse: Mutex::new((width as i32 / 2, height as i32 / 2)),
            clipboard: Mutex::new(String::new()),
            windows: Vec::new(),
            pixel: (0, 0, 0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Seed the window list returned by enumeration
    pub fn with_windows(mut self, windows: Vec<WindowInfo>) -> Self {
        self.windows = windows;
        self
    }

    /// Fix the color every pixel probe reports
    pub fn with_pixel(mut self, rgb: (u8, u8, u8)) -> Self {
        self.pixel = rgb;
        self
    }

    /// Snapshot of the recorded call sequence
    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded calls matching a predicate
    pub fn calls_where(&self, pred: impl Fn(&DriverCall) -> bool) -> Vec<DriverCall> {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).cloned().collect()
    }

    fn record(&self, call: DriverCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Default for RecordingDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformDriver for RecordingDriver {
    async fn screen_size(&self) -> Result<(u32, u32), DriverError> {
        Ok(self.screen)
    }

    async fn mouse_position(&self) -> Result<(i32, i32), DriverError> {
        Ok(*self.mouse.lock().unwrap())
    }

    async fn mouse_move(&self, x: i32, y: i32) -> Result<(), DriverError> {
        *self.mouse.lock().unwrap() = (x, y);
        self.record(DriverCall::MouseMove { x, y });
        Ok(())
    }

    async fn mouse_down(&self, button: MouseButton) -> Result<(), DriverError> {
        self.record(DriverCall::MouseDown { button });
        Ok(())
    }

    async fn mouse_up(&self, button: MouseButton) -> Result<(), DriverError> {
        self.record(DriverCall::MouseUp { button });
        Ok(())
    }

    async fn click(&self, button: MouseButton) -> Result<(), DriverError> {
        self.record(DriverCall::Click { button });
        Ok(())
    }

    async fn double_click(&self, button: MouseButton) -> Result<(), DriverError> {
        self.record(DriverCall::DoubleClick { button });
        Ok(())
    }

    async fn scroll(&self, dx: i32, dy: i32) -> Result<(), DriverError> {
        self.record(DriverCall::Scroll { dx, dy });
        Ok(())
    }

    async fn key_press(&self, key: &str) -> Result<(), DriverError> {
        self.record(DriverCall::KeyPress { key: key.to_string() });
        Ok(())
    }

    async fn key_combo(&self, keys: &[String]) -> Result<(), DriverError> {
        self.record(DriverCall::KeyCombo { keys: keys.to_vec() });
        Ok(())
    }

    async fn key_down(&self, key: &str) -> Result<(), DriverError> {
        self.record(DriverCall::KeyDown { key: key.to_string() });
        Ok(())
    }

    async fn key_up(&self, key: &str) -> Result<(), DriverError> {
        self.record(DriverCall::KeyUp { key: key.to_string() });
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), DriverError> {
        self.record(DriverCall::TypeText { text: text.to_string() });
        Ok(())
    }

    async fn capture_screen(&self, _quality: u8) -> Result<Screenshot, DriverError> {
        self.record(DriverCall::CaptureScreen);
        Ok(Screenshot {
            width: self.screen.0,
            height: self.screen.1,
            jpeg: vec![0xFF, 0xD8, 0xFF, 0xD9],
        })
    }

    async fn capture_region(&self, x: i32, y: i32, w: u32, h: u32, _quality: u8) -> Result<Screenshot, DriverError> {
        self.record(DriverCall::CaptureRegion { x, y, w, h });
        Ok(Screenshot {
            width: w,
            height: h,
            jpeg: vec![0xFF, 0xD8, 0xFF, 0xD9],
        })
    }

    async fn pixel_at(&self, _x: i32, _y: i32) -> Result<(u8, u8, u8), DriverError> {
        Ok(self.pixel)
    }

    async fn clipboard_get(&self) -> Result<String, DriverError> {
        Ok(self.clipboard.lock().unwrap().clone())
    }

    async fn clipboard_set(&self, text: &str) -> Result<(), DriverError> {
        *self.clipboard.lock().unwrap() = text.to_string();
        self.record(DriverCall::ClipboardSet { text: text.to_string() });
        Ok(())
    }

    async fn list_windows(&self) -> Result<Vec<WindowInfo>, DriverError> {
        Ok(self.windows.clone())
    }

    async fn active_window(&self) -> Result<Option<WindowInfo>, DriverError> {
        Ok(self.windows.iter().find(|w| w.focused).cloned())
    }

    async fn focus_window(&self, title: &str) -> Result<bool, DriverError> {
        self.record(DriverCall::FocusWindow { title: title.to_string() });
        Ok(self.windows.iter().any(|w| w.title.contains(title)))
    }

    async fn launch_app(&self, command: &str) -> Result<(), DriverError> {
        self.record(DriverCall::LaunchApp {
            command: command.to_string(),
        });
        Ok(())
    }
}
