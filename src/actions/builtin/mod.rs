//! Builtin action library, grouped by category
//!
//! Most actions are thin driver calls. Actions whose body is just a fixed
//! key combination (browser navigation, edit commands, parts of the window
//! and system families) share the [`KeyComboShortcut`] handler.

mod browser;
mod clipboard;
mod edit;
mod file;
mod keyboard;
mod mouse;
mod screen;
mod shared;
mod system;
mod timing;
pub mod vision;
mod window;

use std::sync::Arc;

use super::ActionHandler;

pub use shared::{KeyComboShortcut, SystemCommandAction};
pub use vision::VisualNavigateHandler;

/// Every builtin handler, ready for registration
pub fn all() -> Vec<Arc<dyn ActionHandler>> {
    let mut handlers: Vec<Arc<dyn ActionHandler>> = Vec::new();
    handlers.extend(keyboard::handlers());
    handlers.extend(mouse::handlers());
    handlers.extend(window::handlers());
    handlers.extend(browser::handlers());
    handlers.extend(clipboard::handlers());
    handlers.extend(file::handlers());
    handlers.extend(screen::handlers());
    handlers.extend(timing::handlers());
    handlers.extend(vision::handlers());
    handlers.extend(system::handlers());
    handlers.extend(edit::handlers());
    handlers
}
