//! System actions
//!
//! Volume and lock go through key events; power transitions launch the
//! platform's service manager. These default to enabled - deployments that
//! do not want protocols touching power state disable the category or the
//! individual actions in configuration.

use std::sync::Arc;

use crate::actions::{ActionHandler, Category};

use super::shared::{KeyComboShortcut, SystemCommandAction};

pub fn handlers() -> Vec<Arc<dyn ActionHandler>> {
    vec![
        Arc::new(KeyComboShortcut::new("lock_screen", &["super", "l"], Category::System)),
        Arc::new(SystemCommandAction::new("sleep_system", "systemctl suspend")),
        Arc::new(SystemCommandAction::new("shutdown_system", "systemctl poweroff")),
        Arc::new(SystemCommandAction::new("restart_system", "systemctl reboot")),
        Arc::new(KeyComboShortcut::new("volume_up", &["xf86audioraisevolume"], Category::System)),
        Arc::new(KeyComboShortcut::new("volume_down", &["xf86audiolowervolume"], Category::System)),
        Arc::new(KeyComboShortcut::new("volume_mute", &["xf86audiomute"], Category::System)),
    ]
}
