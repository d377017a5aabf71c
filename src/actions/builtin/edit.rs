//! Edit actions - standard editor chords

use std::sync::Arc;

use crate::actions::{ActionHandler, Category};

use super::shared::KeyComboShortcut;

pub fn handlers() -> Vec<Arc<dyn ActionHandler>> {
    vec![
        Arc::new(KeyComboShortcut::new("select_all", &["ctrl", "a"], Category::Edit)),
        Arc::new(KeyComboShortcut::new("undo", &["ctrl", "z"], Category::Edit)),
        Arc::new(KeyComboShortcut::new("redo", &["ctrl", "y"], Category::Edit)),
        Arc::new(KeyComboShortcut::new("find_replace", &["ctrl", "h"], Category::Edit)),
        Arc::new(KeyComboShortcut::new("delete_line", &["ctrl", "shift", "k"], Category::Edit)),
        Arc::new(KeyComboShortcut::new("duplicate_line", &["ctrl", "shift", "d"], Category::Edit)),
    ]
}
