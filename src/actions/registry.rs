//! ActionRegistry - name to handler table with category gating

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::ActionLibraryConfig;
use crate::protocol::ActionCatalog;

use super::builtin;
use super::{ActionHandler, Category, HandlerDeps};

/// Immutable-after-startup table of action handlers.
///
/// Holds the shared collaborators (driver, broker, mouse controller) for
/// handlers that need them; `inject` is called once by the executor service
/// during startup. A handler invoked without its collaborators fails with
/// `VALIDATION_FAILURE`.
pub struct ActionRegistry {
    entries: BTreeMap<&'static str, Arc<dyn ActionHandler>>,
    library: ActionLibraryConfig,
    deps: Option<HandlerDeps>,
}

impl ActionRegistry {
    /// Empty registry (tests build these up by hand)
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            library: ActionLibraryConfig::default(),
            deps: None,
        }
    }

    /// Registry with the full builtin library
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for handler in builtin::all() {
            registry.register(handler);
        }
        debug!(count = registry.entries.len(), "ActionRegistry: standard library registered");
        registry
    }

    /// Apply the enable/disable configuration
    pub fn with_library(mut self, library: ActionLibraryConfig) -> Self {
        self.library = library;
        self
    }

    /// Add or replace a handler
    pub fn register(&mut self, handler: Arc<dyn ActionHandler>) {
        debug!(name = handler.name(), category = %handler.category(), "ActionRegistry: register");
        self.entries.insert(handler.name(), handler);
    }

    /// Look up a handler by action name
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn ActionHandler>> {
        self.entries.get(name).cloned()
    }

    /// Action names in a category, sorted
    pub fn list_by_category(&self, category: Category) -> Vec<&'static str> {
        self.entries
            .values()
            .filter(|h| h.category() == category)
            .map(|h| h.name())
            .collect()
    }

    /// Whether an action passes the category/action gating configuration
    pub fn is_enabled(&self, name: &str) -> bool {
        if self.library.disabled_actions.iter().any(|a| a == name) {
            return false;
        }
        let Some(handler) = self.entries.get(name) else {
            return false;
        };
        if self.library.enabled_categories.is_empty() {
            return true;
        }
        self.library
            .enabled_categories
            .iter()
            .any(|c| c == handler.category().as_str())
    }

    /// Install the shared collaborators. Called once at engine startup.
    pub fn inject(&mut self, deps: HandlerDeps) {
        debug!("ActionRegistry: collaborators injected");
        self.deps = Some(deps);
    }

    /// The injected collaborators, if any
    pub fn deps(&self) -> Option<&HandlerDeps> {
        self.deps.as_ref()
    }

    /// All registered action names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    /// Action-library description fed into the protocol generation prompt
    pub fn library_prompt(&self) -> String {
        let mut lines = Vec::with_capacity(self.entries.len());
        for handler in self.entries.values() {
            if !self.is_enabled(handler.name()) {
                continue;
            }
            let mut line = format!("- {} [{}]", handler.name(), handler.category());
            if !handler.required_params().is_empty() {
                line.push_str(&format!(" required: {}", handler.required_params().join(", ")));
            }
            if !handler.optional_params().is_empty() {
                line.push_str(&format!(" optional: {}", handler.optional_params().join(", ")));
            }
            if !handler.outputs().is_empty() {
                line.push_str(&format!(" -> sets: {}", handler.outputs().join(", ")));
            }
            lines.push(line);
        }
        lines.join("\n")
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl ActionCatalog for ActionRegistry {
    fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    fn required_params(&self, name: &str) -> Option<Vec<&'static str>> {
        self.entries.get(name).map(|h| h.required_params().to_vec())
    }

    fn known_params(&self, name: &str) -> Option<Vec<&'static str>> {
        self.entries.get(name).map(|h| {
            let mut params = h.required_params().to_vec();
            params.extend_from_slice(h.optional_params());
            params
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_library_has_core_actions() {
        let registry = ActionRegistry::standard();
        for name in [
            "press_key",
            "shortcut",
            "type",
            "mouse_move",
            "mouse_click",
            "open_app",
            "copy",
            "get_clipboard",
            "capture_screen",
            "delay",
            "verify_screen",
            "visual_navigate",
            "select_all",
            "open_url",
        ] {
            assert!(registry.lookup(name).is_some(), "missing action {}", name);
        }
    }

    #[test]
    fn test_macro_is_not_a_handler() {
        let registry = ActionRegistry::standard();
        assert!(registry.lookup("macro").is_none());
        assert!(!registry.contains("macro"));
    }

    #[test]
    fn test_list_by_category() {
        let registry = ActionRegistry::standard();
        let keyboard = registry.list_by_category(Category::Keyboard);
        assert!(keyboard.contains(&"press_key"));
        assert!(keyboard.contains(&"type"));
        assert!(!keyboard.contains(&"mouse_move"));
    }

    #[test]
    fn test_disabled_action_gating() {
        let registry = ActionRegistry::standard().with_library(ActionLibraryConfig {
            enabled_categories: Vec::new(),
            disabled_actions: vec!["shutdown_system".to_string()],
        });
        assert!(!registry.is_enabled("shutdown_system"));
        assert!(registry.is_enabled("press_key"));
    }

    #[test]
    fn test_category_gating() {
        let registry = ActionRegistry::standard().with_library(ActionLibraryConfig {
            enabled_categories: vec!["keyboard".to_string()],
            disabled_actions: Vec::new(),
        });
        assert!(registry.is_enabled("press_key"));
        assert!(!registry.is_enabled("mouse_move"));
    }

    #[test]
    fn test_catalog_params() {
        let registry = ActionRegistry::standard();
        assert!(registry.required_params("press_key").unwrap().contains(&"key"));
        assert!(registry.required_params("teleport").is_none());
        let known = registry.known_params("mouse_move").unwrap();
        assert!(known.contains(&"x"));
        assert!(known.contains(&"smooth"));
    }

    #[test]
    fn test_library_prompt_mentions_contracts() {
        let registry = ActionRegistry::standard();
        let prompt = registry.library_prompt();
        assert!(prompt.contains("- visual_navigate [vision] required: task"));
        assert!(prompt.contains("press_key"));
    }
}
