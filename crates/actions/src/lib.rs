//! Action registry and built-in actions for Wayfarer.
//!
//! Actions give the agent the ability to drive its environment:
//! navigate, click, type, read content, manage tabs, scroll, wait,
//! and declare the task done.

pub mod content;
pub mod control;
pub mod interaction;
pub mod navigation;
pub mod registry;

#[cfg(test)]
pub(crate) mod test_support;

pub use registry::{ActionDescriptor, ActionRegistry, Catalog, TaskScope, normalize_url};

use wayfarer_core::error::ActionError;

/// Register every built-in action on `registry`.
pub fn register_builtins(registry: &ActionRegistry) -> Result<(), ActionError> {
    navigation::register(registry)?;
    interaction::register(registry)?;
    content::register(registry)?;
    control::register(registry)?;
    Ok(())
}

/// Create a registry holding all built-in actions.
pub fn default_registry() -> ActionRegistry {
    let registry = ActionRegistry::new();
    if let Err(e) = register_builtins(&registry) {
        tracing::error!(error = %e, "Failed to register built-in actions");
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_every_builtin() {
        let registry = default_registry();
        let names = registry.names();
        for expected in [
            "click_element",
            "close_tab",
            "done",
            "extract_content",
            "go_back",
            "go_to_url",
            "input_text",
            "open_tab",
            "scroll_down",
            "scroll_up",
            "switch_tab",
            "wait",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
        assert_eq!(names.len(), 12);
    }
}
