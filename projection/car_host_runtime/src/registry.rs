use crate::error::BridgeResult;
use crate::template::{ScreenConfig, TemplateConfig};
use indexmap::IndexMap;
use tracing::debug;

/// Names tried, in order, before falling back to the first registered screen.
pub const ROOT_PRIORITY: [&str; 2] = ["root", "main"];

/// Named screen configurations, last write wins.
#[derive(Debug, Clone, Default)]
pub struct ScreenRegistry {
    screens: IndexMap<String, ScreenConfig>,
}

impl ScreenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `config`, replacing any screen with the same name.
    ///
    /// A replaced screen keeps its original insertion slot, so re-registering
    /// does not change which screen counts as "first registered".
    pub fn register(&mut self, config: ScreenConfig) -> BridgeResult<()> {
        config.validate()?;
        debug!(
            screen = %config.name,
            template = config.template.kind(),
            "registering screen"
        );
        self.screens.insert(config.name.clone(), config);
        debug!(total = self.screens.len(), "screen registered");
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&ScreenConfig> {
        self.screens.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.screens.contains_key(name)
    }

    /// Replaces only the template of an existing screen.
    pub fn replace_template(&mut self, name: &str, template: TemplateConfig) -> bool {
        match self.screens.get_mut(name) {
            Some(config) => {
                config.template = template;
                true
            }
            None => false,
        }
    }

    pub fn all(&self) -> IndexMap<String, ScreenConfig> {
        self.screens.clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.screens.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.screens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.screens.is_empty()
    }

    /// `"root"`, then `"main"`, then whichever screen was registered first.
    pub fn select_root(&self) -> Option<&str> {
        ROOT_PRIORITY
            .iter()
            .find_map(|name| self.screens.get_key_value(*name).map(|(key, _)| key.as_str()))
            .or_else(|| self.screens.keys().next().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;

    fn message(name: &str, text: &str) -> ScreenConfig {
        ScreenConfig::new(name, TemplateConfig::message("Title", text))
    }

    #[test]
    fn lookup_returns_last_registration() {
        let mut registry = ScreenRegistry::new();
        registry.register(message("home", "first")).expect("register");
        registry.register(message("home", "second")).expect("register");

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("home"), Some(&message("home", "second")));
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut registry = ScreenRegistry::new();
        let err = registry.register(message("", "x")).expect_err("expected invalid");
        assert!(matches!(err, BridgeError::InvalidArgument(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn root_selection_prefers_root_then_main_then_first() {
        let mut registry = ScreenRegistry::new();
        assert_eq!(registry.select_root(), None);

        registry.register(message("details", "d")).expect("register");
        registry.register(message("settings", "s")).expect("register");
        assert_eq!(registry.select_root(), Some("details"));

        registry.register(message("main", "m")).expect("register");
        assert_eq!(registry.select_root(), Some("main"));

        registry.register(message("root", "r")).expect("register");
        assert_eq!(registry.select_root(), Some("root"));
    }

    #[test]
    fn replace_template_requires_existing_screen() {
        let mut registry = ScreenRegistry::new();
        assert!(!registry.replace_template("nope", TemplateConfig::message("t", "m")));

        registry.register(message("home", "old")).expect("register");
        assert!(registry.replace_template("home", TemplateConfig::message("Title", "new")));
        assert_eq!(registry.lookup("home"), Some(&message("home", "new")));
    }

    #[test]
    fn all_is_a_snapshot() {
        let mut registry = ScreenRegistry::new();
        registry.register(message("a", "1")).expect("register");
        let snapshot = registry.all();
        registry.register(message("b", "2")).expect("register");

        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
    }
}
