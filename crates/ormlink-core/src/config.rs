//! Session configuration.

use serde::{Deserialize, Serialize};

/// Default maximum depth of a cascading save.
pub const DEFAULT_MAX_CASCADE_DEPTH: usize = 256;

/// Configuration for a [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum recursion depth of a cascading save.
    pub max_cascade_depth: usize,

    /// Infer back-reference names from the owning entity's name when neither
    /// side of a relationship declares one.
    pub infer_backrefs: bool,

    /// When inferring, also try the plural form (`user` -> `users`).
    pub pluralize_backrefs: bool,

    /// Populate collections of persisted instances from the backend on first access.
    pub lazy_collections: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_cascade_depth: DEFAULT_MAX_CASCADE_DEPTH,
            infer_backrefs: true,
            pluralize_backrefs: true,
            lazy_collections: true,
        }
    }
}

impl SessionConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum cascade depth.
    pub fn with_max_cascade_depth(mut self, depth: usize) -> Self {
        self.max_cascade_depth = depth;
        self
    }

    /// Enable or disable back-reference inference.
    ///
    /// When disabled, every relationship must declare its back-reference on
    /// at least one side.
    pub fn infer_backrefs(mut self, infer: bool) -> Self {
        self.infer_backrefs = infer;
        self
    }

    /// Enable or disable plural back-reference inference.
    pub fn pluralize_backrefs(mut self, pluralize: bool) -> Self {
        self.pluralize_backrefs = pluralize;
        self
    }

    /// Enable or disable lazy collection population.
    pub fn lazy_collections(mut self, lazy: bool) -> Self {
        self.lazy_collections = lazy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.max_cascade_depth, DEFAULT_MAX_CASCADE_DEPTH);
        assert!(config.infer_backrefs);
        assert!(config.pluralize_backrefs);
        assert!(config.lazy_collections);
    }

    #[test]
    fn test_builder_methods() {
        let config = SessionConfig::new()
            .with_max_cascade_depth(8)
            .infer_backrefs(false)
            .lazy_collections(false);

        assert_eq!(config.max_cascade_depth, 8);
        assert!(!config.infer_backrefs);
        assert!(config.pluralize_backrefs);
        assert!(!config.lazy_collections);
    }

    #[test]
    fn test_partial_config_from_json() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"max_cascade_depth": 16, "lazy_collections": false}"#)
                .unwrap();

        assert_eq!(config.max_cascade_depth, 16);
        assert!(!config.lazy_collections);
        assert!(config.infer_backrefs);
    }
}
