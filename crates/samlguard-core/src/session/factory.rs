//! Configuration-time registry of session-store backends.
//!
//! Maps a backend name to a constructor, resolved once at startup. The
//! embedding application registers backends that need runtime resources
//! (e.g. a connection pool) with a capturing closure.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::store::{InMemorySessionStore, SessionStore};
use crate::config::ConfigError;

type StoreConstructor = Box<dyn Fn() -> Arc<dyn SessionStore> + Send + Sync>;

/// Name-to-constructor registry for [`SessionStore`] backends.
pub struct SessionStoreRegistry {
    constructors: HashMap<String, StoreConstructor>,
}

impl SessionStoreRegistry {
    /// Registry with the built-in `memory` backend.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self {
            constructors: HashMap::new(),
        };
        registry.register("memory", || Arc::new(InMemorySessionStore::new()));
        registry
    }

    /// Register a backend constructor under a name. Re-registering a name
    /// replaces the previous constructor.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn() -> Arc<dyn SessionStore> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Box::new(constructor));
    }

    /// Resolve a backend by name. Unknown names are a configuration error.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn SessionStore>, ConfigError> {
        let constructor = self.constructors.get(name).ok_or(ConfigError::Invalid {
            name: "session_store",
            reason: format!("unknown backend '{name}'"),
        })?;
        info!(backend = %name, "Resolved session store backend");
        Ok(constructor())
    }

    /// Registered backend names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }
}

impl Default for SessionStoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_backend_is_builtin() {
        let registry = SessionStoreRegistry::new();
        assert!(registry.resolve("memory").is_ok());
    }

    #[test]
    fn unknown_backend_is_config_error() {
        let registry = SessionStoreRegistry::new();
        assert!(matches!(
            registry.resolve("bogus"),
            Err(ConfigError::Invalid { name: "session_store", .. })
        ));
    }

    #[test]
    fn custom_backend_can_be_registered() {
        let mut registry = SessionStoreRegistry::new();
        registry.register("custom", || Arc::new(InMemorySessionStore::new()));
        assert!(registry.resolve("custom").is_ok());
        assert!(registry.names().any(|n| n == "custom"));
    }
}
