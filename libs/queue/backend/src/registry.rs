//! Named backend registry.
//!
//! The process-wide default registry is an explicit-init singleton; tests
//! construct private registries and never touch the default.

use crate::backend::QueueBackend;
use crate::error::{BackendError, BackendResult};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::info;

/// Named collection of backend instances.
pub struct BackendRegistry {
    backends: RwLock<HashMap<String, Arc<dyn QueueBackend>>>,
    default_name: RwLock<Option<String>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: RwLock::new(HashMap::new()),
            default_name: RwLock::new(None),
        }
    }

    /// Register a backend under its own name. The first registration becomes
    /// the default.
    pub fn register(&self, backend: Arc<dyn QueueBackend>) {
        let name = backend.name().to_string();
        let mut backends = self.backends.write().unwrap();
        backends.insert(name.clone(), backend);

        let mut default = self.default_name.write().unwrap();
        if default.is_none() {
            *default = Some(name.clone());
        }
        info!(backend = %name, "Registered backend");
    }

    pub fn get(&self, name: &str) -> BackendResult<Arc<dyn QueueBackend>> {
        self.backends
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| BackendError::BackendNotFound(name.to_string()))
    }

    /// The default backend (first registered, unless overridden).
    pub fn default_backend(&self) -> BackendResult<Arc<dyn QueueBackend>> {
        let name = self
            .default_name
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| BackendError::BackendNotFound("default".to_string()))?;
        self.get(&name)
    }

    pub fn set_default(&self, name: &str) -> BackendResult<()> {
        if !self.backends.read().unwrap().contains_key(name) {
            return Err(BackendError::BackendNotFound(name.to_string()));
        }
        *self.default_name.write().unwrap() = Some(name.to_string());
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Option<Arc<dyn QueueBackend>> {
        let removed = self.backends.write().unwrap().remove(name);
        let mut default = self.default_name.write().unwrap();
        if default.as_deref() == Some(name) {
            *default = None;
        }
        removed
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static DEFAULT_REGISTRY: Lazy<RwLock<Option<Arc<BackendRegistry>>>> =
    Lazy::new(|| RwLock::new(None));

/// Install the process-wide default registry. Replaces any previous one.
pub fn init_default_registry() -> Arc<BackendRegistry> {
    let registry = Arc::new(BackendRegistry::new());
    *DEFAULT_REGISTRY.write().unwrap() = Some(registry.clone());
    registry
}

/// The process-wide default registry, if initialized.
pub fn default_registry() -> Option<Arc<BackendRegistry>> {
    DEFAULT_REGISTRY.read().unwrap().clone()
}

/// Drop the process-wide default registry.
pub fn teardown_default_registry() {
    *DEFAULT_REGISTRY.write().unwrap() = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;

    #[test]
    fn test_register_and_get() {
        let registry = BackendRegistry::new();
        registry.register(Arc::new(MemoryBackend::new("primary")));

        assert!(registry.get("primary").is_ok());
        assert!(matches!(
            registry.get("missing"),
            Err(BackendError::BackendNotFound(_))
        ));
    }

    #[test]
    fn test_first_registration_is_default() {
        let registry = BackendRegistry::new();
        registry.register(Arc::new(MemoryBackend::new("first")));
        registry.register(Arc::new(MemoryBackend::new("second")));

        assert_eq!(registry.default_backend().unwrap().name(), "first");

        registry.set_default("second").unwrap();
        assert_eq!(registry.default_backend().unwrap().name(), "second");
    }

    #[test]
    fn test_remove_clears_default() {
        let registry = BackendRegistry::new();
        registry.register(Arc::new(MemoryBackend::new("only")));
        registry.remove("only");

        assert!(registry.default_backend().is_err());
        assert!(registry.names().is_empty());
    }

    #[test]
    fn test_default_registry_lifecycle() {
        let registry = init_default_registry();
        registry.register(Arc::new(MemoryBackend::new("global")));

        let fetched = default_registry().expect("default registry installed");
        assert!(fetched.get("global").is_ok());

        teardown_default_registry();
        assert!(default_registry().is_none());
    }
}
