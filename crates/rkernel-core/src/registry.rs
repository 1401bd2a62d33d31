//! Lifecycle manager factory registry.
//!
//! Backends register a factory under their class name before the provider
//! is built. Lookups afterwards are concurrent reads.

use std::sync::Arc;

use dashmap::DashMap;
use rkernel_protocols::LifecycleManagerFactory;

use crate::error::KernelError;

/// Registry of lifecycle manager factories keyed by class name.
pub struct LifecycleRegistry {
    factories: DashMap<String, Arc<dyn LifecycleManagerFactory>>,
}

impl LifecycleRegistry {
    pub fn new() -> Self {
        Self {
            factories: DashMap::new(),
        }
    }

    /// Register a factory.
    ///
    /// Returns an error if a factory with the same class name exists.
    pub fn register(&self, factory: Arc<dyn LifecycleManagerFactory>) -> Result<(), KernelError> {
        let name = factory.class_name().to_string();

        if self.factories.contains_key(&name) {
            return Err(KernelError::AlreadyRegistered(name));
        }

        self.factories.insert(name, factory);
        Ok(())
    }

    /// Unregister a factory by class name.
    pub fn unregister(&self, class_name: &str) -> Result<(), KernelError> {
        self.factories
            .remove(class_name)
            .ok_or_else(|| KernelError::UnknownLifecycleManager(class_name.to_string()))?;
        Ok(())
    }

    pub fn get(&self, class_name: &str) -> Option<Arc<dyn LifecycleManagerFactory>> {
        self.factories.get(class_name).map(|f| f.clone())
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.factories.contains_key(class_name)
    }

    /// Registered class names, sorted.
    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.iter().map(|f| f.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Default for LifecycleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeFactory;

    #[test]
    fn test_registry_new() {
        let registry = LifecycleRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_register_and_get() {
        let registry = LifecycleRegistry::default();
        registry.register(Arc::new(FakeFactory::new("fake"))).unwrap();

        assert!(registry.contains("fake"));
        assert_eq!(registry.get("fake").unwrap().class_name(), "fake");
        assert!(registry.get("yarn").is_none());
    }

    #[test]
    fn test_register_duplicate() {
        let registry = LifecycleRegistry::new();
        registry.register(Arc::new(FakeFactory::new("fake"))).unwrap();

        let result = registry.register(Arc::new(FakeFactory::new("fake")));
        assert!(matches!(result, Err(KernelError::AlreadyRegistered(ref n)) if n == "fake"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister() {
        let registry = LifecycleRegistry::new();
        registry.register(Arc::new(FakeFactory::new("fake"))).unwrap();

        registry.unregister("fake").unwrap();
        assert!(registry.is_empty());
        assert!(registry.unregister("fake").is_err());
    }

    #[test]
    fn test_list_names_sorted() {
        let registry = LifecycleRegistry::new();
        registry.register(Arc::new(FakeFactory::new("yarn"))).unwrap();
        registry.register(Arc::new(FakeFactory::new("docker"))).unwrap();
        registry.register(Arc::new(FakeFactory::new("kubernetes"))).unwrap();

        assert_eq!(registry.list_names(), vec!["docker", "kubernetes", "yarn"]);
    }
}
