//! Kernel provider: kernel type discovery and kernel manager construction.

use std::collections::BTreeMap;
use std::sync::Arc;

use rkernel_config::{
    Config, ConfigError, KernelManagerConfig, KernelSpecLoader, ProviderConfig,
};
use rkernel_protocols::KernelSpec;
use tracing::{debug, info, warn};

use crate::env::{KernelOverrides, PreparedLaunch};
use crate::error::KernelError;
use crate::manager::KernelManager;
use crate::registry::LifecycleRegistry;

/// Registry of kernel types and factory of kernel managers.
///
/// Specs are fixed at construction; lookups need no locking.
pub struct KernelProvider {
    specs: BTreeMap<String, Arc<KernelSpec>>,
    registry: Arc<LifecycleRegistry>,
    manager_config: KernelManagerConfig,
    provider_config: ProviderConfig,
}

impl KernelProvider {
    /// Create a provider over the given kernel specs.
    ///
    /// Fails on duplicate kernel type names or an invalid manager config.
    pub fn new(
        specs: Vec<KernelSpec>,
        registry: Arc<LifecycleRegistry>,
        manager_config: KernelManagerConfig,
        provider_config: ProviderConfig,
    ) -> Result<Self, KernelError> {
        manager_config.validate()?;

        let mut by_name = BTreeMap::new();
        for spec in specs {
            let name = spec.name.clone();
            if by_name.insert(name.clone(), Arc::new(spec)).is_some() {
                return Err(KernelError::DuplicateKernelType(name));
            }
        }

        let provider = Self {
            specs: by_name,
            registry,
            manager_config,
            provider_config,
        };

        for spec in provider.specs.values() {
            let class_name = provider.resolve_class_name(&spec.lifecycle.class_name);
            if !provider.registry.contains(class_name) {
                warn!(
                    "Kernel type '{}' uses unregistered lifecycle manager '{}'",
                    spec.name, class_name
                );
            }
        }

        info!("Kernel provider ready with {} kernel types", provider.specs.len());
        Ok(provider)
    }

    /// Build a provider from inline and scanned kernel specs.
    pub fn from_config(config: &Config, registry: Arc<LifecycleRegistry>) -> Result<Self, KernelError> {
        let specs = KernelSpecLoader::from_config(config)?;
        Self::new(
            specs,
            registry,
            config.manager.clone(),
            config.provider.clone(),
        )
    }

    /// All kernel types, ordered by name.
    pub fn list_kernel_types(&self) -> Vec<Arc<KernelSpec>> {
        self.specs.values().cloned().collect()
    }

    pub fn kernel_spec(&self, name: &str) -> Option<Arc<KernelSpec>> {
        self.specs.get(name).cloned()
    }

    pub fn registry(&self) -> &Arc<LifecycleRegistry> {
        &self.registry
    }

    /// Map a legacy lifecycle class name to its registered implementation.
    pub fn resolve_class_name<'a>(&'a self, class_name: &'a str) -> &'a str {
        match self.provider_config.lifecycle_aliases.get(class_name) {
            Some(target) => {
                debug!("Lifecycle class '{}' is an alias of '{}'", class_name, target);
                target
            }
            None => class_name,
        }
    }

    /// Create a kernel manager for the named kernel type.
    ///
    /// Every manager gets a fresh lifecycle manager instance. The manager is
    /// returned in `NotStarted`; nothing is launched yet.
    pub fn create_kernel_manager(
        &self,
        name: &str,
        overrides: KernelOverrides,
    ) -> Result<KernelManager, KernelError> {
        let spec = self
            .specs
            .get(name)
            .cloned()
            .ok_or_else(|| KernelError::UnknownKernelType(name.to_string()))?;

        let class_name = self.resolve_class_name(&spec.lifecycle.class_name);
        if class_name != spec.lifecycle.class_name {
            warn!(
                "Kernel type '{}' uses legacy lifecycle class '{}', use '{}' instead",
                spec.name, spec.lifecycle.class_name, class_name
            );
        }
        let factory = self
            .registry
            .get(class_name)
            .ok_or_else(|| KernelError::UnknownLifecycleManager(class_name.to_string()))?;

        let mut config = self.manager_config.clone();
        if let Some(secs) = overrides.launch_timeout_secs {
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "launch_timeout_secs".to_string(),
                    message: "must be > 0".to_string(),
                }
                .into());
            }
            config.launch_timeout_secs = secs;
        }

        let lifecycle = factory.create(&spec)?;
        let launch = PreparedLaunch::prepare(&spec, &overrides, &self.provider_config.env_whitelist);

        info!(
            kernel_id = %launch.kernel_id,
            "Created kernel manager for '{}' using {}",
            spec.name,
            lifecycle.name()
        );
        Ok(KernelManager::new(spec, lifecycle, config, launch))
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
