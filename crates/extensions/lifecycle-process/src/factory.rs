//! Factory registered with the lifecycle registry.

use rkernel_protocols::{KernelSpec, LifecycleError, LifecycleManager, LifecycleManagerFactory};
use tracing::{debug, warn};

use crate::CLASS_NAME;
use crate::config::ProcessConfig;
use crate::process::ProcessLifecycleManager;

/// Kernel spec env entry naming an interrupt signal other than SIGINT.
pub const ALTERNATE_SIGINT: &str = "EG_ALTERNATE_SIGINT";

/// Builds a [`ProcessLifecycleManager`] per kernel from the spec's lifecycle config.
#[derive(Debug, Default)]
pub struct ProcessLifecycleFactory;

impl ProcessLifecycleFactory {
    pub fn new() -> Self {
        Self
    }

    /// Backend settings for one kernel spec.
    ///
    /// Without an explicit `interrupt_signal`, the spec env's
    /// `EG_ALTERNATE_SIGINT` applies; an unknown signal name falls back to
    /// SIGINT with a warning.
    pub fn config_for(&self, spec: &KernelSpec) -> Result<ProcessConfig, LifecycleError> {
        let mut config = ProcessConfig::from_value(&spec.lifecycle.config).map_err(|e| {
            LifecycleError::InvalidConfig(format!("kernel '{}': {}", spec.name, e))
        })?;

        let explicit = spec.lifecycle.config.get("interrupt_signal").is_some();
        let alternate = spec.env.get(ALTERNATE_SIGINT).filter(|_| !explicit);
        if let Some(alternate) = alternate {
            match crate::signal::parse_signal(alternate) {
                Ok(_) => {
                    debug!(
                        "Kernel '{}' is interrupted with {} ({})",
                        spec.name, alternate, ALTERNATE_SIGINT
                    );
                    config.interrupt_signal = alternate.clone();
                }
                Err(_) => warn!(
                    "Cannot use {} '{}' of kernel '{}', using SIGINT",
                    ALTERNATE_SIGINT, alternate, spec.display_name
                ),
            }
        }
        Ok(config)
    }
}

impl LifecycleManagerFactory for ProcessLifecycleFactory {
    fn class_name(&self) -> &str {
        CLASS_NAME
    }

    fn create(&self, spec: &KernelSpec) -> Result<Box<dyn LifecycleManager>, LifecycleError> {
        let config = self.config_for(spec)?;
        debug!("Process lifecycle for '{}': {:?}", spec.name, config);
        Ok(Box::new(ProcessLifecycleManager::new(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rkernel_protocols::LifecycleInfo;
    use serde_json::json;

    fn spec(config: serde_json::Value) -> KernelSpec {
        KernelSpec::new(
            "python_local",
            "Python (process)",
            vec!["python".to_string()],
            LifecycleInfo::new(CLASS_NAME).with_config(config),
        )
    }

    #[test]
    fn test_class_name() {
        assert_eq!(ProcessLifecycleFactory::new().class_name(), "process");
    }

    #[test]
    fn test_create() {
        let factory = ProcessLifecycleFactory::default();
        let manager = factory.create(&spec(json!({"interrupt_signal": "SIGUSR2"}))).unwrap();
        assert_eq!(manager.name(), "process");
    }

    #[test]
    fn test_create_invalid_config() {
        let factory = ProcessLifecycleFactory::new();
        let err = factory
            .create(&spec(json!({"response_ip": 42})))
            .err()
            .unwrap();
        assert!(err.to_string().contains("python_local"));
    }

    #[test]
    fn test_alternate_sigint_from_env() {
        let factory = ProcessLifecycleFactory::new();
        let scala = spec(serde_json::Value::Null).with_env(ALTERNATE_SIGINT, "SIGUSR2");

        let config = factory.config_for(&scala).unwrap();
        assert_eq!(config.interrupt_signal, "SIGUSR2");
    }

    #[test]
    fn test_explicit_interrupt_signal_wins() {
        let factory = ProcessLifecycleFactory::new();
        let scala = spec(json!({"interrupt_signal": "SIGTERM"})).with_env(ALTERNATE_SIGINT, "SIGUSR2");

        let config = factory.config_for(&scala).unwrap();
        assert_eq!(config.interrupt_signal, "SIGTERM");
    }

    #[cfg(unix)]
    #[test]
    fn test_unknown_alternate_sigint_falls_back() {
        let factory = ProcessLifecycleFactory::new();
        let scala = spec(json!({})).with_env(ALTERNATE_SIGINT, "SIGBOGUS");

        let config = factory.config_for(&scala).unwrap();
        assert_eq!(config.interrupt_signal, "SIGINT");
        assert!(factory.create(&scala).is_ok());
    }
}
