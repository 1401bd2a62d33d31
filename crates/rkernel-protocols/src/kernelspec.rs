//! Kernel type definitions.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Names the lifecycle manager implementation for a kernel type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleInfo {
    /// Registered implementation name (e.g. `process`, `yarn`, `kubernetes`).
    pub class_name: String,

    /// Backend-specific configuration, interpreted only by that backend.
    #[serde(default = "empty_config")]
    pub config: serde_json::Value,
}

fn empty_config() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl LifecycleInfo {
    /// Create lifecycle info with an empty configuration.
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            config: empty_config(),
        }
    }

    /// Set the backend configuration.
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }
}

/// Definition of a launchable kernel type.
///
/// Immutable once loaded; the provider shares it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelSpec {
    /// Unique kernel type name.
    pub name: String,

    /// Human-readable name for discovery UIs.
    pub display_name: String,

    /// Launch command template; `{placeholder}` arguments are substituted.
    pub argv: Vec<String>,

    /// Environment overlay applied to the kernel process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub language: String,

    /// Directory the spec was loaded from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_dir: Option<PathBuf>,

    /// Scheduling hints (queue, image, memory, ...).
    #[serde(default)]
    pub resources: BTreeMap<String, String>,

    /// Lifecycle manager selection.
    pub lifecycle: LifecycleInfo,
}

impl KernelSpec {
    /// Create a new kernel spec.
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        argv: Vec<String>,
        lifecycle: LifecycleInfo,
    ) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            argv,
            env: BTreeMap::new(),
            language: String::new(),
            resource_dir: None,
            resources: BTreeMap::new(),
            lifecycle,
        }
    }

    /// Add an environment variable to the overlay.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add a resource hint.
    pub fn with_resource(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.resources.insert(key.into(), value.into());
        self
    }

    /// Set the language.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Set the resource directory.
    pub fn with_resource_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.resource_dir = Some(dir.into());
        self
    }
}
