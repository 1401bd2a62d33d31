//! Kernel spec source.
//!
//! Reads Jupyter-style kernel directories (`<dir>/<name>/kernel.json`) and
//! keeps only the specs that name a lifecycle manager, i.e. remote kernels.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use rkernel_protocols::{KernelSpec, LifecycleInfo};
use serde::Deserialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::ConfigError;
use crate::loader::ConfigLoader;
use crate::schema::Config;

/// Default kernel definition file name.
pub const KERNEL_FILE: &str = "kernel.json";

#[derive(Debug, Deserialize)]
struct KernelJson {
    argv: Vec<String>,
    display_name: String,
    #[serde(default)]
    language: String,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    metadata: KernelMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct KernelMetadata {
    #[serde(default)]
    lifecycle_manager: Option<LifecycleInfo>,
    /// Legacy stanza name.
    #[serde(default)]
    process_proxy: Option<LifecycleInfo>,
    #[serde(default)]
    resources: BTreeMap<String, serde_json::Value>,
}

/// Loads kernel specs from kernel directories.
#[derive(Debug, Clone)]
pub struct KernelSpecLoader {
    dirs: Vec<PathBuf>,
    file_name: String,
}

impl KernelSpecLoader {
    /// Create a loader over the given directories, in priority order.
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self {
            dirs,
            file_name: KERNEL_FILE.to_string(),
        }
    }

    /// Use a provider-specific definition file name (e.g. `yarn_kspec.json`).
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    /// The per-user Jupyter kernel directory, when it can be determined.
    pub fn default_dirs() -> Vec<PathBuf> {
        dirs::data_dir()
            .map(|d| vec![d.join("jupyter").join("kernels")])
            .unwrap_or_default()
    }

    /// Collect inline specs and scanned specs from a configuration.
    ///
    /// Inline definitions take precedence over scanned ones; among inline
    /// definitions the first of a name wins.
    pub fn from_config(config: &Config) -> Result<Vec<KernelSpec>, ConfigError> {
        let dirs = config
            .kernel_dirs
            .iter()
            .map(|d| PathBuf::from(ConfigLoader::expand_path(d)))
            .collect();
        let scanned = KernelSpecLoader::new(dirs).scan()?;

        let mut specs = Vec::new();
        merge_unique(&mut specs, config.kernels.clone());
        merge_unique(&mut specs, scanned);
        Ok(specs)
    }

    /// Scan all directories. The first definition of a name wins.
    pub fn scan(&self) -> Result<Vec<KernelSpec>, ConfigError> {
        let mut specs = Vec::new();

        for dir in &self.dirs {
            if !dir.is_dir() {
                debug!("Skipping missing kernel directory: {}", dir.display());
                continue;
            }

            let mut found = Vec::new();
            for entry in WalkDir::new(dir)
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name()
            {
                let entry = entry.map_err(std::io::Error::from)?;
                if !entry.file_type().is_dir() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().to_string();
                let path = entry.path().join(&self.file_name);
                if !path.is_file() {
                    continue;
                }
                match Self::load_file(&path, &name) {
                    Ok(Some(spec)) => found.push(spec),
                    Ok(None) => debug!("Kernel '{}' has no lifecycle manager, skipping", name),
                    Err(e) => warn!("Ignoring kernel '{}': {}", name, e),
                }
            }
            merge_unique(&mut specs, found);
        }

        Ok(specs)
    }

    /// Load a single definition file.
    ///
    /// Returns `Ok(None)` when the kernel does not name a lifecycle manager.
    pub fn load_file(path: &Path, name: &str) -> Result<Option<KernelSpec>, ConfigError> {
        let content = fs::read_to_string(path)?;
        let parsed: KernelJson =
            serde_json::from_str(&content).map_err(|e| ConfigError::InvalidKernelSpec {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if parsed.argv.is_empty() {
            return Err(ConfigError::InvalidKernelSpec {
                path: path.to_path_buf(),
                reason: "argv must not be empty".to_string(),
            });
        }

        let KernelMetadata {
            lifecycle_manager,
            process_proxy,
            resources,
        } = parsed.metadata;

        let Some(lifecycle) = lifecycle_manager.or(process_proxy) else {
            return Ok(None);
        };

        let resources = resources
            .into_iter()
            .map(|(k, v)| {
                let value = match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, value)
            })
            .collect();

        Ok(Some(KernelSpec {
            name: name.to_string(),
            display_name: parsed.display_name,
            argv: parsed.argv,
            env: parsed.env,
            language: parsed.language,
            resource_dir: path.parent().map(Path::to_path_buf),
            resources,
            lifecycle,
        }))
    }
}

fn merge_unique(specs: &mut Vec<KernelSpec>, more: Vec<KernelSpec>) {
    let mut seen: HashSet<String> = specs.iter().map(|s| s.name.clone()).collect();
    for spec in more {
        if seen.insert(spec.name.clone()) {
            specs.push(spec);
        } else {
            warn!("Duplicate kernel type '{}' ignored", spec.name);
        }
    }
}

#[cfg(test)]
#[path = "kernelspec_tests.rs"]
mod tests;
