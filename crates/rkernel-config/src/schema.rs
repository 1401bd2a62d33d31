//! Configuration schema definitions.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use rkernel_protocols::KernelSpec;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub manager: KernelManagerConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Directories scanned for `<name>/kernel.json` definitions.
    #[serde(default)]
    pub kernel_dirs: Vec<String>,

    /// Kernel types defined inline.
    #[serde(default)]
    pub kernels: Vec<KernelSpec>,
}

impl Config {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.manager.validate()
    }
}

/// Orchestration policy for every kernel manager.
///
/// All waits are bounded; `validate` rejects zero values so nothing can
/// hang indefinitely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelManagerConfig {
    /// Deadline for a fresh kernel to publish its connection info.
    #[serde(default = "default_launch_timeout")]
    pub launch_timeout_secs: u64,

    /// Deadline for the replacement kernel during a restart.
    #[serde(default = "default_restart_timeout")]
    pub restart_timeout_secs: u64,

    /// How long a graceful shutdown waits before escalating to kill.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,

    /// How long to wait for exit after a kill.
    #[serde(default = "default_kill_timeout")]
    pub kill_timeout_secs: u64,

    /// Interval between polls while waiting for exit.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Interval of the periodic health monitor.
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_secs: u64,

    /// Consecutive `Unknown` polls tolerated before the kernel is failed.
    #[serde(default = "default_unknown_threshold")]
    pub unknown_poll_threshold: u32,

    /// Maximum restarts within `restart_window_secs`.
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    #[serde(default = "default_restart_window")]
    pub restart_window_secs: u64,

    /// Where connection files are written. No files when unset.
    #[serde(default)]
    pub connection_dir: Option<PathBuf>,
}

fn default_launch_timeout() -> u64 {
    30
}

fn default_restart_timeout() -> u64 {
    30
}

fn default_shutdown_grace() -> u64 {
    5
}

fn default_kill_timeout() -> u64 {
    5
}

fn default_poll_interval() -> u64 {
    500
}

fn default_monitor_interval() -> u64 {
    3
}

fn default_unknown_threshold() -> u32 {
    5
}

fn default_max_restarts() -> u32 {
    5
}

fn default_restart_window() -> u64 {
    300 // 5 minutes
}

impl Default for KernelManagerConfig {
    fn default() -> Self {
        Self {
            launch_timeout_secs: default_launch_timeout(),
            restart_timeout_secs: default_restart_timeout(),
            shutdown_grace_secs: default_shutdown_grace(),
            kill_timeout_secs: default_kill_timeout(),
            poll_interval_ms: default_poll_interval(),
            monitor_interval_secs: default_monitor_interval(),
            unknown_poll_threshold: default_unknown_threshold(),
            max_restarts: default_max_restarts(),
            restart_window_secs: default_restart_window(),
            connection_dir: None,
        }
    }
}

impl KernelManagerConfig {
    pub fn launch_timeout(&self) -> Duration {
        Duration::from_secs(self.launch_timeout_secs)
    }

    pub fn restart_timeout(&self) -> Duration {
        Duration::from_secs(self.restart_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn kill_timeout(&self) -> Duration {
        Duration::from_secs(self.kill_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    pub fn restart_window(&self) -> Duration {
        Duration::from_secs(self.restart_window_secs)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let bounded = [
            ("manager.launch_timeout_secs", self.launch_timeout_secs),
            ("manager.restart_timeout_secs", self.restart_timeout_secs),
            ("manager.shutdown_grace_secs", self.shutdown_grace_secs),
            ("manager.kill_timeout_secs", self.kill_timeout_secs),
            ("manager.poll_interval_ms", self.poll_interval_ms),
            ("manager.monitor_interval_secs", self.monitor_interval_secs),
            ("manager.restart_window_secs", self.restart_window_secs),
        ];
        for (field, value) in bounded {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be > 0"));
            }
        }

        if self.unknown_poll_threshold == 0 {
            return Err(ConfigError::invalid(
                "manager.unknown_poll_threshold",
                "must be > 0",
            ));
        }

        Ok(())
    }
}

/// Provider policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// User-supplied env keys forwarded to kernels besides `KERNEL_*`.
    #[serde(default)]
    pub env_whitelist: Vec<String>,

    /// Legacy lifecycle class names mapped to registered implementations.
    #[serde(default)]
    pub lifecycle_aliases: HashMap<String, String>,
}

/// Logging configuration for the host binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable text.
    #[serde(default)]
    pub json: bool,

    /// Directory for rolling log files. Console only when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
