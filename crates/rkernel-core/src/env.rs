//! Kernel environment and command preparation.
//!
//! Turns a kernel spec plus per-launch overrides into the concrete kernel id,
//! environment and argv handed to a lifecycle manager.

use std::collections::HashMap;
use std::path::PathBuf;

use rkernel_protocols::KernelSpec;
use rkernel_protocols::template;
use tracing::debug;
use uuid::Uuid;

/// Env key carrying the kernel id.
pub const KERNEL_ID: &str = "KERNEL_ID";
/// Env key carrying the user the kernel runs on behalf of.
pub const KERNEL_USERNAME: &str = "KERNEL_USERNAME";

const KERNEL_ENV_PREFIX: &str = "KERNEL_";
const LOGIN_VARS: [&str; 4] = ["LOGNAME", "USER", "LNAME", "USERNAME"];

/// Per-launch adjustments supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct KernelOverrides {
    /// Environment values. Only `KERNEL_*` and whitelisted keys are kept.
    pub env: HashMap<String, String>,
    /// Extra `{name}` values for the command template.
    pub params: HashMap<String, String>,
    /// Arguments appended to the spec's argv.
    pub extra_arguments: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Replaces the configured launch timeout for this kernel.
    pub launch_timeout_secs: Option<u64>,
}

impl KernelOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_extra_argument(mut self, arg: impl Into<String>) -> Self {
        self.extra_arguments.push(arg.into());
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_launch_timeout_secs(mut self, secs: u64) -> Self {
        self.launch_timeout_secs = Some(secs);
        self
    }
}

/// Concrete launch inputs for one kernel.
#[derive(Debug, Clone)]
pub struct PreparedLaunch {
    pub kernel_id: String,
    pub env: HashMap<String, String>,
    pub argv: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl PreparedLaunch {
    /// Build the launch inputs for `spec`.
    ///
    /// `env_whitelist` names override keys forwarded besides `KERNEL_*`.
    pub fn prepare(spec: &KernelSpec, overrides: &KernelOverrides, env_whitelist: &[String]) -> Self {
        let mut env: HashMap<String, String> = spec
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for (key, value) in &overrides.env {
            if key.starts_with(KERNEL_ENV_PREFIX) || env_whitelist.iter().any(|w| w == key) {
                env.insert(key.clone(), value.clone());
            } else {
                debug!("Dropping non-forwarded env override: {}", key);
            }
        }

        let kernel_id = env
            .entry(KERNEL_ID.to_string())
            .or_insert_with(|| Uuid::new_v4().to_string())
            .clone();

        if !env.contains_key(KERNEL_USERNAME) {
            match current_username() {
                Some(user) => {
                    env.insert(KERNEL_USERNAME.to_string(), user);
                }
                None => debug!("Could not determine the current user for {}", KERNEL_USERNAME),
            }
        }

        let mut namespace = overrides.params.clone();
        namespace.insert("kernel_id".to_string(), kernel_id.clone());
        namespace.insert("kernel_name".to_string(), spec.name.clone());
        if let Some(user) = env.get(KERNEL_USERNAME) {
            namespace.insert("kernel_username".to_string(), user.clone());
        }
        if let Some(dir) = &spec.resource_dir {
            namespace.insert("resource_dir".to_string(), dir.display().to_string());
        }
        if let Some(prefix) = install_prefix() {
            namespace
                .entry("prefix".to_string())
                .or_insert_with(|| prefix.display().to_string());
        }

        let mut argv = spec.argv.clone();
        argv.extend(overrides.extra_arguments.iter().cloned());
        let argv = template::format_argv(&argv, &namespace);

        Self {
            kernel_id,
            env,
            argv,
            cwd: overrides.cwd.clone(),
        }
    }
}

/// Installation prefix of the running binary (`<prefix>/bin/rkernel`).
pub fn install_prefix() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    exe.parent()?.parent().map(|dir| dir.to_path_buf())
}

/// Login name of the current user.
///
/// Checks the login environment first and falls back to the user database.
pub fn current_username() -> Option<String> {
    LOGIN_VARS
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|v| !v.is_empty())
        .or_else(username_from_uid)
}

#[cfg(unix)]
fn username_from_uid() -> Option<String> {
    nix::unistd::User::from_uid(nix::unistd::getuid())
        .ok()
        .flatten()
        .map(|user| user.name)
}

#[cfg(not(unix))]
fn username_from_uid() -> Option<String> {
    None
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
