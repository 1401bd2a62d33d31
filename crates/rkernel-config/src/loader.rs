//! Configuration loader.

use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ConfigError;
use crate::schema::Config;

static ENV_VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid"));

/// Configuration loader with environment variable substitution.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    /// Load and validate configuration from a string.
    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let config: Config = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Expand environment variables in the format `${VAR}`.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let mut result = content.to_string();

        for cap in ENV_VAR.captures_iter(content) {
            let var_name = &cap[1];
            let var_value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotSet(var_name.to_string()))?;
            result = result.replace(&cap[0], &var_value);
        }

        Ok(result)
    }

    /// Expand shell-style paths (e.g., `~/.local/share/jupyter/kernels`).
    pub fn expand_path(path: &str) -> String {
        shellexpand::tilde(path).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_empty_config() {
        let config = ConfigLoader::load_str("").unwrap();
        assert_eq!(config.manager.launch_timeout_secs, 30);
        assert!(config.kernels.is_empty());
    }

    #[test]
    fn test_expand_path() {
        let expanded = ConfigLoader::expand_path("~/.rkernel");
        assert!(!expanded.starts_with('~'));
    }

    #[test]
    fn test_load_manager_section() {
        let content = r#"
            [manager]
            launch_timeout_secs = 120
            unknown_poll_threshold = 8
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.manager.launch_timeout_secs, 120);
        assert_eq!(config.manager.unknown_poll_threshold, 8);
        assert_eq!(config.manager.shutdown_grace_secs, 5);
    }

    #[test]
    fn test_load_inline_kernels() {
        let content = r#"
            [[kernels]]
            name = "python_distributed"
            display_name = "Python on Hosts"
            argv = ["python", "launch_ipykernel.py", "--RemoteProcessProxy.response-address", "{response_address}"]

            [kernels.env]
            KERNEL_WORKING_DIR = "/tmp"

            [kernels.lifecycle]
            class_name = "process"
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.kernels.len(), 1);
        let spec = &config.kernels[0];
        assert_eq!(spec.lifecycle.class_name, "process");
        assert_eq!(spec.env.get("KERNEL_WORKING_DIR").map(String::as_str), Some("/tmp"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[provider]").unwrap();
        writeln!(file, "env_whitelist = [\"SPARK_OPTS\"]").unwrap();

        let config = ConfigLoader::load(file.path()).unwrap();
        assert_eq!(config.provider.env_whitelist, vec!["SPARK_OPTS".to_string()]);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = ConfigLoader::load(Path::new("/nonexistent/path/rkernel.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_invalid_toml() {
        let result = ConfigLoader::load_str("invalid = [unclosed");
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let content = r#"
            [manager]
            launch_timeout_secs = 0
        "#;
        let result = ConfigLoader::load_str(content);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_env_var_expansion() {
        // SAFETY: unique test-only variable
        unsafe {
            std::env::set_var("RKERNEL_TEST_CONN_DIR", "/var/run/rkernel");
        }
        let content = r#"
            [manager]
            connection_dir = "${RKERNEL_TEST_CONN_DIR}"
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(
            config.manager.connection_dir.as_deref(),
            Some(Path::new("/var/run/rkernel"))
        );
    }

    #[test]
    fn test_env_var_not_set() {
        let content = r#"kernel_dirs = ["${RKERNEL_TEST_SURELY_UNSET_VAR}"]"#;
        let result = ConfigLoader::load_str(content);
        assert!(matches!(result, Err(ConfigError::EnvVarNotSet(_))));
    }
}
