//! Backend configuration, read from the kernel spec's lifecycle config.

use std::net::IpAddr;

use rkernel_protocols::LifecycleError;
use serde::{Deserialize, Serialize};

/// Settings of the process lifecycle manager.
///
/// ```json
/// {"class_name": "process", "config": {"response_ip": "0.0.0.0", "interrupt_signal": "SIGUSR2"}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Address the response listener binds to.
    #[serde(default = "default_response_ip")]
    pub response_ip: IpAddr,

    /// Signal delivered for an interrupt request. Kernels that cannot
    /// receive SIGINT (e.g. behind a launcher) use SIGUSR2.
    #[serde(default = "default_interrupt_signal")]
    pub interrupt_signal: String,
}

fn default_response_ip() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}

fn default_interrupt_signal() -> String {
    "SIGINT".to_string()
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            response_ip: default_response_ip(),
            interrupt_signal: default_interrupt_signal(),
        }
    }
}

impl ProcessConfig {
    /// Parse and validate the opaque lifecycle config of a kernel spec.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, LifecycleError> {
        let config: ProcessConfig = match value {
            serde_json::Value::Null => ProcessConfig::default(),
            other => serde_json::from_value(other.clone())
                .map_err(|e| LifecycleError::InvalidConfig(e.to_string()))?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LifecycleError> {
        crate::signal::parse_signal(&self.interrupt_signal).map(|_| ())
    }
}
