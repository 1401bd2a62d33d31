//! Connection descriptor for a running kernel.
//!
//! The field names follow the Jupyter connection-file layout so the JSON
//! produced by [`ConnectionInfo::to_json`] can be handed to any wire-protocol
//! client unchanged.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LifecycleError;

/// The five logical channels a kernel exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelChannel {
    Shell,
    IoPub,
    Stdin,
    Control,
    Heartbeat,
}

impl KernelChannel {
    /// All channels, in connection-file order.
    pub const ALL: [KernelChannel; 5] = [
        KernelChannel::Shell,
        KernelChannel::IoPub,
        KernelChannel::Stdin,
        KernelChannel::Control,
        KernelChannel::Heartbeat,
    ];
}

impl std::fmt::Display for KernelChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KernelChannel::Shell => write!(f, "shell"),
            KernelChannel::IoPub => write!(f, "iopub"),
            KernelChannel::Stdin => write!(f, "stdin"),
            KernelChannel::Control => write!(f, "control"),
            KernelChannel::Heartbeat => write!(f, "hb"),
        }
    }
}

/// Endpoints and credentials of a running kernel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Transport scheme (`tcp` or `ipc`).
    #[serde(default = "default_transport")]
    pub transport: String,

    /// Address the kernel listens on.
    pub ip: String,

    pub shell_port: u16,
    pub iopub_port: u16,
    pub stdin_port: u16,
    pub control_port: u16,
    pub hb_port: u16,

    /// Message signing key.
    #[serde(default)]
    pub key: String,

    /// Message signing scheme.
    #[serde(default = "default_signature_scheme")]
    pub signature_scheme: String,

    /// Kernel type name.
    #[serde(default)]
    pub kernel_name: String,

    /// Kernel instance identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_id: Option<String>,
}

fn default_transport() -> String {
    "tcp".to_string()
}

fn default_signature_scheme() -> String {
    "hmac-sha256".to_string()
}

impl ConnectionInfo {
    /// Port of the given channel.
    pub fn port(&self, channel: KernelChannel) -> u16 {
        match channel {
            KernelChannel::Shell => self.shell_port,
            KernelChannel::IoPub => self.iopub_port,
            KernelChannel::Stdin => self.stdin_port,
            KernelChannel::Control => self.control_port,
            KernelChannel::Heartbeat => self.hb_port,
        }
    }

    /// Endpoint URL of the given channel, e.g. `tcp://10.0.0.5:52229`.
    pub fn endpoint(&self, channel: KernelChannel) -> String {
        format!("{}://{}:{}", self.transport, self.ip, self.port(channel))
    }

    /// Check that the descriptor is usable by a client.
    pub fn validate(&self) -> Result<(), LifecycleError> {
        if self.ip.trim().is_empty() {
            return Err(LifecycleError::InvalidConnectionInfo(
                "ip must not be empty".to_string(),
            ));
        }
        for channel in KernelChannel::ALL {
            if self.port(channel) == 0 {
                return Err(LifecycleError::InvalidConnectionInfo(format!(
                    "{} port must be non-zero",
                    channel
                )));
            }
        }
        Ok(())
    }

    /// Fill identity and credential fields the kernel did not report.
    pub fn completed_from(mut self, template: &ConnectionTemplate) -> Self {
        if self.key.is_empty() {
            self.key = template.key.clone();
        }
        if self.kernel_name.is_empty() {
            self.kernel_name = template.kernel_name.clone();
        }
        if self.kernel_id.is_none() {
            self.kernel_id = Some(template.kernel_id.clone());
        }
        self
    }

    /// Serialize as a pretty-printed connection file.
    pub fn to_json(&self) -> Result<String, LifecycleError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| LifecycleError::InvalidConnectionInfo(e.to_string()))
    }

    /// Parse a connection payload reported by a kernel.
    pub fn from_json(payload: &str) -> Result<Self, LifecycleError> {
        serde_json::from_str(payload)
            .map_err(|e| LifecycleError::InvalidConnectionInfo(e.to_string()))
    }
}

/// Identity and credentials chosen before launch.
///
/// Backends pass these to the remote process; the ports are only known once
/// the kernel reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTemplate {
    pub kernel_id: String,
    pub kernel_name: String,
    pub transport: String,
    pub key: String,
    pub signature_scheme: String,
}

impl ConnectionTemplate {
    /// Create a template with a fresh signing key.
    pub fn new(kernel_id: impl Into<String>, kernel_name: impl Into<String>) -> Self {
        Self {
            kernel_id: kernel_id.into(),
            kernel_name: kernel_name.into(),
            transport: default_transport(),
            key: Uuid::new_v4().to_string(),
            signature_scheme: default_signature_scheme(),
        }
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
