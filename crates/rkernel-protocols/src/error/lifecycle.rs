//! Errors a lifecycle backend can report.

use thiserror::Error;

use crate::lifecycle::KernelSignal;

#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The backend refused the submission (quota, malformed spec, auth failure).
    #[error("Launch rejected: {0}")]
    LaunchRejected(String),

    /// The kernel did not publish its connection info before the deadline.
    #[error("Timed out waiting for connection info from {0}")]
    LaunchTimeout(String),

    /// The signal cannot be delivered to this handle.
    #[error("Signal {signal} unsupported: {reason}")]
    SignalUnsupported { signal: KernelSignal, reason: String },

    #[error("Unknown handle: {0}")]
    UnknownHandle(String),

    #[error("Invalid connection info: {0}")]
    InvalidConnectionInfo(String),

    #[error("Invalid lifecycle configuration: {0}")]
    InvalidConfig(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_rejected_error() {
        let err = LifecycleError::LaunchRejected("queue full".to_string());
        let display = err.to_string();
        assert!(display.contains("rejected"));
        assert!(display.contains("queue full"));
    }

    #[test]
    fn test_launch_timeout_error() {
        let err = LifecycleError::LaunchTimeout("pid 4242".to_string());
        assert!(err.to_string().contains("pid 4242"));
    }

    #[test]
    fn test_signal_unsupported_error() {
        let err = LifecycleError::SignalUnsupported {
            signal: KernelSignal::Interrupt,
            reason: "process already exited".to_string(),
        };
        let display = err.to_string();
        assert!(display.contains("INTERRUPT"));
        assert!(display.contains("already exited"));
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use");
        let err = LifecycleError::from(io_err);
        assert!(err.to_string().contains("address in use"));
    }

    #[test]
    fn test_error_debug() {
        let err = LifecycleError::UnknownHandle("abc".to_string());
        assert!(format!("{:?}", err).contains("UnknownHandle"));
    }
}
