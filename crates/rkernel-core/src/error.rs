//! Kernel orchestration errors.

use rkernel_config::ConfigError;
use rkernel_protocols::{LifecycleError, LifecycleState};
use thiserror::Error;

/// Errors that can occur while managing a kernel.
#[derive(Debug, Error)]
pub enum KernelError {
    /// No kernel type with this name is registered.
    #[error("Unknown kernel type: {0}")]
    UnknownKernelType(String),

    /// Two kernel specs share a name.
    #[error("Duplicate kernel type: {0}")]
    DuplicateKernelType(String),

    /// A kernel spec names a lifecycle manager nobody registered.
    #[error("Unknown lifecycle manager: {0}")]
    UnknownLifecycleManager(String),

    /// A factory with this class name is already registered.
    #[error("Lifecycle manager already registered: {0}")]
    AlreadyRegistered(String),

    /// The requested operation is not valid in the current state.
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        from: LifecycleState,
        to: LifecycleState,
    },

    /// The operation requires a running kernel.
    #[error("Kernel is not running (state: {0})")]
    NotRunning(LifecycleState),

    /// The backend refused the submission.
    #[error("Launch rejected: {0}")]
    LaunchRejected(String),

    /// The kernel did not become ready in time.
    #[error("Kernel not ready in time: {0}")]
    LaunchTimeout(String),

    /// The launch was cancelled by the caller.
    #[error("Launch cancelled")]
    Cancelled,

    /// The kernel exited without a shutdown being requested.
    #[error("Kernel exited unexpectedly (exit code: {})", .code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    UnexpectedExit { code: Option<i32> },

    /// The backend could not report liveness too many times in a row.
    #[error("Kernel unresponsive after {polls} consecutive unknown polls")]
    Unresponsive { polls: u32 },

    /// The restart limit within the restart window was reached.
    #[error("Maximum restart count ({max}) exceeded")]
    MaxRestartsExceeded { max: u32 },

    /// The signal could not be delivered. The kernel state is unchanged.
    #[error("Signal unsupported: {0}")]
    SignalUnsupported(String),

    /// Any other backend failure.
    #[error("Lifecycle error: {0}")]
    Lifecycle(LifecycleError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LifecycleError> for KernelError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::LaunchRejected(reason) => KernelError::LaunchRejected(reason),
            LifecycleError::LaunchTimeout(what) => KernelError::LaunchTimeout(what),
            e @ LifecycleError::SignalUnsupported { .. } => {
                KernelError::SignalUnsupported(e.to_string())
            }
            other => KernelError::Lifecycle(other),
        }
    }
}
