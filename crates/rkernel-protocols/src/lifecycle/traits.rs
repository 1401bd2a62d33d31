//! Lifecycle manager trait definitions.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;

use super::RemoteHandle;
use crate::connection::{ConnectionInfo, ConnectionTemplate};
use crate::error::LifecycleError;
use crate::kernelspec::KernelSpec;

/// Abstract signal, translated by each backend to whatever it supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelSignal {
    /// Interrupt the current execution.
    Interrupt,
    /// Ask the kernel to exit.
    Terminate,
    /// Force the kernel to exit.
    Kill,
}

impl std::fmt::Display for KernelSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KernelSignal::Interrupt => write!(f, "INTERRUPT"),
            KernelSignal::Terminate => write!(f, "TERMINATE"),
            KernelSignal::Kill => write!(f, "KILL"),
        }
    }
}

/// Result of a non-blocking liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    Alive,
    /// The unit of work finished; the code is absent when killed by a signal
    /// or when the backend does not report one.
    Exited(Option<i32>),
    /// The backend cannot answer right now. Callers assume alive and retry.
    Unknown,
}

impl std::fmt::Display for PollStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollStatus::Alive => write!(f, "alive"),
            PollStatus::Exited(Some(code)) => write!(f, "exited({})", code),
            PollStatus::Exited(None) => write!(f, "exited"),
            PollStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Everything a backend needs to submit one kernel.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub kernel_id: String,
    pub spec: Arc<KernelSpec>,
    /// Command with orchestration placeholders already substituted.
    pub argv: Vec<String>,
    /// Complete kernel environment overlay.
    pub env: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
    pub connection: ConnectionTemplate,
}

/// Backend-specific mechanics for one kernel instance.
///
/// Implementations must never block a worker thread: waits suspend the
/// calling task. A handle is only ever passed back to the instance that
/// returned it.
#[async_trait]
pub trait LifecycleManager: Send + Sync {
    /// Implementation name, as referenced by `LifecycleInfo::class_name`.
    fn name(&self) -> &str;

    /// Submit the kernel. Returns once the backend accepted the submission,
    /// not once the kernel is ready.
    async fn launch(&self, request: LaunchRequest) -> Result<RemoteHandle, LifecycleError>;

    /// Non-blocking liveness check. Never fails; see [`PollStatus::Unknown`].
    async fn poll(&self, handle: &RemoteHandle) -> PollStatus;

    /// Wait until the remote process publishes its endpoints or `deadline`
    /// passes. On timeout the handle remains valid and pollable.
    async fn await_connection_info(
        &self,
        handle: &RemoteHandle,
        deadline: Instant,
    ) -> Result<ConnectionInfo, LifecycleError>;

    /// Best-effort signal delivery.
    async fn signal(&self, handle: &RemoteHandle, signal: KernelSignal)
        -> Result<(), LifecycleError>;

    /// Release backend-side bookkeeping. Idempotent.
    async fn cleanup(&self, handle: &RemoteHandle) -> Result<(), LifecycleError>;
}

/// Constructs lifecycle managers for the provider.
///
/// One factory is registered per implementation name; the provider asks it
/// for a fresh instance for every kernel manager it creates.
pub trait LifecycleManagerFactory: Send + Sync {
    /// Implementation name this factory serves.
    fn class_name(&self) -> &str;

    /// Create a new, unshared instance for the given kernel type.
    fn create(&self, spec: &KernelSpec) -> Result<Box<dyn LifecycleManager>, LifecycleError>;
}
