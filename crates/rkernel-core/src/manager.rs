//! Kernel manager: one kernel's lifecycle state machine.
//!
//! ```text
//! NotStarted --start--> Launching --ready--> Running --restart--> Restarting --ready--> Running
//!                       Launching --timeout/reject/cancel--> Failed
//! Running --unexpected exit / unresponsive--> Failed
//! Running/Restarting --shutdown--> Terminating --> Terminated
//! ```
//!
//! Every operation that touches the remote handle holds the handle lock for
//! its whole duration, so operations never interleave; a queued operation
//! re-checks the state once it gets the lock. The monitor never queues: it
//! skips its tick while another operation is in flight.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

use parking_lot::RwLock;
use rkernel_config::KernelManagerConfig;
use rkernel_protocols::{
    ConnectionInfo, KernelSignal, KernelSpec, LifecycleError, LifecycleManager, LifecycleState,
    RemoteHandle,
};
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::env::PreparedLaunch;
use crate::error::KernelError;
use crate::events::KernelEvent;

#[path = "manager_monitor.rs"]
mod monitor;
#[path = "manager_restart.rs"]
mod restart;
#[path = "manager_shutdown.rs"]
mod shutdown;
#[path = "manager_start.rs"]
mod start;

pub use monitor::MonitorOutcome;

const EVENT_CAPACITY: usize = 64;

/// Orchestrates one kernel through its lifecycle using one lifecycle manager.
pub struct KernelManager {
    kernel_id: String,
    spec: Arc<KernelSpec>,
    lifecycle: Arc<dyn LifecycleManager>,
    config: KernelManagerConfig,
    launch: PreparedLaunch,
    state: AtomicU8,
    /// Current remote handle. Locked for the duration of every operation.
    handle: Mutex<Option<RemoteHandle>>,
    connection: RwLock<Option<Arc<ConnectionInfo>>>,
    unknown_polls: AtomicU32,
    /// Set once an exit was requested, so the monitor does not report it as a crash.
    exit_expected: AtomicBool,
    restart_tracker: parking_lot::Mutex<crate::restart::RestartTracker>,
    restart_count: AtomicU32,
    launch_cancel: parking_lot::Mutex<Option<CancellationToken>>,
    failure: parking_lot::Mutex<Option<String>>,
    events: broadcast::Sender<KernelEvent>,
}

impl KernelManager {
    /// Create a manager in `NotStarted`.
    ///
    /// `lifecycle` must be a fresh instance; it is never shared with another
    /// kernel manager.
    pub fn new(
        spec: Arc<KernelSpec>,
        lifecycle: Box<dyn LifecycleManager>,
        config: KernelManagerConfig,
        launch: PreparedLaunch,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let restart_tracker =
            crate::restart::RestartTracker::new(config.max_restarts, config.restart_window());

        Self {
            kernel_id: launch.kernel_id.clone(),
            spec,
            lifecycle: Arc::from(lifecycle),
            config,
            launch,
            state: AtomicU8::new(LifecycleState::NotStarted as u8),
            handle: Mutex::new(None),
            connection: RwLock::new(None),
            unknown_polls: AtomicU32::new(0),
            exit_expected: AtomicBool::new(false),
            restart_tracker: parking_lot::Mutex::new(restart_tracker),
            restart_count: AtomicU32::new(0),
            launch_cancel: parking_lot::Mutex::new(None),
            failure: parking_lot::Mutex::new(None),
            events,
        }
    }

    pub fn kernel_id(&self) -> &str {
        &self.kernel_id
    }

    pub fn spec(&self) -> &Arc<KernelSpec> {
        &self.spec
    }

    pub fn config(&self) -> &KernelManagerConfig {
        &self.config
    }

    /// Name of the lifecycle manager implementation in use.
    pub fn lifecycle_name(&self) -> &str {
        self.lifecycle.name()
    }

    /// Command and environment the kernel is launched with.
    pub fn prepared_launch(&self) -> &PreparedLaunch {
        &self.launch
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    /// Published connection info; `None` until the kernel is running.
    pub fn connection_info(&self) -> Option<Arc<ConnectionInfo>> {
        self.connection.read().clone()
    }

    /// Where the connection file is written, when a connection directory is
    /// configured.
    pub fn connection_file(&self) -> Option<PathBuf> {
        self.config
            .connection_dir
            .as_ref()
            .map(|dir| dir.join(format!("kernel-{}.json", self.kernel_id)))
    }

    /// Number of completed restarts.
    pub fn restart_count(&self) -> u32 {
        self.restart_count.load(Ordering::SeqCst)
    }

    /// Why the kernel failed, once it has.
    pub fn failure_reason(&self) -> Option<String> {
        self.failure.lock().clone()
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<KernelEvent> {
        self.events.subscribe()
    }

    /// Cancel an in-flight start or restart launch.
    ///
    /// Returns `false` when no launch is waiting for readiness.
    pub fn cancel_start(&self) -> bool {
        match self.launch_cancel.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Send a signal to the running kernel.
    ///
    /// `Interrupt` leaves the state unchanged. `Terminate` and `Kill` mark the
    /// coming exit as expected, so the monitor reports it as a termination.
    /// An undeliverable signal yields [`KernelError::SignalUnsupported`] and
    /// does not affect the state.
    pub async fn signal(&self, signal: KernelSignal) -> Result<(), KernelError> {
        let slot = self.handle.lock().await;
        let state = self.state();
        let handle = match slot.as_ref() {
            Some(handle) if state == LifecycleState::Running => handle,
            _ => return Err(KernelError::NotRunning(state)),
        };

        info!(kernel_id = %self.kernel_id, "Sending {} to {}", signal, handle.label());
        self.lifecycle.signal(handle, signal).await?;

        if signal != KernelSignal::Interrupt {
            self.exit_expected.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Interrupt the kernel's current execution.
    pub async fn interrupt(&self) -> Result<(), KernelError> {
        self.signal(KernelSignal::Interrupt).await
    }

    fn set_state(&self, to: LifecycleState) {
        let from = LifecycleState::from(self.state.swap(to as u8, Ordering::SeqCst));
        if from == to {
            return;
        }
        info!(kernel_id = %self.kernel_id, "Kernel {} -> {}", from, to);
        let _ = self.events.send(KernelEvent::StateChanged {
            kernel_id: self.kernel_id.clone(),
            from,
            to,
        });
    }

    /// Enter `Failed` and notify subscribers. Cleanup must already be done.
    fn fail(&self, reason: &KernelError) {
        error!(kernel_id = %self.kernel_id, "Kernel failed: {}", reason);
        *self.failure.lock() = Some(reason.to_string());
        self.set_state(LifecycleState::Failed);
        let _ = self.events.send(KernelEvent::Failed {
            kernel_id: self.kernel_id.clone(),
            reason: reason.to_string(),
        });
    }

    /// Deliver a signal, absorbing failures.
    ///
    /// Returns whether waiting for an exit is worthwhile.
    async fn deliver(&self, handle: &RemoteHandle, signal: KernelSignal) -> bool {
        match self.lifecycle.signal(handle, signal).await {
            Ok(()) => true,
            Err(e @ LifecycleError::SignalUnsupported { .. }) => {
                debug!(kernel_id = %self.kernel_id, "{}", e);
                true
            }
            Err(e) => {
                warn!(kernel_id = %self.kernel_id, "Failed to send {} to {}: {}", signal, handle.label(), e);
                false
            }
        }
    }

    /// Kill a handle and release it. Used for partial or superseded launches.
    async fn discard(&self, handle: &RemoteHandle) {
        self.deliver(handle, KernelSignal::Kill).await;
        self.release(handle).await;
    }

    async fn release(&self, handle: &RemoteHandle) {
        if let Err(e) = self.lifecycle.cleanup(handle).await {
            warn!(kernel_id = %self.kernel_id, "Cleanup of {} failed: {}", handle.label(), e);
        }
    }

    async fn write_connection_file(&self, info: &ConnectionInfo) -> Result<(), KernelError> {
        let Some(path) = self.connection_file() else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&path, info.to_json()?).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        debug!(kernel_id = %self.kernel_id, "Wrote connection file {}", path.display());
        Ok(())
    }

    /// Withdraw the published connection info and its file.
    async fn clear_connection(&self) {
        *self.connection.write() = None;
        let Some(path) = self.connection_file() else {
            return;
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!(kernel_id = %self.kernel_id, "Removed connection file {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(kernel_id = %self.kernel_id, "Failed to remove {}: {}", path.display(), e),
        }
    }
}

impl std::fmt::Debug for KernelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelManager")
            .field("kernel_id", &self.kernel_id)
            .field("kernel_name", &self.spec.name)
            .field("lifecycle", &self.lifecycle.name())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
