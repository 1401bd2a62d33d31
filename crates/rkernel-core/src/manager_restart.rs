//! Restart: replace the running kernel with a fresh launch of the same spec.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use rkernel_protocols::{ConnectionInfo, LifecycleState, RemoteHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::KernelManager;
use super::start::release_in_background;
use crate::error::KernelError;
use crate::events::KernelEvent;

impl KernelManager {
    /// Restart a running kernel.
    ///
    /// The current kernel and its connection info stay in place until the
    /// replacement is ready; only then is the old one killed and released.
    /// If the replacement fails, both are released and the state is `Failed`.
    /// Dropping this future mid-flight does the same in the background.
    ///
    /// Rejected with [`KernelError::MaxRestartsExceeded`], leaving the kernel
    /// running, once the restart limit for the window is reached.
    pub async fn restart(&self) -> Result<Arc<ConnectionInfo>, KernelError> {
        let mut slot = self.handle.lock().await;
        let current = self.state();
        if current != LifecycleState::Running {
            return Err(KernelError::InvalidStateTransition {
                from: current,
                to: LifecycleState::Restarting,
            });
        }

        {
            let mut tracker = self.restart_tracker.lock();
            if !tracker.try_record() {
                warn!(
                    kernel_id = %self.kernel_id,
                    "Restart refused, {} restarts within {:?}",
                    tracker.max_restarts(),
                    self.config.restart_window()
                );
                return Err(KernelError::MaxRestartsExceeded {
                    max: tracker.max_restarts(),
                });
            }
        }

        let cancel = CancellationToken::new();
        *self.launch_cancel.lock() = Some(cancel.clone());
        self.set_state(LifecycleState::Restarting);
        info!(kernel_id = %self.kernel_id, "Restarting kernel");

        let abandon = RestartAbandonGuard::new(self, &mut slot);
        let result = self
            .launch_and_connect(self.config.restart_timeout(), &cancel)
            .await;
        abandon.disarm();
        *self.launch_cancel.lock() = None;

        match result {
            Ok((handle, info)) => {
                if let Some(old) = slot.replace(handle) {
                    self.discard(&old).await;
                }
                *self.connection.write() = Some(info.clone());
                self.unknown_polls.store(0, Ordering::SeqCst);
                self.exit_expected.store(false, Ordering::SeqCst);
                let restarts = self.restart_count.fetch_add(1, Ordering::SeqCst) + 1;

                self.set_state(LifecycleState::Running);
                let _ = self.events.send(KernelEvent::Restarted {
                    kernel_id: self.kernel_id.clone(),
                    restarts,
                });
                info!(kernel_id = %self.kernel_id, "Kernel restarted ({} so far)", restarts);
                Ok(info)
            }
            Err(e) => {
                if let Some(old) = slot.take() {
                    self.terminate(&old, true).await;
                    self.release(&old).await;
                }
                self.clear_connection().await;
                self.fail(&e);
                Err(e)
            }
        }
    }
}

/// Fails the manager and releases the old kernel if `restart` is dropped
/// mid-flight.
struct RestartAbandonGuard<'a> {
    manager: &'a KernelManager,
    slot: &'a mut Option<RemoteHandle>,
    armed: bool,
}

impl<'a> RestartAbandonGuard<'a> {
    fn new(manager: &'a KernelManager, slot: &'a mut Option<RemoteHandle>) -> Self {
        Self {
            manager,
            slot,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RestartAbandonGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let manager = self.manager;
        *manager.launch_cancel.lock() = None;

        if let Some(old) = self.slot.take() {
            warn!(kernel_id = %manager.kernel_id, "Restart abandoned, releasing {}", old.label());
            release_in_background(manager.lifecycle.clone(), old);
        }

        *manager.connection.write() = None;
        if let Some(path) = manager.connection_file() {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(kernel_id = %manager.kernel_id, "Failed to remove {}: {}", path.display(), e),
            }
        }

        manager.fail(&KernelError::Cancelled);
    }
}
