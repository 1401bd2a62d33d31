//! Termination sequence.

use std::sync::atomic::Ordering;
use std::time::Duration;

use rkernel_protocols::{KernelSignal, LifecycleState, PollStatus, RemoteHandle};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::KernelManager;
use crate::error::KernelError;

impl KernelManager {
    /// Terminate the kernel.
    ///
    /// Graceful shutdown sends `Terminate` and waits up to the shutdown grace
    /// period, then escalates to `Kill`. `force` sends `Kill` right away.
    /// Backend cleanup always runs, even when no signal could be delivered.
    /// If the exit is never observed the kernel still ends `Terminated`, with
    /// the unconfirmed kill reported by [`KernelManager::failure_reason`].
    ///
    /// Calling this on a terminated or failed kernel is a no-op, so
    /// concurrent calls run the sequence once.
    pub async fn shutdown(&self, force: bool) -> Result<(), KernelError> {
        let mut slot = self.handle.lock().await;
        match self.state() {
            LifecycleState::Terminated | LifecycleState::Failed => {
                debug!(kernel_id = %self.kernel_id, "Shutdown requested, kernel already stopped");
                return Ok(());
            }
            LifecycleState::Running | LifecycleState::Restarting => {}
            other => {
                return Err(KernelError::InvalidStateTransition {
                    from: other,
                    to: LifecycleState::Terminating,
                });
            }
        }

        self.exit_expected.store(true, Ordering::SeqCst);
        self.set_state(LifecycleState::Terminating);
        info!(kernel_id = %self.kernel_id, "Shutting down kernel (force: {})", force);

        if let Some(handle) = slot.take() {
            if !self.terminate(&handle, force).await {
                warn!(
                    kernel_id = %self.kernel_id,
                    "Exit of {} not confirmed, releasing anyway",
                    handle.label()
                );
                *self.failure.lock() = Some(format!(
                    "exit of {} not confirmed within {:?} of kill",
                    handle.label(),
                    self.config.kill_timeout()
                ));
            }
            self.release(&handle).await;
        }

        self.clear_connection().await;
        self.set_state(LifecycleState::Terminated);
        info!(kernel_id = %self.kernel_id, "Kernel terminated");
        Ok(())
    }

    /// Signal a handle until it exits. Returns whether the exit was observed.
    pub(super) async fn terminate(&self, handle: &RemoteHandle, force: bool) -> bool {
        if !force {
            let grace = self.config.shutdown_grace();
            if self.deliver(handle, KernelSignal::Terminate).await
                && self.wait_for_exit(handle, grace).await
            {
                return true;
            }
            warn!(
                kernel_id = %self.kernel_id,
                "{} still running after {:?}, killing",
                handle.label(),
                grace
            );
        }

        self.deliver(handle, KernelSignal::Kill).await;
        self.wait_for_exit(handle, self.config.kill_timeout()).await
    }

    async fn wait_for_exit(&self, handle: &RemoteHandle, within: Duration) -> bool {
        let deadline = Instant::now() + within;
        loop {
            if let PollStatus::Exited(code) = self.lifecycle.poll(handle).await {
                debug!(kernel_id = %self.kernel_id, "{} exited ({:?})", handle.label(), code);
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep_until((now + self.config.poll_interval()).min(deadline)).await;
        }
    }
}
