//! Periodic health monitoring.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use rkernel_protocols::{LifecycleState, PollStatus};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::KernelManager;
use crate::error::KernelError;
use crate::events::KernelEvent;

/// Result of one monitor tick.
#[derive(Debug)]
pub enum MonitorOutcome {
    /// Another operation was in flight; nothing was polled.
    Skipped,
    /// The kernel is not running.
    Inactive(LifecycleState),
    Alive,
    /// The backend could not tell; the kernel is assumed alive.
    Unknown { consecutive: u32 },
    /// The kernel exited after an explicit terminate or kill.
    Terminated,
    /// The kernel failed and has been cleaned up.
    Failed(KernelError),
}

impl MonitorOutcome {
    /// Whether monitoring should stop.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MonitorOutcome::Terminated | MonitorOutcome::Failed(_))
    }
}

impl KernelManager {
    /// Poll the kernel once and react to what the backend reports.
    ///
    /// An unexpected exit, or `unknown_poll_threshold` consecutive `Unknown`
    /// answers, fails the kernel after releasing it.
    pub async fn monitor(&self) -> MonitorOutcome {
        let Ok(mut slot) = self.handle.try_lock() else {
            debug!(kernel_id = %self.kernel_id, "Operation in flight, skipping health check");
            return MonitorOutcome::Skipped;
        };

        let state = self.state();
        let handle = match slot.as_ref() {
            Some(handle) if state == LifecycleState::Running => handle.clone(),
            _ => return MonitorOutcome::Inactive(state),
        };

        match self.lifecycle.poll(&handle).await {
            PollStatus::Alive => {
                self.unknown_polls.store(0, Ordering::SeqCst);
                MonitorOutcome::Alive
            }
            PollStatus::Unknown => {
                let polls = self.unknown_polls.fetch_add(1, Ordering::SeqCst) + 1;
                if polls < self.config.unknown_poll_threshold {
                    debug!(kernel_id = %self.kernel_id, "Liveness unknown ({} in a row)", polls);
                    return MonitorOutcome::Unknown { consecutive: polls };
                }

                warn!(
                    kernel_id = %self.kernel_id,
                    "{} unresponsive after {} unknown polls, killing",
                    handle.label(),
                    polls
                );
                self.terminate(&handle, true).await;
                self.release(&handle).await;
                *slot = None;
                self.clear_connection().await;

                let err = KernelError::Unresponsive { polls };
                self.fail(&err);
                MonitorOutcome::Failed(err)
            }
            PollStatus::Exited(code) => {
                self.release(&handle).await;
                *slot = None;
                self.clear_connection().await;

                if self.exit_expected.load(Ordering::SeqCst) {
                    info!(kernel_id = %self.kernel_id, "Kernel exited as requested");
                    self.set_state(LifecycleState::Terminating);
                    self.set_state(LifecycleState::Terminated);
                    return MonitorOutcome::Terminated;
                }

                let err = KernelError::UnexpectedExit { code };
                self.fail(&err);
                MonitorOutcome::Failed(err)
            }
        }
    }

    /// Run [`monitor`](Self::monitor) every `monitor_interval` in the
    /// background until the kernel stops or the manager is dropped.
    pub fn spawn_monitor(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::downgrade(self);
        let mut events = self.subscribe();
        let interval = self.config.monitor_interval();
        let kernel_id = self.kernel_id.clone();

        tokio::spawn(async move {
            info!(kernel_id = %kernel_id, "Starting kernel monitor (interval: {:?})", interval);
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        let Some(manager) = manager.upgrade() else {
                            break;
                        };
                        if manager.state().is_terminal() || manager.monitor().await.is_terminal() {
                            break;
                        }
                    }
                    event = events.recv() => match event {
                        Ok(KernelEvent::StateChanged { to, .. }) if to.is_terminal() => break,
                        Ok(_) | Err(RecvError::Lagged(_)) => {}
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!(kernel_id = %kernel_id, "Kernel monitor stopped");
        })
    }
}
