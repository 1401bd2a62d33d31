//! Kernel lifecycle notifications.

use rkernel_protocols::LifecycleState;

/// Notification broadcast by a [`crate::KernelManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelEvent {
    /// The lifecycle state changed.
    StateChanged {
        kernel_id: String,
        from: LifecycleState,
        to: LifecycleState,
    },
    /// A restart completed and new connection info is published.
    Restarted { kernel_id: String, restarts: u32 },
    /// The kernel failed. Sent once, after cleanup.
    Failed { kernel_id: String, reason: String },
}

impl KernelEvent {
    /// Kernel this event belongs to.
    pub fn kernel_id(&self) -> &str {
        match self {
            KernelEvent::StateChanged { kernel_id, .. }
            | KernelEvent::Restarted { kernel_id, .. }
            | KernelEvent::Failed { kernel_id, .. } => kernel_id,
        }
    }
}
