//! Launch and readiness.

use std::sync::Arc;
use std::time::Duration;

use rkernel_protocols::{
    ConnectionInfo, ConnectionTemplate, KernelSignal, LaunchRequest, LifecycleManager,
    LifecycleState, RemoteHandle,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::KernelManager;
use crate::error::KernelError;

impl KernelManager {
    /// Launch the kernel and wait until it is reachable.
    ///
    /// Bounded by the launch timeout. On any failure the partially launched
    /// kernel is killed and cleaned up before the error is returned and the
    /// state is `Failed`. If this future is dropped before completing, the
    /// kernel is failed and released in the background.
    pub async fn start(&self) -> Result<Arc<ConnectionInfo>, KernelError> {
        let mut slot = self.handle.lock().await;
        let current = self.state();
        if current != LifecycleState::NotStarted {
            return Err(KernelError::InvalidStateTransition {
                from: current,
                to: LifecycleState::Launching,
            });
        }

        let cancel = CancellationToken::new();
        *self.launch_cancel.lock() = Some(cancel.clone());
        let abandon = AbandonGuard::new(self);
        self.set_state(LifecycleState::Launching);
        info!(
            kernel_id = %self.kernel_id,
            "Starting kernel '{}' via {}",
            self.spec.name,
            self.lifecycle.name()
        );

        let result = self
            .launch_and_connect(self.config.launch_timeout(), &cancel)
            .await;
        abandon.disarm();
        *self.launch_cancel.lock() = None;

        match result {
            Ok((handle, info)) => {
                info!(
                    kernel_id = %self.kernel_id,
                    "Kernel ready at {} ({})",
                    info.ip,
                    handle.label()
                );
                *slot = Some(handle);
                *self.connection.write() = Some(info.clone());
                self.set_state(LifecycleState::Running);
                Ok(info)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Submit a new kernel and wait for its connection info.
    ///
    /// The returned handle is live and its connection file written. On error
    /// nothing is left behind on the backend.
    pub(super) async fn launch_and_connect(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(RemoteHandle, Arc<ConnectionInfo>), KernelError> {
        let template = ConnectionTemplate::new(&self.kernel_id, &self.spec.name);
        let request = LaunchRequest {
            kernel_id: self.kernel_id.clone(),
            spec: self.spec.clone(),
            argv: self.launch.argv.clone(),
            env: self.launch.env.clone(),
            cwd: self.launch.cwd.clone(),
            connection: template.clone(),
        };
        let deadline = Instant::now() + timeout;

        let handle = match tokio::time::timeout_at(deadline, self.lifecycle.launch(request)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(KernelError::LaunchTimeout(format!(
                    "submission of kernel {} not accepted within {:?}",
                    self.kernel_id, timeout
                )));
            }
        };
        info!(kernel_id = %self.kernel_id, "Submitted as {}", handle.label());

        let guard = LaunchGuard::new(self.lifecycle.clone(), handle.clone());
        match self
            .await_ready(&handle, &template, deadline, timeout, cancel)
            .await
        {
            Ok(info) => {
                guard.disarm();
                Ok((handle, info))
            }
            Err(e) => {
                warn!(kernel_id = %self.kernel_id, "Launch of {} failed: {}", handle.label(), e);
                self.discard(&handle).await;
                guard.disarm();
                Err(e)
            }
        }
    }

    async fn await_ready(
        &self,
        handle: &RemoteHandle,
        template: &ConnectionTemplate,
        deadline: Instant,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Arc<ConnectionInfo>, KernelError> {
        if cancel.is_cancelled() {
            return Err(KernelError::Cancelled);
        }

        let info = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(KernelError::Cancelled),
            result = tokio::time::timeout_at(
                deadline,
                self.lifecycle.await_connection_info(handle, deadline),
            ) => match result {
                Ok(info) => info?,
                Err(_) => {
                    return Err(KernelError::LaunchTimeout(format!(
                        "kernel {} did not report within {:?}",
                        self.kernel_id, timeout
                    )));
                }
            },
        };

        let info = info.completed_from(template);
        info.validate()?;
        self.write_connection_file(&info).await?;
        Ok(Arc::new(info))
    }
}

/// Fails the manager if `start` is dropped mid-flight.
struct AbandonGuard<'a> {
    manager: &'a KernelManager,
    armed: bool,
}

impl<'a> AbandonGuard<'a> {
    fn new(manager: &'a KernelManager) -> Self {
        Self {
            manager,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            *self.manager.launch_cancel.lock() = None;
            self.manager.fail(&KernelError::Cancelled);
        }
    }
}

/// Releases a freshly launched handle if the launch future is dropped.
struct LaunchGuard {
    lifecycle: Arc<dyn LifecycleManager>,
    handle: Option<RemoteHandle>,
}

impl LaunchGuard {
    fn new(lifecycle: Arc<dyn LifecycleManager>, handle: RemoteHandle) -> Self {
        Self {
            lifecycle,
            handle: Some(handle),
        }
    }

    fn disarm(mut self) {
        self.handle = None;
    }
}

impl Drop for LaunchGuard {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        warn!("Launch of {} abandoned, releasing", handle.label());
        release_in_background(self.lifecycle.clone(), handle);
    }
}

/// Kill and clean up a handle from a synchronous context.
pub(super) fn release_in_background(lifecycle: Arc<dyn LifecycleManager>, handle: RemoteHandle) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!("{} abandoned outside a runtime, not released", handle);
        return;
    };

    runtime.spawn(async move {
        let _ = lifecycle.signal(&handle, KernelSignal::Kill).await;
        if let Err(e) = lifecycle.cleanup(&handle).await {
            warn!("Cleanup of {} failed: {}", handle.label(), e);
        }
    });
}
