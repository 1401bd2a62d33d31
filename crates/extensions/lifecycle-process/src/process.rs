//! Process-group lifecycle manager.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rkernel_protocols::template;
use rkernel_protocols::{
    ConnectionInfo, KernelSignal, LaunchRequest, LifecycleError, LifecycleManager, PollStatus,
    RemoteHandle,
};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::CLASS_NAME;
use crate::config::ProcessConfig;

/// How often an exit is checked for while waiting on the response socket.
const EXIT_CHECK_INTERVAL: Duration = Duration::from_millis(100);
/// Upper bound of a connection payload.
const MAX_PAYLOAD_BYTES: u64 = 64 * 1024;
/// How long one response connection may take to deliver its payload.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

struct ProcessEntry {
    child: Child,
    pid: u32,
    /// Taken while a wait is in progress; gone once the payload arrived.
    listener: Option<TcpListener>,
    response_address: String,
    exit: Option<Option<i32>>,
}

impl ProcessEntry {
    fn exit_status(&mut self) -> std::io::Result<Option<Option<i32>>> {
        if self.exit.is_none() {
            if let Some(status) = self.child.try_wait()? {
                self.exit = Some(status.code());
            }
        }
        Ok(self.exit)
    }
}

/// Runs each kernel as a local process in its own process group.
///
/// The launcher learns where to report its connection info through the
/// `{response_address}` placeholder; it connects to that address, writes the
/// connection JSON and closes the socket.
pub struct ProcessLifecycleManager {
    config: ProcessConfig,
    #[cfg(unix)]
    interrupt: crate::signal::Signal,
    processes: Mutex<HashMap<Uuid, ProcessEntry>>,
}

impl ProcessLifecycleManager {
    pub fn new(config: ProcessConfig) -> Result<Self, LifecycleError> {
        #[cfg(unix)]
        let interrupt = crate::signal::parse_signal(&config.interrupt_signal)?;
        #[cfg(not(unix))]
        config.validate()?;

        Ok(Self {
            config,
            #[cfg(unix)]
            interrupt,
            processes: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// Address the kernel behind `handle` must report to.
    pub fn response_address(&self, handle: &RemoteHandle) -> Option<String> {
        self.processes
            .lock()
            .get(&handle.token())
            .map(|entry| entry.response_address.clone())
    }

    /// OS process id behind `handle`.
    pub fn pid(&self, handle: &RemoteHandle) -> Option<u32> {
        self.processes.lock().get(&handle.token()).map(|entry| entry.pid)
    }

    fn take_listener(&self, handle: &RemoteHandle) -> Result<TcpListener, LifecycleError> {
        let mut processes = self.processes.lock();
        let entry = processes
            .get_mut(&handle.token())
            .ok_or_else(|| LifecycleError::UnknownHandle(handle.to_string()))?;
        entry.listener.take().ok_or_else(|| {
            LifecycleError::Backend(format!("{} has no pending connection info", handle.label()))
        })
    }

    fn restore_listener(&self, handle: &RemoteHandle, listener: TcpListener) {
        if let Some(entry) = self.processes.lock().get_mut(&handle.token()) {
            entry.listener = Some(listener);
        }
    }

    #[cfg(unix)]
    fn deliver(&self, entry: &mut ProcessEntry, signal: KernelSignal) -> Result<(), LifecycleError> {
        let os_signal = crate::signal::translate(signal, self.interrupt);
        match crate::signal::send_to_group(entry.pid, os_signal) {
            Ok(()) => {
                debug!("Sent {} to process group {}", os_signal, entry.pid);
                Ok(())
            }
            Err(nix::errno::Errno::ESRCH) => Err(LifecycleError::SignalUnsupported {
                signal,
                reason: format!("process group {} is gone", entry.pid),
            }),
            Err(e) => Err(LifecycleError::Backend(format!(
                "failed to send {} to process group {}: {}",
                os_signal, entry.pid, e
            ))),
        }
    }

    #[cfg(not(unix))]
    fn deliver(&self, entry: &mut ProcessEntry, signal: KernelSignal) -> Result<(), LifecycleError> {
        match signal {
            KernelSignal::Interrupt => Err(LifecycleError::SignalUnsupported {
                signal,
                reason: "interrupts need process groups".to_string(),
            }),
            KernelSignal::Terminate | KernelSignal::Kill => Ok(entry.child.start_kill()?),
        }
    }

    /// Accept connections until one carries a connection payload.
    ///
    /// Anything else reaching the response port is logged and dropped; the
    /// listener keeps waiting for the kernel.
    async fn receive_payload(
        &self,
        handle: &RemoteHandle,
        listener: &TcpListener,
        deadline: Instant,
    ) -> Result<ConnectionInfo, LifecycleError> {
        loop {
            if let PollStatus::Exited(code) = self.poll(handle).await {
                return Err(LifecycleError::LaunchRejected(format!(
                    "{} exited (code {:?}) before reporting connection info",
                    handle.label(),
                    code
                )));
            }

            let next_check = (Instant::now() + EXIT_CHECK_INTERVAL).min(deadline);
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    debug!("Connection info for {} arriving from {}", handle.label(), peer);
                    match read_payload(stream, deadline).await {
                        Ok(info) => return Ok(info),
                        Err(e) => warn!(
                            "Ignoring connection from {} on the response port of {}: {}",
                            peer,
                            handle.label(),
                            e
                        ),
                    }
                }
                _ = tokio::time::sleep_until(next_check) => {
                    if Instant::now() >= deadline {
                        return Err(LifecycleError::LaunchTimeout(handle.label().to_string()));
                    }
                }
            }
        }
    }
}

/// Read one payload, giving a slow peer at most `READ_TIMEOUT`.
async fn read_payload(stream: TcpStream, deadline: Instant) -> Result<ConnectionInfo, LifecycleError> {
    let read_deadline = (Instant::now() + READ_TIMEOUT).min(deadline);
    let mut payload = String::new();
    let mut limited = stream.take(MAX_PAYLOAD_BYTES);
    let read = limited.read_to_string(&mut payload);
    match tokio::time::timeout_at(read_deadline, read).await {
        Ok(result) => {
            result?;
        }
        Err(_) => {
            return Err(LifecycleError::Backend(format!(
                "no payload within {:?}",
                READ_TIMEOUT
            )));
        }
    }
    ConnectionInfo::from_json(payload.trim())
}

#[async_trait]
impl LifecycleManager for ProcessLifecycleManager {
    fn name(&self) -> &str {
        CLASS_NAME
    }

    async fn launch(&self, request: LaunchRequest) -> Result<RemoteHandle, LifecycleError> {
        let listener = TcpListener::bind((self.config.response_ip, 0))
            .await
            .map_err(|e| {
                LifecycleError::LaunchRejected(format!(
                    "cannot bind response listener on {}: {}",
                    self.config.response_ip, e
                ))
            })?;
        let response_address = listener.local_addr()?.to_string();

        let namespace =
            HashMap::from([("response_address".to_string(), response_address.clone())]);
        let argv = template::format_argv(&request.argv, &namespace);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| LifecycleError::LaunchRejected("empty kernel command".to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(&request.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(cwd) = &request.cwd {
            cmd.current_dir(cwd);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        // Env values may carry credentials; keep them out of the message.
        let child = cmd.spawn().map_err(|e| {
            LifecycleError::LaunchRejected(format!("failed to spawn '{}': {}", program, e))
        })?;
        let pid = child.id().ok_or_else(|| {
            LifecycleError::LaunchRejected(format!("'{}' exited during spawn", program))
        })?;

        let handle = RemoteHandle::new(format!("pid {}", pid));
        info!(
            kernel_id = %request.kernel_id,
            "Launched '{}' as pid {}, awaiting connection info on {}",
            request.spec.name,
            pid,
            response_address
        );

        self.processes.lock().insert(
            handle.token(),
            ProcessEntry {
                child,
                pid,
                listener: Some(listener),
                response_address,
                exit: None,
            },
        );
        Ok(handle)
    }

    async fn poll(&self, handle: &RemoteHandle) -> PollStatus {
        let mut processes = self.processes.lock();
        let Some(entry) = processes.get_mut(&handle.token()) else {
            return PollStatus::Unknown;
        };

        match entry.exit_status() {
            Ok(Some(code)) => PollStatus::Exited(code),
            Ok(None) => PollStatus::Alive,
            Err(e) => {
                debug!("Status of {} unavailable: {}", handle.label(), e);
                PollStatus::Unknown
            }
        }
    }

    async fn await_connection_info(
        &self,
        handle: &RemoteHandle,
        deadline: Instant,
    ) -> Result<ConnectionInfo, LifecycleError> {
        let listener = self.take_listener(handle)?;
        let result = self.receive_payload(handle, &listener, deadline).await;

        match result {
            Err(LifecycleError::LaunchTimeout(_)) => self.restore_listener(handle, listener),
            Ok(ref info) => info!("{} reported connection info ({})", handle.label(), info.ip),
            Err(ref e) => warn!("No connection info from {}: {}", handle.label(), e),
        }
        result
    }

    async fn signal(
        &self,
        handle: &RemoteHandle,
        signal: KernelSignal,
    ) -> Result<(), LifecycleError> {
        let mut processes = self.processes.lock();
        let entry = processes
            .get_mut(&handle.token())
            .ok_or_else(|| LifecycleError::UnknownHandle(handle.to_string()))?;

        if entry.exit_status()?.is_some() {
            return Err(LifecycleError::SignalUnsupported {
                signal,
                reason: format!("{} already exited", handle.label()),
            });
        }

        self.deliver(entry, signal)
    }

    async fn cleanup(&self, handle: &RemoteHandle) -> Result<(), LifecycleError> {
        if let Some(entry) = self.processes.lock().remove(&handle.token()) {
            debug!(
                "Released {} (response address {})",
                handle.label(),
                entry.response_address
            );
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
