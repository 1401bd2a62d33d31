//! Scripted in-memory backend for orchestration tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rkernel_protocols::{
    ConnectionInfo, KernelSignal, KernelSpec, LaunchRequest, LifecycleError, LifecycleManager,
    LifecycleManagerFactory, PollStatus, RemoteHandle,
};
use tokio::time::Instant;
use uuid::Uuid;

/// How a launched fake kernel behaves while the manager waits for it.
#[derive(Debug, Clone)]
pub(crate) enum Readiness {
    /// Connection info is available immediately.
    Ready,
    /// Connection info arrives after a delay.
    Delay(Duration),
    /// Never reports back.
    Never,
    /// The process dies before reporting.
    Exit,
}

#[derive(Default)]
pub(crate) struct FakeState {
    launches: u32,
    launch_script: VecDeque<Result<Readiness, String>>,
    poll_script: VecDeque<PollStatus>,
    ignore_terminate: bool,
    ignore_kill: bool,
    readiness: HashMap<Uuid, Readiness>,
    live: HashSet<Uuid>,
    exited: HashMap<Uuid, Option<i32>>,
    ports: HashMap<Uuid, u16>,
    signals: Vec<(Uuid, KernelSignal)>,
    cleanups: HashMap<Uuid, u32>,
    requests: Vec<LaunchRequest>,
}

/// Test-side view of the shared fake state.
#[derive(Clone, Default)]
pub(crate) struct FakeProbe(Arc<Mutex<FakeState>>);

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend(&self) -> FakeLifecycle {
        FakeLifecycle {
            state: self.0.clone(),
        }
    }

    /// Queue the outcome of the next launch; `Err` rejects it.
    pub fn script_launch(&self, outcome: Result<Readiness, &str>) {
        self.0
            .lock()
            .launch_script
            .push_back(outcome.map_err(str::to_string));
    }

    /// Queue poll answers for live handles; `Alive` once exhausted.
    pub fn script_polls(&self, polls: impl IntoIterator<Item = PollStatus>) {
        self.0.lock().poll_script.extend(polls);
    }

    pub fn ignore_terminate(&self) {
        self.0.lock().ignore_terminate = true;
    }

    /// Processes survive every signal, as on a wedged remote host.
    pub fn ignore_kill(&self) {
        let mut state = self.0.lock();
        state.ignore_terminate = true;
        state.ignore_kill = true;
    }

    /// Make every running process exit on its own.
    pub fn crash_all(&self, code: Option<i32>) {
        let mut state = self.0.lock();
        let live: Vec<Uuid> = state.live.iter().copied().collect();
        for token in live {
            state.exited.entry(token).or_insert(code);
        }
    }

    pub fn launches(&self) -> u32 {
        self.0.lock().launches
    }

    /// Handles launched but not yet cleaned up.
    pub fn live_count(&self) -> usize {
        self.0.lock().live.len()
    }

    pub fn cleanup_count(&self, handle: &RemoteHandle) -> u32 {
        self.0
            .lock()
            .cleanups
            .get(&handle.token())
            .copied()
            .unwrap_or(0)
    }

    pub fn total_cleanups(&self) -> u32 {
        self.0.lock().cleanups.values().sum()
    }

    pub fn signals(&self) -> Vec<KernelSignal> {
        self.0.lock().signals.iter().map(|(_, s)| *s).collect()
    }

    pub fn signal_count(&self, signal: KernelSignal) -> usize {
        self.0
            .lock()
            .signals
            .iter()
            .filter(|(_, s)| *s == signal)
            .count()
    }

    pub fn last_request(&self) -> Option<LaunchRequest> {
        self.0.lock().requests.last().cloned()
    }
}

/// Connection payload reported by fake kernels; the shell port varies per launch.
pub(crate) fn fake_connection_info(shell_port: u16) -> ConnectionInfo {
    ConnectionInfo {
        transport: "tcp".to_string(),
        ip: "172.16.18.82".to_string(),
        shell_port,
        iopub_port: 53135,
        stdin_port: 47557,
        control_port: 37319,
        hb_port: 47553,
        key: String::new(),
        signature_scheme: "hmac-sha256".to_string(),
        kernel_name: String::new(),
        kernel_id: None,
    }
}

pub(crate) struct FakeLifecycle {
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl LifecycleManager for FakeLifecycle {
    fn name(&self) -> &str {
        "fake"
    }

    async fn launch(&self, request: LaunchRequest) -> Result<RemoteHandle, LifecycleError> {
        let mut state = self.state.lock();
        state.launches += 1;
        let launch_no = state.launches;
        state.requests.push(request);

        let readiness = match state.launch_script.pop_front() {
            Some(Ok(readiness)) => readiness,
            Some(Err(reason)) => return Err(LifecycleError::LaunchRejected(reason)),
            None => Readiness::Ready,
        };

        let handle = RemoteHandle::new(format!("fake {}", launch_no));
        state.live.insert(handle.token());
        state.readiness.insert(handle.token(), readiness);
        state.ports.insert(handle.token(), 40000 + launch_no as u16);
        Ok(handle)
    }

    async fn poll(&self, handle: &RemoteHandle) -> PollStatus {
        let mut state = self.state.lock();
        if let Some(code) = state.exited.get(&handle.token()) {
            return PollStatus::Exited(*code);
        }
        if !state.live.contains(&handle.token()) {
            return PollStatus::Unknown;
        }
        state.poll_script.pop_front().unwrap_or(PollStatus::Alive)
    }

    async fn await_connection_info(
        &self,
        handle: &RemoteHandle,
        _deadline: Instant,
    ) -> Result<ConnectionInfo, LifecycleError> {
        let (readiness, port) = {
            let state = self.state.lock();
            let readiness = state
                .readiness
                .get(&handle.token())
                .cloned()
                .ok_or_else(|| LifecycleError::UnknownHandle(handle.to_string()))?;
            (readiness, state.ports.get(&handle.token()).copied().unwrap_or(0))
        };

        match readiness {
            Readiness::Ready => Ok(fake_connection_info(port)),
            Readiness::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(fake_connection_info(port))
            }
            Readiness::Never => {
                std::future::pending::<()>().await;
                Err(LifecycleError::LaunchTimeout(handle.to_string()))
            }
            Readiness::Exit => {
                self.state.lock().exited.insert(handle.token(), Some(1));
                Err(LifecycleError::LaunchRejected(format!(
                    "{} exited before reporting",
                    handle
                )))
            }
        }
    }

    async fn signal(&self, handle: &RemoteHandle, signal: KernelSignal) -> Result<(), LifecycleError> {
        let mut state = self.state.lock();
        state.signals.push((handle.token(), signal));

        if state.exited.contains_key(&handle.token()) {
            return Err(LifecycleError::SignalUnsupported {
                signal,
                reason: "process already exited".to_string(),
            });
        }

        match signal {
            KernelSignal::Interrupt => {}
            KernelSignal::Terminate => {
                if !state.ignore_terminate {
                    state.exited.insert(handle.token(), None);
                }
            }
            KernelSignal::Kill => {
                if !state.ignore_kill {
                    state.exited.insert(handle.token(), None);
                }
            }
        }
        Ok(())
    }

    async fn cleanup(&self, handle: &RemoteHandle) -> Result<(), LifecycleError> {
        let mut state = self.state.lock();
        *state.cleanups.entry(handle.token()).or_insert(0) += 1;
        state.live.remove(&handle.token());
        Ok(())
    }
}

/// Factory handing out fake backends that share one probe.
pub(crate) struct FakeFactory {
    class_name: String,
    probe: FakeProbe,
    created: AtomicU32,
}

impl FakeFactory {
    pub fn new(class_name: &str) -> Self {
        Self::with_probe(class_name, FakeProbe::new())
    }

    pub fn with_probe(class_name: &str, probe: FakeProbe) -> Self {
        Self {
            class_name: class_name.to_string(),
            probe,
            created: AtomicU32::new(0),
        }
    }

    pub fn created(&self) -> u32 {
        self.created.load(Ordering::SeqCst)
    }
}

impl LifecycleManagerFactory for FakeFactory {
    fn class_name(&self) -> &str {
        &self.class_name
    }

    fn create(&self, spec: &KernelSpec) -> Result<Box<dyn LifecycleManager>, LifecycleError> {
        if spec.lifecycle.config.get("invalid").is_some() {
            return Err(LifecycleError::InvalidConfig(format!(
                "kernel '{}' has an invalid backend config",
                spec.name
            )));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.probe.backend()))
    }
}
