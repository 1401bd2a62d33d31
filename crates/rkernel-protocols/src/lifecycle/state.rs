//! Kernel lifecycle states.

/// State of one kernel's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LifecycleState {
    /// Created, nothing submitted yet.
    NotStarted = 0,
    /// Submitted to the backend, waiting for readiness.
    Launching = 1,
    /// Connection info published.
    Running = 2,
    /// A replacement launch is in flight; the old connection info stays valid.
    Restarting = 3,
    /// Termination sequence in progress.
    Terminating = 4,
    /// Terminated and cleaned up.
    Terminated = 5,
    /// Failed and cleaned up.
    Failed = 6,
}

impl From<u8> for LifecycleState {
    fn from(v: u8) -> Self {
        match v {
            0 => LifecycleState::NotStarted,
            1 => LifecycleState::Launching,
            2 => LifecycleState::Running,
            3 => LifecycleState::Restarting,
            4 => LifecycleState::Terminating,
            5 => LifecycleState::Terminated,
            6 => LifecycleState::Failed,
            _ => LifecycleState::Failed,
        }
    }
}

impl LifecycleState {
    /// No further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Terminated | LifecycleState::Failed)
    }

    /// States in which a remote handle may exist.
    pub fn holds_handle(self) -> bool {
        matches!(
            self,
            LifecycleState::Launching
                | LifecycleState::Running
                | LifecycleState::Restarting
                | LifecycleState::Terminating
        )
    }

    /// States in which connection info is published.
    pub fn holds_connection(self) -> bool {
        matches!(
            self,
            LifecycleState::Running | LifecycleState::Restarting | LifecycleState::Terminating
        )
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::NotStarted => write!(f, "not_started"),
            LifecycleState::Launching => write!(f, "launching"),
            LifecycleState::Running => write!(f, "running"),
            LifecycleState::Restarting => write!(f, "restarting"),
            LifecycleState::Terminating => write!(f, "terminating"),
            LifecycleState::Terminated => write!(f, "terminated"),
            LifecycleState::Failed => write!(f, "failed"),
        }
    }
}
