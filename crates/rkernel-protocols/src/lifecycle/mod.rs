//! Backend plugin contract.
//!
//! Every backend (plain hosts, YARN, Kubernetes, Docker, ...) implements
//! [`LifecycleManager`]. Operations that may take arbitrarily long on a remote
//! system are split into a non-blocking submission (`launch`, `signal`) and a
//! separately polled or awaited completion (`poll`, `await_connection_info`).

mod handle;
mod state;
mod traits;

pub use handle::RemoteHandle;
pub use state::LifecycleState;
pub use traits::{
    KernelSignal, LaunchRequest, LifecycleManager, LifecycleManagerFactory, PollStatus,
};
