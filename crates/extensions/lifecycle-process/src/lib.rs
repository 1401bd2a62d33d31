//! Local process lifecycle manager for rkernel.
//!
//! Launches each kernel as a local process in its own process group and
//! waits for the kernel launcher to report its connection info back over a
//! TCP response socket.
//!
//! - `process`: class name to use in a kernel spec's `lifecycle_manager` stanza

mod config;
mod factory;
mod process;
mod signal;

pub use config::ProcessConfig;
pub use factory::{ALTERNATE_SIGINT, ProcessLifecycleFactory};
pub use process::ProcessLifecycleManager;

/// Class name this backend registers under.
pub const CLASS_NAME: &str = "process";
