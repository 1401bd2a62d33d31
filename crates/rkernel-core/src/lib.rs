//! # rkernel Core
//!
//! Generic kernel lifecycle orchestration.
//!
//! ## Components
//!
//! - [`KernelManager`] - Drives one kernel through launch, readiness,
//!   monitoring, signaling, restart and shutdown
//! - [`KernelProvider`] - Kernel type registry that builds kernel managers
//! - [`LifecycleRegistry`] - Lifecycle manager factories by implementation name
//!
//! Backends plug in through [`rkernel_protocols::LifecycleManagerFactory`];
//! nothing in this crate knows how a kernel is actually spawned.

pub mod env;
pub mod error;
pub mod events;
pub mod manager;
pub mod provider;
pub mod registry;
pub mod restart;

#[cfg(test)]
pub(crate) mod testing;

pub use env::{KernelOverrides, PreparedLaunch};
pub use error::KernelError;
pub use events::KernelEvent;
pub use manager::{KernelManager, MonitorOutcome};
pub use provider::KernelProvider;
pub use registry::LifecycleRegistry;
pub use restart::RestartTracker;
