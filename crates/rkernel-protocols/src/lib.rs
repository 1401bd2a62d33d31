//! # rkernel Protocols
//!
//! Contract definitions shared by the orchestration core and every backend.
//! Contains data types and traits only - no orchestration logic.
//!
//! ## Core Types
//!
//! - [`ConnectionInfo`] - Endpoints and credentials of a running kernel
//! - [`KernelSpec`] - Definition of a launchable kernel type
//! - [`LifecycleManager`] - Backend plugin contract (launch/poll/await/signal/cleanup)
//! - [`LifecycleManagerFactory`] - Constructs backend instances for the provider
//! - [`LifecycleState`] - States of the kernel lifecycle state machine

pub mod connection;
pub mod error;
pub mod kernelspec;
pub mod lifecycle;
pub mod template;

pub use connection::{ConnectionInfo, ConnectionTemplate, KernelChannel};
pub use error::LifecycleError;
pub use kernelspec::{KernelSpec, LifecycleInfo};
pub use lifecycle::{
    KernelSignal, LaunchRequest, LifecycleManager, LifecycleManagerFactory, LifecycleState,
    PollStatus, RemoteHandle,
};
