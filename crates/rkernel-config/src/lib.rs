//! # rkernel Config
//!
//! Configuration management for rkernel: orchestration timeouts, provider
//! policy, and the kernel spec source.

mod error;
mod kernelspec;
mod loader;
mod schema;
pub mod staging;

pub use error::ConfigError;
pub use kernelspec::KernelSpecLoader;
pub use loader::ConfigLoader;
pub use schema::*;
