//! Error types for the lifecycle contract.

mod lifecycle;

pub use lifecycle::*;
