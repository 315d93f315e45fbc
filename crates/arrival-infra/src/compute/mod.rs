//! Compute provider implementations.

pub mod process;

pub use process::ProcessComputeProvider;
