//! Observability setup shared by the Arrival binaries.

pub mod tracing_setup;
