//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (arrival-infra) implements. The core crate never depends on any specific
//! storage technology.

pub mod execution;
pub mod memory;

/// Sort order for list queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}
