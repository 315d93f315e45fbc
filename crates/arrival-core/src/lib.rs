//! Dispatch pipeline logic and port (trait) definitions for Arrival.
//!
//! This crate defines the "ports" the infrastructure layer implements
//! (`ExecutionRepository`, `ComputeProvider`) and the pipeline built on top of
//! them: matcher -> orchestrator -> launcher. It depends only on
//! `arrival-types` -- never on `arrival-infra` or any database/IO crate.

pub mod dispatcher;
pub mod event;
pub mod launcher;
pub mod matcher;
pub mod orchestrator;
pub mod repository;

#[cfg(test)]
pub(crate) mod testing;
