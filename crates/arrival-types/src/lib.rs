//! Shared domain types for Arrival.
//!
//! This crate contains the plain value types that flow through the dispatch
//! pipeline: Notification, Rule, Invocation, Execution, Job, the static
//! dispatcher configuration, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod execution;
pub mod job;
pub mod notification;
pub mod rule;
