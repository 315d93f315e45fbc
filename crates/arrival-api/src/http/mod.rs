//! HTTP layer for Arrival.
//!
//! Axum-based API at `/api/v1/`: notification ingress plus read-only
//! execution queries, all wrapped in the response envelope.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
