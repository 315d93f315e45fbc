//! HTTP notification ingress support.

pub mod signature;
