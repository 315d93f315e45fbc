//! HTTP request handlers for the API.

pub mod execution;
pub mod health;
pub mod notification;
