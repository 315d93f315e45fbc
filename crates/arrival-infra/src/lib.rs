//! Infrastructure layer for Arrival.
//!
//! Contains implementations of the ports defined in `arrival-core`: SQLite
//! execution history, the local process compute provider, the local object
//! store with its bucket watcher, plus config loading and ingress signature
//! verification.

pub mod compute;
pub mod config;
pub mod ingress;
pub mod paths;
pub mod sqlite;
pub mod storage;
