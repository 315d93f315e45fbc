//! Local storage provider: a directory-backed object store and a watcher
//! that turns file writes into storage notifications.

pub mod local;
pub mod watcher;

pub use local::LocalObjectStore;
pub use watcher::{BucketWatcher, start_bucket_watcher};

/// Errors from the local object store and its watcher.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid bucket name '{0}'")]
    InvalidBucket(String),

    #[error("invalid object key '{0}'")]
    InvalidKey(String),

    #[error("object '{key}' not found in bucket '{bucket}'")]
    NotFound { bucket: String, key: String },

    #[error("watcher creation failed: {0}")]
    WatcherCreation(String),

    #[error("failed to watch '{path}': {reason}")]
    WatchPath { path: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
