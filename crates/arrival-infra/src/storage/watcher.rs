//! Bucket watcher: debounced filesystem events -> "Object Created" notifications.
//!
//! Every regular file written under `<root>/<bucket>/` yields one notification
//! per debounce window, carrying the `/`-joined relative path as the object
//! key and the file size at the time the window closed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use arrival_types::notification::Notification;
// notify types come through the debouncer's re-export so both agree on the
// notify version.
use notify_debouncer_mini::notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer};
use tokio::sync::mpsc;

use super::StorageError;
use super::local::{LocalObjectStore, key_for_path};

/// RAII handle that keeps the bucket watcher alive. Dropping it stops the
/// watch.
pub struct BucketWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
    bucket: String,
    dir: PathBuf,
}

impl BucketWatcher {
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for BucketWatcher {
    fn drop(&mut self) {
        tracing::debug!(bucket = self.bucket.as_str(), "bucket watcher dropped");
    }
}

/// Build the notification for a changed path, if it is a file in the bucket.
fn notification_for(
    source: &str,
    bucket: &str,
    bucket_dir: &Path,
    path: &Path,
) -> Option<Notification> {
    let metadata = std::fs::metadata(path).ok()?;
    if !metadata.is_file() {
        return None;
    }
    let key = key_for_path(bucket_dir, path).or_else(|| {
        let canonical = path.canonicalize().ok()?;
        key_for_path(bucket_dir, &canonical)
    })?;
    Some(Notification::object_created(
        source,
        bucket,
        key,
        i64::try_from(metadata.len()).unwrap_or(i64::MAX),
    ))
}

/// Watch `bucket` in `store` and send a notification per written object.
///
/// Every notification is delivered: when `tx` is full the watcher thread
/// waits for capacity. Delivery stops once the receiver is dropped.
pub fn start_bucket_watcher(
    store: &LocalObjectStore,
    bucket: &str,
    debounce: Duration,
    tx: mpsc::Sender<Notification>,
) -> Result<BucketWatcher, StorageError> {
    let dir = store.bucket_dir(bucket)?;
    std::fs::create_dir_all(&dir)?;
    let dir = dir.canonicalize()?;

    let source = store.source().to_string();
    let bucket_name = bucket.to_string();
    let watch_dir = dir.clone();

    let mut debouncer = new_debouncer(debounce, move |result: DebounceEventResult| {
        match result {
            Ok(events) => {
                for event in events {
                    let Some(notification) =
                        notification_for(&source, &bucket_name, &watch_dir, &event.path)
                    else {
                        continue;
                    };
                    tracing::debug!(
                        bucket = bucket_name.as_str(),
                        object_key = notification.object_key.as_str(),
                        size = notification.object_size,
                        "object write detected"
                    );
                    // Runs on the debouncer thread, outside the runtime.
                    if let Err(mpsc::error::SendError(n)) = tx.blocking_send(notification) {
                        tracing::debug!(
                            object_key = n.object_key.as_str(),
                            "notification channel closed"
                        );
                        return;
                    }
                }
            }
            Err(err) => {
                tracing::warn!(bucket = bucket_name.as_str(), error = %err, "bucket watcher error");
            }
        }
    })
    .map_err(|e| StorageError::WatcherCreation(e.to_string()))?;

    debouncer
        .watcher()
        .watch(&dir, RecursiveMode::Recursive)
        .map_err(|e| StorageError::WatchPath {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })?;

    tracing::info!(bucket, dir = %dir.display(), "watching bucket");

    Ok(BucketWatcher {
        _debouncer: debouncer,
        bucket: bucket.to_string(),
        dir,
    })
}
