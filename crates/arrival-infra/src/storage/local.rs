//! Directory-backed object store.
//!
//! Objects live at `<root>/<bucket>/<key>`, with `/` in keys mapping to
//! sub-directories. Writes are staged under `<root>/.staging` and renamed
//! into place, so a bucket watcher never observes a half-written object.

use std::path::{Component, Path, PathBuf};

use arrival_types::notification::Notification;
use uuid::Uuid;

use super::StorageError;

const STAGING_DIR: &str = ".staging";

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    source: String,
}

impl LocalObjectStore {
    /// Store rooted at `root`; notifications carry `source`.
    pub fn new(root: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            source: source.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Directory holding `bucket`'s objects.
    pub fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        validate_bucket(bucket)?;
        Ok(self.root.join(bucket))
    }

    /// Create the bucket directory if missing.
    pub async fn ensure_bucket(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        let dir = self.bucket_dir(bucket)?;
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        let mut path = self.bucket_dir(bucket)?;
        for part in key.split('/') {
            path.push(part);
        }
        Ok(path)
    }

    /// Write an object and return the notification describing the write.
    pub async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
    ) -> Result<Notification, StorageError> {
        let target = self.object_path(bucket, key)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let staging = self.root.join(STAGING_DIR);
        tokio::fs::create_dir_all(&staging).await?;
        let staged = staging.join(Uuid::now_v7().simple().to_string());
        tokio::fs::write(&staged, bytes).await?;
        if let Err(e) = tokio::fs::rename(&staged, &target).await {
            let _ = tokio::fs::remove_file(&staged).await;
            return Err(e.into());
        }

        tracing::debug!(bucket, object_key = key, size = bytes.len(), "object stored");
        Ok(Notification::object_created(
            self.source.clone(),
            bucket,
            key,
            bytes.len() as i64,
        ))
    }

    /// Read an object's bytes.
    pub async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

/// Object key for `path` relative to `bucket_dir`, `/`-separated.
///
/// `None` if the path is outside the bucket or not plain components.
pub fn key_for_path(bucket_dir: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(bucket_dir).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?.to_string()),
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

fn validate_bucket(bucket: &str) -> Result<(), StorageError> {
    let invalid = bucket.is_empty()
        || bucket.starts_with('.')
        || bucket.contains(['/', '\\']);
    if invalid {
        return Err(StorageError::InvalidBucket(bucket.to_string()));
    }
    Ok(())
}

fn validate_key(key: &str) -> Result<(), StorageError> {
    let invalid = key.is_empty()
        || key.contains('\\')
        || key
            .split('/')
            .any(|part| part.is_empty() || part == "." || part == "..");
    if invalid {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> LocalObjectStore {
        LocalObjectStore::new(tmp.path(), "aws.s3")
    }

    #[tokio::test]
    async fn put_then_get() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        let n = store
            .put("reports-dev-bucket", "input/foo.csv", b"a,b\n1,2\n")
            .await
            .unwrap();
        assert_eq!(n.source, "aws.s3");
        assert_eq!(n.detail_type, "Object Created");
        assert_eq!(n.bucket_name, "reports-dev-bucket");
        assert_eq!(n.object_key, "input/foo.csv");
        assert_eq!(n.object_size, 8);

        let bytes = store.get("reports-dev-bucket", "input/foo.csv").await.unwrap();
        assert_eq!(bytes, b"a,b\n1,2\n");
        assert!(tmp.path().join("reports-dev-bucket/input/foo.csv").is_file());
    }

    #[tokio::test]
    async fn overwrite_replaces_content() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store.put("b", "input/x", b"one").await.unwrap();
        store.put("b", "input/x", b"three").await.unwrap();
        assert_eq!(store.get("b", "input/x").await.unwrap(), b"three");
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = store(&tmp).get("b", "input/none").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        for key in ["", "../escape", "input/../../x", "/abs", "input//x", "input/"] {
            assert!(
                matches!(store.put("b", key, b"x").await, Err(StorageError::InvalidKey(_))),
                "key {key:?} should be rejected"
            );
        }
        for bucket in ["", ".staging", "a/b"] {
            assert!(matches!(
                store.put(bucket, "input/x", b"x").await,
                Err(StorageError::InvalidBucket(_))
            ));
        }
    }

    #[test]
    fn key_for_path_is_slash_joined() {
        let bucket = Path::new("/data/buckets/b");
        assert_eq!(
            key_for_path(bucket, Path::new("/data/buckets/b/input/2026/a.csv")).as_deref(),
            Some("input/2026/a.csv")
        );
        assert_eq!(key_for_path(bucket, Path::new("/data/buckets/other/a.csv")), None);
        assert_eq!(key_for_path(bucket, bucket), None);
    }
}
