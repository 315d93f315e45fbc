//! Storage write notifications.
//!
//! `Notification` is the flattened record of a single object write that the
//! matcher consumes. `NotificationPayload` is the wire shape accepted from
//! producers: either the flat document
//!
//! ```json
//! { "source": "aws.s3", "detailType": "Object Created",
//!   "bucket": { "name": "..." }, "object": { "key": "...", "size": 12 } }
//! ```
//!
//! or an EventBridge-style envelope carrying the same fields under `detail`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Detail type emitted by storage providers for a completed object write.
pub const OBJECT_CREATED: &str = "Object Created";

/// Source tag used by the default rule and by the local object store.
pub const DEFAULT_SOURCE: &str = "aws.s3";

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// Immutable record of one storage write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Originating provider tag (e.g. "aws.s3").
    pub source: String,
    /// Event category (e.g. "Object Created").
    pub detail_type: String,
    /// Bucket the object was written to.
    pub bucket_name: String,
    /// Full object key within the bucket.
    pub object_key: String,
    /// Object size in bytes as reported by the provider.
    pub object_size: i64,
    /// When the write happened.
    pub occurred_at: DateTime<Utc>,
}

impl Notification {
    /// Build an "Object Created" notification stamped with the current time.
    pub fn object_created(
        source: impl Into<String>,
        bucket_name: impl Into<String>,
        object_key: impl Into<String>,
        object_size: i64,
    ) -> Self {
        Self {
            source: source.into(),
            detail_type: OBJECT_CREATED.to_string(),
            bucket_name: bucket_name.into(),
            object_key: object_key.into(),
            object_size,
            occurred_at: Utc::now(),
        }
    }

    /// Render this notification in the flat wire schema.
    pub fn to_payload(&self) -> NotificationPayload {
        NotificationPayload::Flat(FlatPayload {
            source: self.source.clone(),
            detail_type: self.detail_type.clone(),
            bucket: BucketRef {
                name: self.bucket_name.clone(),
            },
            object: ObjectRef {
                key: self.object_key.clone(),
                size: self.object_size,
            },
            time: Some(self.occurred_at),
        })
    }
}

// ---------------------------------------------------------------------------
// Wire payloads
// ---------------------------------------------------------------------------

/// `bucket` sub-document of a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketRef {
    pub name: String,
}

/// `object` sub-document of a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub key: String,
    pub size: i64,
}

/// Flat notification document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatPayload {
    pub source: String,
    #[serde(rename = "detailType", alias = "detail-type")]
    pub detail_type: String,
    pub bucket: BucketRef,
    pub object: ObjectRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
}

/// The `detail` block of an EventBridge envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeDetail {
    pub bucket: BucketRef,
    pub object: ObjectRef,
}

/// EventBridge-style envelope with the storage fields nested under `detail`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopePayload {
    pub source: String,
    #[serde(rename = "detail-type", alias = "detailType")]
    pub detail_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    pub detail: EnvelopeDetail,
}

/// Any accepted notification wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotificationPayload {
    Envelope(EnvelopePayload),
    Flat(FlatPayload),
}

impl From<NotificationPayload> for Notification {
    fn from(payload: NotificationPayload) -> Self {
        match payload {
            NotificationPayload::Envelope(env) => Notification {
                source: env.source,
                detail_type: env.detail_type,
                bucket_name: env.detail.bucket.name,
                object_key: env.detail.object.key,
                object_size: env.detail.object.size,
                occurred_at: env.time.unwrap_or_else(Utc::now),
            },
            NotificationPayload::Flat(flat) => Notification {
                source: flat.source,
                detail_type: flat.detail_type,
                bucket_name: flat.bucket.name,
                object_key: flat.object.key,
                object_size: flat.object.size,
                occurred_at: flat.time.unwrap_or_else(Utc::now),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
