//! Matching rule for incoming notifications.

use serde::{Deserialize, Serialize};

use crate::notification::{DEFAULT_SOURCE, OBJECT_CREATED};

/// Static filter deciding which notifications trigger an execution.
///
/// A notification qualifies iff `source`, `detail_type` and `bucket_name`
/// are equal to the rule's values, the object key starts with `key_prefix`,
/// and the object size is strictly greater than `min_size`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Required notification source (default "aws.s3").
    #[serde(default = "default_source")]
    pub source: String,
    /// Required detail type (default "Object Created").
    #[serde(default = "default_detail_type")]
    pub detail_type: String,
    /// Required bucket name. Left empty in config to derive
    /// `{project}-{environment}-bucket`.
    #[serde(default)]
    pub bucket_name: String,
    /// Required object key prefix (default "input/").
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Exclusive lower bound on object size in bytes (default 0).
    #[serde(default)]
    pub min_size: i64,
}

fn default_source() -> String {
    DEFAULT_SOURCE.to_string()
}

fn default_detail_type() -> String {
    OBJECT_CREATED.to_string()
}

fn default_key_prefix() -> String {
    "input/".to_string()
}

impl Rule {
    /// Rule with default filters for the given bucket.
    pub fn for_bucket(bucket_name: impl Into<String>) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            ..Self::default()
        }
    }
}

impl Default for Rule {
    fn default() -> Self {
        Self {
            source: default_source(),
            detail_type: default_detail_type(),
            bucket_name: String::new(),
            key_prefix: default_key_prefix(),
            min_size: 0,
        }
    }
}
