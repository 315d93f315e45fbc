//! Event matcher: filters notifications against the dispatch rule.
//!
//! Matching is pure and deterministic. A notification that fails any filter
//! is dropped; that is not an error.

use std::fmt;

use arrival_types::execution::Invocation;
use arrival_types::notification::Notification;
use arrival_types::rule::Rule;

/// The first filter a notification failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mismatch {
    Source { expected: String, actual: String },
    DetailType { expected: String, actual: String },
    Bucket { expected: String, actual: String },
    KeyPrefix { prefix: String, key: String },
    Size { min_size: i64, size: i64 },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::Source { expected, actual } => {
                write!(f, "source '{actual}' does not equal '{expected}'")
            }
            Mismatch::DetailType { expected, actual } => {
                write!(f, "detail type '{actual}' does not equal '{expected}'")
            }
            Mismatch::Bucket { expected, actual } => {
                write!(f, "bucket '{actual}' does not equal '{expected}'")
            }
            Mismatch::KeyPrefix { prefix, key } => {
                write!(f, "object key '{key}' does not start with '{prefix}'")
            }
            Mismatch::Size { min_size, size } => {
                write!(f, "object size {size} is not greater than {min_size}")
            }
        }
    }
}

/// Read-only matcher holding the rule and the task entry point.
#[derive(Debug, Clone)]
pub struct EventMatcher {
    rule: Rule,
    entry_path: String,
}

impl EventMatcher {
    pub fn new(rule: Rule, entry_path: impl Into<String>) -> Self {
        Self {
            rule,
            entry_path: entry_path.into(),
        }
    }

    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    pub fn entry_path(&self) -> &str {
        &self.entry_path
    }

    /// Check every filter in order and report the first that fails.
    pub fn explain(&self, notification: &Notification) -> Result<(), Mismatch> {
        let rule = &self.rule;
        if notification.source != rule.source {
            return Err(Mismatch::Source {
                expected: rule.source.clone(),
                actual: notification.source.clone(),
            });
        }
        if notification.detail_type != rule.detail_type {
            return Err(Mismatch::DetailType {
                expected: rule.detail_type.clone(),
                actual: notification.detail_type.clone(),
            });
        }
        if notification.bucket_name != rule.bucket_name {
            return Err(Mismatch::Bucket {
                expected: rule.bucket_name.clone(),
                actual: notification.bucket_name.clone(),
            });
        }
        if !notification.object_key.starts_with(&rule.key_prefix) {
            return Err(Mismatch::KeyPrefix {
                prefix: rule.key_prefix.clone(),
                key: notification.object_key.clone(),
            });
        }
        if notification.object_size <= rule.min_size {
            return Err(Mismatch::Size {
                min_size: rule.min_size,
                size: notification.object_size,
            });
        }
        Ok(())
    }

    /// `Some([entry_path, object_key])` iff every filter passes.
    pub fn match_notification(&self, notification: &Notification) -> Option<Invocation> {
        self.explain(notification)
            .ok()
            .map(|()| Invocation::new(self.entry_path.clone(), notification.object_key.clone()))
    }
}
