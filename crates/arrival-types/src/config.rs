//! Dispatcher configuration.
//!
//! Loaded once at process start from `config.toml` in the data directory.
//! Every field has a default, so an empty or missing file describes a working
//! local setup.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::job::{NetworkContext, TaskTemplate};
use crate::notification::DEFAULT_SOURCE;
use crate::rule::Rule;

/// Environment variable carrying the bucket name into every task.
pub const BUCKET_ENV_VAR: &str = "ARRIVAL_BUCKET_NAME";

/// What the orchestrator does with a job whose deadline has passed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Ask the compute provider to kill the task.
    #[default]
    Terminate,
    /// Leave the task running; only the record is resolved.
    Abandon,
}

/// Top-level dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Project name used to derive resource names.
    #[serde(default = "default_project")]
    pub project: String,
    /// Deployment environment used to derive resource names.
    #[serde(default = "default_environment")]
    pub environment: String,
    /// First element of every invocation command.
    #[serde(default = "default_entry_path")]
    pub entry_path: String,
    /// Hard ceiling on a RUNNING execution, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub timeout_policy: TimeoutPolicy,
    /// Maximum RUNNING executions (None = unbounded).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_executions: Option<u32>,
    #[serde(default)]
    pub rule: Rule,
    #[serde(default)]
    pub task: TaskTemplate,
    #[serde(default)]
    pub network: NetworkContext,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ingress: IngressConfig,
}

/// Local object store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory holding one sub-directory per bucket
    /// (default `<data_dir>/buckets`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    /// Source tag stamped on notifications from the local store.
    #[serde(default = "default_storage_source")]
    pub source: String,
    /// Watch the bucket directory for writes while serving.
    #[serde(default)]
    pub watch: bool,
    /// Debounce window for the bucket watcher, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

/// HTTP notification ingress settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressConfig {
    /// Name of the environment variable holding the HMAC secret. When set,
    /// every ingress request must carry a valid signature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hmac_secret_env: Option<String>,
}

fn default_project() -> String {
    "arrival".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_entry_path() -> String {
    "/usr/src/app/lib/index.js".to_string()
}

fn default_timeout_secs() -> u64 {
    3600
}

fn default_storage_source() -> String {
    DEFAULT_SOURCE.to_string()
}

fn default_debounce_ms() -> u64 {
    500
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: None,
            source: default_storage_source(),
            watch: false,
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            project: default_project(),
            environment: default_environment(),
            entry_path: default_entry_path(),
            timeout_secs: default_timeout_secs(),
            timeout_policy: TimeoutPolicy::default(),
            max_concurrent_executions: None,
            rule: Rule::default(),
            task: TaskTemplate::default(),
            network: NetworkContext::default(),
            storage: StorageConfig::default(),
            ingress: IngressConfig::default(),
        }
    }
}

impl DispatcherConfig {
    /// `{project}-{environment}`, the prefix of every derived resource name.
    pub fn name_prefix(&self) -> String {
        format!("{}-{}", self.project, self.environment)
    }

    /// The bucket the dispatcher watches.
    pub fn bucket_name(&self) -> &str {
        &self.rule.bucket_name
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Fill derived values: the bucket name when unset and the bucket name
    /// variable in the task environment.
    pub fn resolve(mut self) -> Self {
        if self.rule.bucket_name.trim().is_empty() {
            self.rule.bucket_name = format!("{}-bucket", self.name_prefix());
        }
        self.task
            .environment
            .entry(BUCKET_ENV_VAR.to_string())
            .or_insert_with(|| self.rule.bucket_name.clone());
        self
    }

    /// Reject configurations the dispatcher cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.entry_path.trim().is_empty() {
            return Err(ConfigError::Invalid("entry_path must not be empty".into()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be greater than 0".into()));
        }
        if self.task.cpu == 0 {
            return Err(ConfigError::Invalid("task.cpu must be greater than 0".into()));
        }
        if self.task.memory_mib == 0 {
            return Err(ConfigError::Invalid(
                "task.memory_mib must be greater than 0".into(),
            ));
        }
        if self.task.program.trim().is_empty() {
            return Err(ConfigError::Invalid("task.program must not be empty".into()));
        }
        if self.max_concurrent_executions == Some(0) {
            return Err(ConfigError::Invalid(
                "max_concurrent_executions must be greater than 0 when set".into(),
            ));
        }
        if self.task.max_running == Some(0) {
            return Err(ConfigError::Invalid(
                "task.max_running must be greater than 0 when set".into(),
            ));
        }
        if self.rule.bucket_name.trim().is_empty() {
            return Err(ConfigError::Invalid("rule.bucket_name must not be empty".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
