//! Execution repository trait definition.

use arrival_types::error::RepositoryError;
use arrival_types::execution::{Execution, ExecutionStatus};
use uuid::Uuid;

use super::SortOrder;

/// Filter criteria for listing executions.
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    /// Only executions with this status.
    pub status: Option<ExecutionStatus>,
    /// Only executions for this exact object key.
    pub object_key: Option<String>,
    /// Creation-time order (default newest first).
    pub sort_order: Option<SortOrder>,
    /// Maximum number of results.
    pub limit: Option<i64>,
}

impl ExecutionFilter {
    pub fn with_status(status: ExecutionStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Whether `execution` passes the status and key criteria.
    pub fn accepts(&self, execution: &Execution) -> bool {
        self.status.is_none_or(|s| s == execution.status)
            && self
                .object_key
                .as_deref()
                .is_none_or(|k| execution.object_key() == Some(k))
    }
}

/// Repository trait for execution history.
///
/// Each record is written by exactly one orchestrator task, so updates are
/// whole-record replacements. A terminal record is final. Records are never deleted.
pub trait ExecutionRepository: Send + Sync {
    /// Insert a new execution. Fails with `Conflict` if the ID exists.
    fn create(
        &self,
        execution: &Execution,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Replace an existing execution. Fails with `NotFound` if absent and
    /// with `Conflict` if the stored record is already terminal.
    fn update(
        &self,
        execution: &Execution,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get an execution by ID.
    fn get(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Execution>, RepositoryError>> + Send;

    /// List executions matching `filter`.
    fn list(
        &self,
        filter: &ExecutionFilter,
    ) -> impl std::future::Future<Output = Result<Vec<Execution>, RepositoryError>> + Send;

    /// Executions still PENDING or RUNNING, oldest first.
    fn list_unfinished(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Execution>, RepositoryError>> + Send;
}
