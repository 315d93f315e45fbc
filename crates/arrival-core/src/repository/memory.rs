//! In-memory execution repository.
//!
//! Backs tests and the binary's `--ephemeral` mode, where history does not
//! need to outlive the process.

use arrival_types::error::RepositoryError;
use arrival_types::execution::Execution;
use dashmap::DashMap;
use uuid::Uuid;

use super::SortOrder;
use super::execution::{ExecutionFilter, ExecutionRepository};

#[derive(Debug, Default)]
pub struct InMemoryExecutionRepository {
    executions: DashMap<Uuid, Execution>,
}

impl InMemoryExecutionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.executions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }

    fn sorted(&self, mut rows: Vec<Execution>, order: SortOrder) -> Vec<Execution> {
        rows.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        if order == SortOrder::Desc {
            rows.reverse();
        }
        rows
    }
}

impl ExecutionRepository for InMemoryExecutionRepository {
    async fn create(&self, execution: &Execution) -> Result<(), RepositoryError> {
        match self.executions.entry(execution.id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(RepositoryError::Conflict(
                format!("execution {} already exists", execution.id),
            )),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(execution.clone());
                Ok(())
            }
        }
    }

    async fn update(&self, execution: &Execution) -> Result<(), RepositoryError> {
        match self.executions.get_mut(&execution.id) {
            Some(existing) if existing.status.is_terminal() => Err(RepositoryError::Conflict(
                format!("execution {} is already {}", execution.id, existing.status.as_str()),
            )),
            Some(mut existing) => {
                *existing = execution.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn get(&self, id: &Uuid) -> Result<Option<Execution>, RepositoryError> {
        Ok(self.executions.get(id).map(|e| e.value().clone()))
    }

    async fn list(&self, filter: &ExecutionFilter) -> Result<Vec<Execution>, RepositoryError> {
        let rows: Vec<Execution> = self
            .executions
            .iter()
            .filter(|e| filter.accepts(e.value()))
            .map(|e| e.value().clone())
            .collect();
        let mut rows = self.sorted(rows, filter.sort_order.unwrap_or_default());
        if let Some(limit) = filter.limit {
            rows.truncate(limit.max(0) as usize);
        }
        Ok(rows)
    }

    async fn list_unfinished(&self) -> Result<Vec<Execution>, RepositoryError> {
        let rows = self
            .executions
            .iter()
            .filter(|e| !e.value().status.is_terminal())
            .map(|e| e.value().clone())
            .collect();
        Ok(self.sorted(rows, SortOrder::Asc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrival_types::execution::{ExecutionStatus, Invocation};

    fn pending(key: &str) -> Execution {
        Execution::pending(Invocation::new("/entry.js", key))
    }

    #[tokio::test]
    async fn create_get_update() {
        let repo = InMemoryExecutionRepository::new();
        let mut exec = pending("input/a.csv");
        repo.create(&exec).await.unwrap();

        exec.status = ExecutionStatus::Running;
        repo.update(&exec).await.unwrap();

        let loaded = repo.get(&exec.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ExecutionStatus::Running);
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn terminal_record_is_not_overwritten() {
        let repo = InMemoryExecutionRepository::new();
        let mut exec = pending("input/a.csv");
        repo.create(&exec).await.unwrap();

        exec.status = ExecutionStatus::TimedOut;
        repo.update(&exec).await.unwrap();

        let mut late = exec.clone();
        late.status = ExecutionStatus::Succeeded;
        assert!(matches!(
            repo.update(&late).await,
            Err(RepositoryError::Conflict(_))
        ));
        let loaded = repo.get(&exec.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ExecutionStatus::TimedOut);
    }

    #[tokio::test]
    async fn duplicate_create_conflicts() {
        let repo = InMemoryExecutionRepository::new();
        let exec = pending("input/a.csv");
        repo.create(&exec).await.unwrap();
        assert!(matches!(
            repo.create(&exec).await,
            Err(RepositoryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn update_missing_is_not_found() {
        let repo = InMemoryExecutionRepository::new();
        assert!(matches!(
            repo.update(&pending("input/a.csv")).await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn list_filters_and_limits() {
        let repo = InMemoryExecutionRepository::new();
        let first = pending("input/a.csv");
        let mut second = pending("input/b.csv");
        second.status = ExecutionStatus::Failed;
        let third = pending("input/a.csv");
        for e in [&first, &second, &third] {
            repo.create(e).await.unwrap();
        }

        let all = repo.list(&ExecutionFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, third.id, "newest first by default");

        let failed = repo
            .list(&ExecutionFilter::with_status(ExecutionStatus::Failed))
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, second.id);

        let by_key = repo
            .list(&ExecutionFilter {
                object_key: Some("input/a.csv".into()),
                sort_order: Some(SortOrder::Asc),
                limit: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_key.len(), 1);
        assert_eq!(by_key[0].id, first.id);

        let unfinished = repo.list_unfinished().await.unwrap();
        assert_eq!(unfinished.len(), 2);
        assert_eq!(unfinished[0].id, first.id);
    }
}
