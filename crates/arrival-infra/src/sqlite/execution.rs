//! SQLite execution repository implementation.
//!
//! Implements `ExecutionRepository` from `arrival-core`. The invocation
//! command is stored as a JSON array; the object key is denormalized into its
//! own column for filtering. Timestamps are RFC 3339 with fixed nanosecond
//! precision so that text ordering equals time ordering.

use arrival_core::repository::SortOrder;
use arrival_core::repository::execution::{ExecutionFilter, ExecutionRepository};
use arrival_types::error::RepositoryError;
use arrival_types::execution::{Execution, ExecutionStatus, Invocation};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ExecutionRepository`.
pub struct SqliteExecutionRepository {
    pool: DatabasePool,
}

impl SqliteExecutionRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row type
// ---------------------------------------------------------------------------

struct ExecutionRow {
    id: String,
    status: String,
    command: String,
    created_at: String,
    started_at: Option<String>,
    ended_at: Option<String>,
    job_id: Option<String>,
    exit_code: Option<i64>,
    failure_detail: Option<String>,
}

impl ExecutionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            status: row.try_get("status")?,
            command: row.try_get("command")?,
            created_at: row.try_get("created_at")?,
            started_at: row.try_get("started_at")?,
            ended_at: row.try_get("ended_at")?,
            job_id: row.try_get("job_id")?,
            exit_code: row.try_get("exit_code")?,
            failure_detail: row.try_get("failure_detail")?,
        })
    }

    fn into_execution(self) -> Result<Execution, RepositoryError> {
        let id = self
            .id
            .parse::<Uuid>()
            .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))?;
        let status: ExecutionStatus = self
            .status
            .parse()
            .map_err(|_| RepositoryError::Query(format!("invalid status: {}", self.status)))?;
        let command: Vec<String> = serde_json::from_str(&self.command)
            .map_err(|e| RepositoryError::Query(format!("invalid command JSON: {e}")))?;
        let exit_code = self
            .exit_code
            .map(|c| {
                i32::try_from(c)
                    .map_err(|_| RepositoryError::Query(format!("exit code out of range: {c}")))
            })
            .transpose()?;

        Ok(Execution {
            id,
            status,
            input: Invocation { command },
            created_at: parse_datetime(&self.created_at)?,
            started_at: self.started_at.as_deref().map(parse_datetime).transpose()?,
            ended_at: self.ended_at.as_deref().map(parse_datetime).transpose()?,
            job_id: self.job_id,
            exit_code,
            failure_detail: self.failure_detail,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn rows_to_executions(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<Execution>, RepositoryError> {
    let mut executions = Vec::with_capacity(rows.len());
    for row in rows {
        let r = ExecutionRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
        executions.push(r.into_execution()?);
    }
    Ok(executions)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

// ---------------------------------------------------------------------------
// ExecutionRepository
// ---------------------------------------------------------------------------

impl ExecutionRepository for SqliteExecutionRepository {
    async fn create(&self, execution: &Execution) -> Result<(), RepositoryError> {
        let command = serde_json::to_string(&execution.input.command)
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO executions
               (id, status, command, object_key, created_at, started_at, ended_at,
                job_id, exit_code, failure_detail)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(execution.id.to_string())
        .bind(execution.status.as_str())
        .bind(&command)
        .bind(execution.object_key())
        .bind(format_datetime(&execution.created_at))
        .bind(execution.started_at.as_ref().map(format_datetime))
        .bind(execution.ended_at.as_ref().map(format_datetime))
        .bind(&execution.job_id)
        .bind(execution.exit_code)
        .bind(&execution.failure_detail)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RepositoryError::Conflict(format!("execution {} already exists", execution.id))
            } else {
                RepositoryError::Query(e.to_string())
            }
        })?;

        Ok(())
    }

    async fn update(&self, execution: &Execution) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE executions
               SET status = ?, started_at = ?, ended_at = ?, job_id = ?,
                   exit_code = ?, failure_detail = ?
               WHERE id = ? AND status IN ('pending', 'running')"#,
        )
        .bind(execution.status.as_str())
        .bind(execution.started_at.as_ref().map(format_datetime))
        .bind(execution.ended_at.as_ref().map(format_datetime))
        .bind(&execution.job_id)
        .bind(execution.exit_code)
        .bind(&execution.failure_detail)
        .bind(execution.id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            let exists: Option<(String,)> =
                sqlx::query_as("SELECT status FROM executions WHERE id = ?")
                    .bind(execution.id.to_string())
                    .fetch_optional(&self.pool.writer)
                    .await
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
            return Err(match exists {
                Some((status,)) => RepositoryError::Conflict(format!(
                    "execution {} is already {status}",
                    execution.id
                )),
                None => RepositoryError::NotFound,
            });
        }
        Ok(())
    }

    async fn get(&self, id: &Uuid) -> Result<Option<Execution>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM executions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = ExecutionRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_execution()?))
            }
            None => Ok(None),
        }
    }

    async fn list(&self, filter: &ExecutionFilter) -> Result<Vec<Execution>, RepositoryError> {
        let mut sql = String::from("SELECT * FROM executions");
        let mut conditions: Vec<&str> = Vec::new();

        if filter.status.is_some() {
            conditions.push("status = ?");
        }
        if filter.object_key.is_some() {
            conditions.push("object_key = ?");
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        let order = match filter.sort_order.unwrap_or_default() {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        sql.push_str(&format!(" ORDER BY created_at {order}, id {order}"));

        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit.max(0)));
        }

        let mut query = sqlx::query(&sql);
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(key) = &filter.object_key {
            query = query.bind(key.as_str());
        }

        let rows = query
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        rows_to_executions(&rows)
    }

    async fn list_unfinished(&self) -> Result<Vec<Execution>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM executions WHERE status IN ('pending', 'running') ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
        rows_to_executions(&rows)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
