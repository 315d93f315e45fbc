//! Read-only execution history handlers.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use uuid::Uuid;

use arrival_core::repository::SortOrder;
use arrival_core::repository::execution::{ExecutionFilter, ExecutionRepository};
use arrival_types::execution::{Execution, ExecutionStatus};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

/// Query parameters for `GET /api/v1/executions`.
#[derive(Debug, Default, Deserialize)]
pub struct ExecutionListQuery {
    pub status: Option<String>,
    pub key: Option<String>,
    /// `asc` or `desc` (default) by creation time.
    pub order: Option<String>,
    pub limit: Option<i64>,
}

impl ExecutionListQuery {
    fn into_filter(self) -> Result<ExecutionFilter, AppError> {
        let status = self
            .status
            .as_deref()
            .map(str::parse::<ExecutionStatus>)
            .transpose()
            .map_err(AppError::Validation)?;

        let sort_order = match self.order.as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("desc") => SortOrder::Desc,
            Some("asc") => SortOrder::Asc,
            Some(other) => {
                return Err(AppError::Validation(format!(
                    "unknown order '{other}', expected asc or desc"
                )));
            }
        };

        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(AppError::Validation(format!(
                "limit must be between 1 and {MAX_LIMIT}"
            )));
        }

        Ok(ExecutionFilter {
            status,
            object_key: self.key,
            sort_order: Some(sort_order),
            limit: Some(limit),
        })
    }
}

/// GET /api/v1/executions
pub async fn list_executions(
    State(state): State<AppState>,
    Query(query): Query<ExecutionListQuery>,
) -> Result<Json<ApiResponse<Vec<Execution>>>, AppError> {
    let start = Instant::now();
    let filter = query.into_filter()?;
    let executions = state.executions().list(&filter).await?;
    Ok(Json(
        ApiResponse::success(executions, start).with_link("self", "/api/v1/executions"),
    ))
}

/// GET /api/v1/executions/{id}
pub async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Execution>>, AppError> {
    let start = Instant::now();
    let id: Uuid = id
        .parse()
        .map_err(|_| AppError::Validation(format!("'{id}' is not an execution id")))?;

    let execution = state
        .executions()
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("execution {id} not found")))?;

    Ok(Json(
        ApiResponse::success(execution, start)
            .with_link("self", format!("/api/v1/executions/{id}"))
            .with_link("executions", "/api/v1/executions"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::state_with_script;
    use arrival_types::execution::Invocation;
    use axum::http::StatusCode;
    use tempfile::TempDir;

    async fn seed(state: &AppState, key: &str, status: ExecutionStatus) -> Execution {
        let mut execution = Execution::pending(Invocation::new("/app/index.js", key));
        execution.status = status;
        state.executions().create(&execution).await.unwrap();
        execution
    }

    #[tokio::test]
    async fn list_filters_by_status_and_key() {
        let tmp = TempDir::new().unwrap();
        let state = state_with_script(tmp.path(), "exit 0");
        seed(&state, "input/a.csv", ExecutionStatus::Succeeded).await;
        seed(&state, "input/b.csv", ExecutionStatus::Failed).await;
        seed(&state, "input/a.csv", ExecutionStatus::Failed).await;

        let Json(resp) = list_executions(
            State(state.clone()),
            Query(ExecutionListQuery {
                status: Some("failed".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(resp.data.unwrap().len(), 2);

        let Json(resp) = list_executions(
            State(state.clone()),
            Query(ExecutionListQuery {
                status: Some("FAILED".into()),
                key: Some("input/a.csv".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        let data = resp.data.unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].object_key(), Some("input/a.csv"));
    }

    #[tokio::test]
    async fn list_orders_and_limits() {
        let tmp = TempDir::new().unwrap();
        let state = state_with_script(tmp.path(), "exit 0");
        let first = seed(&state, "input/1", ExecutionStatus::Succeeded).await;
        seed(&state, "input/2", ExecutionStatus::Succeeded).await;
        let last = seed(&state, "input/3", ExecutionStatus::Succeeded).await;

        let Json(resp) = list_executions(State(state.clone()), Query(Default::default()))
            .await
            .unwrap();
        assert_eq!(resp.data.unwrap()[0].id, last.id);

        let Json(resp) = list_executions(
            State(state),
            Query(ExecutionListQuery {
                order: Some("asc".into()),
                limit: Some(1),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        let data = resp.data.unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].id, first.id);
    }

    #[tokio::test]
    async fn bad_query_is_a_validation_error() {
        let tmp = TempDir::new().unwrap();
        let state = state_with_script(tmp.path(), "exit 0");
        for query in [
            ExecutionListQuery {
                status: Some("done".into()),
                ..Default::default()
            },
            ExecutionListQuery {
                order: Some("sideways".into()),
                ..Default::default()
            },
            ExecutionListQuery {
                limit: Some(0),
                ..Default::default()
            },
        ] {
            let err = list_executions(State(state.clone()), Query(query))
                .await
                .unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn get_by_id() {
        let tmp = TempDir::new().unwrap();
        let state = state_with_script(tmp.path(), "exit 0");
        let execution = seed(&state, "input/a.csv", ExecutionStatus::Running).await;

        let Json(resp) = get_execution(State(state.clone()), Path(execution.id.to_string()))
            .await
            .unwrap();
        assert_eq!(resp.data.unwrap().status, ExecutionStatus::Running);

        let err = get_execution(State(state.clone()), Path(Uuid::now_v7().to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = get_execution(State(state), Path("nope".into()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
