//! Application error type mapping to HTTP status codes and the envelope.

use std::time::Instant;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use arrival_core::orchestrator::OrchestratorError;
use arrival_types::error::RepositoryError;

use crate::http::response::ApiResponse;

#[derive(Debug)]
pub enum AppError {
    /// Execution history failure.
    Repository(RepositoryError),
    /// The orchestrator refused or lost an execution.
    Orchestrator(OrchestratorError),
    NotFound(String),
    /// Missing or invalid ingress signature.
    Unauthorized(String),
    Validation(String),
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        AppError::Repository(e)
    }
}

impl From<OrchestratorError> for AppError {
    fn from(e: OrchestratorError) -> Self {
        AppError::Orchestrator(e)
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Repository(RepositoryError::NotFound) | AppError::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            AppError::Repository(RepositoryError::Conflict(_)) => StatusCode::CONFLICT,
            AppError::Orchestrator(OrchestratorError::InvalidInvocation)
            | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Repository(_) | AppError::Orchestrator(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Repository(RepositoryError::NotFound) | AppError::NotFound(_) => "NOT_FOUND",
            AppError::Repository(RepositoryError::Conflict(_)) => "CONFLICT",
            AppError::Repository(_) => "REPOSITORY_ERROR",
            AppError::Orchestrator(OrchestratorError::InvalidInvocation)
            | AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Orchestrator(_) => "DISPATCH_ERROR",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
        }
    }

    pub fn message(&self) -> String {
        match self {
            AppError::Repository(e) => e.to_string(),
            AppError::Orchestrator(e) => e.to_string(),
            AppError::NotFound(msg) | AppError::Unauthorized(msg) | AppError::Validation(msg) => {
                msg.clone()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.message(), "request failed");
        }
        let body = ApiResponse::error(self.code(), self.message(), Instant::now());
        (status, Json(body)).into_response()
    }
}
