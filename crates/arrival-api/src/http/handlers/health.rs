//! Liveness endpoint.

use std::time::Instant;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::http::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    pub bucket: String,
    pub key_prefix: String,
}

/// GET /api/v1/health
pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<Health>> {
    let start = Instant::now();
    let rule = state.dispatcher.matcher().rule();
    let health = Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        bucket: rule.bucket_name.clone(),
        key_prefix: rule.key_prefix.clone(),
    };
    Json(ApiResponse::success(health, start).with_link("executions", "/api/v1/executions"))
}
