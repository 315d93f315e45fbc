//! Notification ingress.
//!
//! Accepts a storage notification (flat or envelope form), optionally checks
//! its HMAC signature, and hands matching notifications to the orchestrator.
//! The response is `202 Accepted` whether or not the rule matched; the
//! execution itself resolves in the background.

use std::time::Instant;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use serde::Serialize;
use uuid::Uuid;

use arrival_infra::ingress::signature::{SIGNATURE_HEADER, SignatureError, verify_signature};
use arrival_types::notification::{Notification, NotificationPayload};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct NotificationReceipt {
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<Uuid>,
    /// First rule filter the notification failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// POST /api/v1/notifications
pub async fn receive_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<ApiResponse<NotificationReceipt>>), AppError> {
    let start = Instant::now();

    if let Some(secret) = &state.ingress_secret {
        headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(SignatureError::Missing)
            .and_then(|signature| verify_signature(secret, &body, signature))
            .map_err(|e| AppError::Unauthorized(e.to_string()))?;
    }

    let payload: NotificationPayload = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("invalid notification: {e}")))?;
    let notification = Notification::from(payload);

    let matcher = state.dispatcher.matcher();
    let Some(invocation) = matcher.match_notification(&notification) else {
        let reason = matcher.explain(&notification).err().map(|m| m.to_string());
        tracing::debug!(
            object_key = notification.object_key.as_str(),
            reason = reason.as_deref().unwrap_or_default(),
            "ingress notification dropped"
        );
        let receipt = NotificationReceipt {
            matched: false,
            execution_id: None,
            reason,
        };
        return Ok((StatusCode::ACCEPTED, Json(ApiResponse::success(receipt, start))));
    };

    let ticket = state.orchestrator().submit(invocation).await?;
    let execution_id = ticket.execution_id();

    let receipt = NotificationReceipt {
        matched: true,
        execution_id: Some(execution_id),
        reason: None,
    };
    let resp = ApiResponse::success(receipt, start)
        .with_link("execution", format!("/api/v1/executions/{execution_id}"));
    Ok((StatusCode::ACCEPTED, Json(resp)))
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::state::testing::state_with_script;
    use arrival_core::repository::execution::ExecutionRepository;
    use arrival_infra::ingress::signature::sign;
    use arrival_types::execution::ExecutionStatus;
    use axum::http::HeaderValue;
    use tempfile::TempDir;

    fn body(bucket: &str, key: &str, size: i64) -> Bytes {
        Bytes::from(
            serde_json::json!({
                "source": "aws.s3",
                "detailType": "Object Created",
                "bucket": { "name": bucket },
                "object": { "key": key, "size": size }
            })
            .to_string(),
        )
    }

    #[tokio::test]
    async fn matching_notification_creates_execution() {
        let tmp = TempDir::new().unwrap();
        let state = state_with_script(tmp.path(), "exit 0");

        let (status, Json(resp)) = receive_notification(
            State(state.clone()),
            HeaderMap::new(),
            body("arrival-dev-bucket", "input/foo.csv", 12),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::ACCEPTED);
        let receipt = resp.data.unwrap();
        assert!(receipt.matched);
        let id = receipt.execution_id.unwrap();
        assert_eq!(resp.links["execution"], format!("/api/v1/executions/{id}"));

        let execution = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let execution = state.executions().get(&id).await.unwrap().unwrap();
                if execution.status.is_terminal() {
                    return execution;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(execution.status, ExecutionStatus::Succeeded);
        assert_eq!(
            execution.input.command,
            vec!["/usr/src/app/lib/index.js", "input/foo.csv"]
        );
    }

    #[tokio::test]
    async fn non_matching_notification_is_accepted_without_execution() {
        let tmp = TempDir::new().unwrap();
        let state = state_with_script(tmp.path(), "exit 0");

        let (status, Json(resp)) = receive_notification(
            State(state.clone()),
            HeaderMap::new(),
            body("arrival-dev-bucket", "output/foo.csv", 12),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::ACCEPTED);
        let receipt = resp.data.unwrap();
        assert!(!receipt.matched);
        assert!(receipt.execution_id.is_none());
        assert!(receipt.reason.unwrap().contains("does not start with"));
        assert!(state.executions().list(&Default::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_body_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let state = state_with_script(tmp.path(), "exit 0");

        let err = receive_notification(State(state), HeaderMap::new(), Bytes::from("{}"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn signature_is_required_when_secret_configured() {
        let tmp = TempDir::new().unwrap();
        let state =
            state_with_script(tmp.path(), "exit 0").with_ingress_secret(Some(b"s3cret".to_vec()));
        let payload = body("arrival-dev-bucket", "input/a.csv", 1);

        let err = receive_notification(State(state.clone()), HeaderMap::new(), payload.clone())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.message(), "missing signature header");

        let mut headers = HeaderMap::new();
        let bad = sign(b"other", &payload).unwrap();
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&bad).unwrap());
        let err = receive_notification(State(state.clone()), headers, payload.clone())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let mut headers = HeaderMap::new();
        let good = sign(b"s3cret", &payload).unwrap();
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&good).unwrap());
        let (status, Json(resp)) = receive_notification(State(state), headers, payload)
            .await
            .unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(resp.data.unwrap().matched);
    }
}
