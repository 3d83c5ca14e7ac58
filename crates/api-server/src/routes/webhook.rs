//! Worker webhook endpoint
//!
//! The external worker reports lifecycle events here. Caller mistakes map to
//! 400/404; a callback for an execution that already finished is answered
//! with HTTP 200 and `success:false`, because late and duplicate callbacks
//! are normal, not errors worth retrying.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;

use ocb_execution::{ExecutionError, Reconciler, WebhookPayload};

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_status: Option<String>,
}

/// POST /openclaw/webhook - Apply a worker callback
async fn handle_webhook(
    State(state): State<AppState>,
    Json(payload): Json<WebhookPayload>,
) -> (StatusCode, Json<WebhookResponse>) {
    let reconciler = Reconciler::new(state.registry());

    match reconciler.apply(&payload) {
        Ok(outcome) => (
            StatusCode::OK,
            Json(WebhookResponse {
                success: true,
                message: Some(outcome.message.to_string()),
                error: None,
                target_status: outcome.target_status.map(String::from),
            }),
        ),
        Err(e) => {
            let status = match &e {
                ExecutionError::MissingField(_)
                | ExecutionError::InvalidField(_)
                | ExecutionError::UnknownAction(_)
                | ExecutionError::TaskMismatch { .. } => StatusCode::BAD_REQUEST,
                ExecutionError::NotFound(_) => StatusCode::NOT_FOUND,
                // Idempotent no-op: the worker finished a race it could not
                // see; nothing to retry.
                ExecutionError::Terminal { .. } | ExecutionError::InvalidTransition { .. } => {
                    StatusCode::OK
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                Json(WebhookResponse {
                    success: false,
                    message: None,
                    error: Some(e.to_string()),
                    target_status: None,
                }),
            )
        }
    }
}

/// GET /openclaw/webhook - Protocol summary for humans and probes
async fn webhook_status() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ready",
        "endpoints": {
            "progress_update": "Update task progress",
            "subtask_complete": "Mark subtask as complete",
            "log": "Add log entry",
            "request_review": "Request human review",
            "complete": "Complete execution",
            "error": "Report error",
        }
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/openclaw/webhook", post(handle_webhook).get(webhook_status))
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::{
        body::{to_bytes, Body},
        http::Request,
    };
    use serde_json::Value;
    use tower::ServiceExt;
    use uuid::Uuid;

    use ocb_execution::{ExecutionStatus, WorkerConfig};

    fn build_state() -> AppState {
        AppState::new(
            2,
            WorkerConfig {
                program: "ocb-worker-that-does-not-exist".to_string(),
                ..WorkerConfig::default()
            },
        )
    }

    fn running_execution(state: &AppState, task_id: &str) -> Uuid {
        let record = state.registry().admit(task_id, false, 10).unwrap();
        state
            .registry()
            .set_status(record.id, ExecutionStatus::Starting)
            .unwrap();
        state
            .registry()
            .set_status(record.id, ExecutionStatus::Running)
            .unwrap();
        record.id
    }

    async fn post_webhook(state: AppState, body: Value) -> (StatusCode, Value) {
        let app = router().with_state(state);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/openclaw/webhook")
                    .header("Content-Type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn missing_fields_are_rejected() {
        let (status, body) = post_webhook(build_state(), json!({ "taskId": "task-1" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn progress_update_applies_and_acknowledges() {
        let state = build_state();
        let id = running_execution(&state, "task-1");

        let (status, body) = post_webhook(
            state.clone(),
            json!({
                "taskId": "task-1",
                "executionId": id.to_string(),
                "action": "progress_update",
                "data": { "progress": 50, "message": "halfway" }
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(state.registry().get(id).unwrap().progress, 50);
    }

    #[tokio::test]
    async fn unknown_execution_is_404() {
        let (status, body) = post_webhook(
            build_state(),
            json!({
                "taskId": "task-1",
                "executionId": Uuid::new_v4().to_string(),
                "action": "log",
                "data": { "message": "hello" }
            }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn complete_returns_done_target_hint() {
        let state = build_state();
        let id = running_execution(&state, "task-1");

        let (status, body) = post_webhook(
            state.clone(),
            json!({
                "taskId": "task-1",
                "executionId": id.to_string(),
                "action": "complete",
                "data": { "summary": "shipped" }
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["targetStatus"], "done");
        assert_eq!(
            state.registry().get(id).unwrap().status,
            ExecutionStatus::Completed
        );
    }

    #[tokio::test]
    async fn request_review_returns_review_target_hint() {
        let state = build_state();
        let id = running_execution(&state, "task-1");

        let (_, body) = post_webhook(
            state.clone(),
            json!({
                "taskId": "task-1",
                "executionId": id.to_string(),
                "action": "request_review",
                "data": { "reviewNotes": "verify the schema change" }
            }),
        )
        .await;

        assert_eq!(body["targetStatus"], "review");
        assert_eq!(
            state.registry().get(id).unwrap().status,
            ExecutionStatus::Paused
        );
    }

    #[tokio::test]
    async fn late_callback_is_http_ok_but_not_success() {
        let state = build_state();
        let id = running_execution(&state, "task-1");
        state.registry().complete(id, Some("done"), None).unwrap();

        let (status, body) = post_webhook(
            state,
            json!({
                "taskId": "task-1",
                "executionId": id.to_string(),
                "action": "complete",
                "data": { "summary": "again" }
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("already"));
    }

    #[tokio::test]
    async fn status_endpoint_reports_ready() {
        let app = router().with_state(build_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/openclaw/webhook")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ready");
    }
}
