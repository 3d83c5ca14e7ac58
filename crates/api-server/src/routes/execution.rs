//! Execution API endpoints
//!
//! Start and cancel requests plus queue visibility. Admission failures
//! (already running, capacity reached) are soft: HTTP 200 with
//! `success:false`, so the board can surface them without treating the
//! request as broken.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ocb_core::task::{Subtask, TaskPriority, TaskSpec};
use ocb_execution::{CancelOutcome, ExecutionError, QueueState, StartOptions};

use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartExecutionRequest {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartExecutionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StartExecutionResponse {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            execution_id: None,
            error: Some(error.into()),
            message: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelExecutionRequest {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub execution_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelExecutionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /execution/start - Admit a task and launch the worker
async fn start_execution(
    State(state): State<AppState>,
    Json(req): Json<StartExecutionRequest>,
) -> (StatusCode, Json<StartExecutionResponse>) {
    let Some(task_id) = req.task_id.filter(|id| !id.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(StartExecutionResponse::failure("Task ID is required")),
        );
    };

    let task = TaskSpec {
        id: task_id,
        title: req.title.unwrap_or_else(|| "Untitled Task".to_string()),
        description: req.description.unwrap_or_default(),
        priority: req.priority.unwrap_or_default(),
        subtasks: req.subtasks,
        tags: req.tags,
    };
    let options = StartOptions {
        force: req.force,
        agent_id: req.agent_id,
    };

    match state.start_task(task, options) {
        Ok(record) => (
            StatusCode::OK,
            Json(StartExecutionResponse {
                success: true,
                execution_id: Some(record.id),
                error: None,
                message: Some("Execution started".to_string()),
            }),
        ),
        Err(ExecutionError::AlreadyRunning { execution_id }) => (
            StatusCode::OK,
            Json(StartExecutionResponse {
                success: false,
                execution_id: Some(execution_id),
                error: Some("Task is already being executed".to_string()),
                message: None,
            }),
        ),
        Err(ExecutionError::CapacityExceeded { .. }) => (
            StatusCode::OK,
            Json(StartExecutionResponse {
                success: false,
                execution_id: None,
                error: Some("Maximum concurrent executions reached. Task queued.".to_string()),
                message: Some("Task has been added to the queue".to_string()),
            }),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(StartExecutionResponse::failure(e.to_string())),
        ),
    }
}

/// POST /execution/cancel - Cancel a live execution or dequeue a waiting task
async fn cancel_execution(
    State(state): State<AppState>,
    Json(req): Json<CancelExecutionRequest>,
) -> (StatusCode, Json<CancelExecutionResponse>) {
    if req.task_id.is_none() && req.execution_id.is_none() {
        return (
            StatusCode::BAD_REQUEST,
            Json(CancelExecutionResponse {
                success: false,
                message: None,
                error: Some("Task ID or Execution ID is required".to_string()),
            }),
        );
    }

    let outcome = match req.execution_id {
        Some(execution_id) => state.admission().cancel_record(execution_id),
        None => state
            .admission()
            .cancel_task(req.task_id.as_deref().unwrap_or_default()),
    };

    match outcome {
        CancelOutcome::Cancelled(record) => {
            // Reap the worker too; a late exit is absorbed by the guard.
            state.supervisor().abort(record.id);
            (
                StatusCode::OK,
                Json(CancelExecutionResponse {
                    success: true,
                    message: Some("Execution cancelled successfully".to_string()),
                    error: None,
                }),
            )
        }
        CancelOutcome::Dequeued => (
            StatusCode::OK,
            Json(CancelExecutionResponse {
                success: true,
                message: Some("Task removed from queue".to_string()),
                error: None,
            }),
        ),
        CancelOutcome::AlreadyFinished(record) => (
            StatusCode::OK,
            Json(CancelExecutionResponse {
                success: false,
                message: None,
                error: Some(format!(
                    "Cannot cancel execution with status: {}",
                    record.status
                )),
            }),
        ),
        CancelOutcome::NotFound => (
            StatusCode::NOT_FOUND,
            Json(CancelExecutionResponse {
                success: false,
                message: None,
                error: Some("Execution not found".to_string()),
            }),
        ),
    }
}

/// GET /execution/queue - Running and queued work
async fn queue_state(State(state): State<AppState>) -> Json<QueueState> {
    Json(state.admission().queue_state())
}

// ============================================================================
// Router
// ============================================================================

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/execution/start", post(start_execution))
        .route("/execution/cancel", post(cancel_execution))
        .route("/execution/queue", get(queue_state))
}
