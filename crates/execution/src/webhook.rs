//! Webhook reconciliation
//!
//! The worker runs in another process on its own clock; its callbacks arrive
//! here and get applied to the record they belong to. Late and duplicate
//! callbacks from a finished run are expected (the worker does not know it
//! lost the race with process exit), so terminal conflicts resolve to a
//! polite no-op rather than an error.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ExecutionError, Result};
use crate::record::LogKind;
use crate::registry::ExecutionRegistry;

/// Callback actions the worker may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookAction {
    ProgressUpdate,
    SubtaskComplete,
    Log,
    RequestReview,
    Complete,
    Error,
}

impl WebhookAction {
    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "progress_update" => Ok(Self::ProgressUpdate),
            "subtask_complete" => Ok(Self::SubtaskComplete),
            "log" => Ok(Self::Log),
            "request_review" => Ok(Self::RequestReview),
            "complete" => Ok(Self::Complete),
            "error" => Ok(Self::Error),
            other => Err(ExecutionError::UnknownAction(other.to_string())),
        }
    }
}

/// Action-specific payload fields; all optional at the wire level, required
/// ones are checked per action.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookData {
    pub progress: Option<f64>,
    pub message: Option<String>,
    pub subtask_id: Option<String>,
    pub review_notes: Option<String>,
    pub summary: Option<String>,
    pub error: Option<String>,
}

/// A callback as received from the worker.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub execution_id: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub data: WebhookData,
}

/// Result of applying a callback.
#[derive(Debug, Clone)]
pub struct WebhookOutcome {
    pub message: &'static str,
    /// UI routing hint: where the board should move the task.
    pub target_status: Option<&'static str>,
}

impl WebhookOutcome {
    fn new(message: &'static str) -> Self {
        Self {
            message,
            target_status: None,
        }
    }

    fn with_target(message: &'static str, target: &'static str) -> Self {
        Self {
            message,
            target_status: Some(target),
        }
    }
}

/// Applies worker callbacks to the registry.
pub struct Reconciler<'a> {
    registry: &'a ExecutionRegistry,
}

impl<'a> Reconciler<'a> {
    pub fn new(registry: &'a ExecutionRegistry) -> Self {
        Self { registry }
    }

    /// Validate and apply one callback.
    ///
    /// Errors map to caller mistakes (missing fields, unknown ids, unknown
    /// actions) or to the terminal-conflict case, which the HTTP layer
    /// reports as a successful no-op.
    pub fn apply(&self, payload: &WebhookPayload) -> Result<WebhookOutcome> {
        let task_id = required(payload.task_id.as_deref(), "taskId")?;
        let execution_raw = required(payload.execution_id.as_deref(), "executionId")?;
        let action_raw = required(payload.action.as_deref(), "action")?;

        let execution_id = Uuid::parse_str(execution_raw)
            .map_err(|_| ExecutionError::InvalidField("executionId"))?;
        let action = WebhookAction::from_str(action_raw)?;

        let record = self
            .registry
            .get(execution_id)
            .ok_or(ExecutionError::NotFound(execution_id))?;

        // A callback for the wrong task must not touch this record.
        if record.task_id != task_id {
            return Err(ExecutionError::TaskMismatch { execution_id });
        }

        if record.is_terminal() {
            debug!(
                execution_id = %execution_id,
                status = %record.status,
                ?action,
                "webhook for finished execution ignored"
            );
            return Err(ExecutionError::Terminal {
                status: record.status,
            });
        }

        let data = &payload.data;
        match action {
            WebhookAction::ProgressUpdate => {
                if let Some(progress) = data.progress {
                    let clamped = progress.clamp(0.0, 100.0) as u8;
                    self.registry
                        .update_progress(execution_id, clamped, data.message.as_deref())?;
                } else if let Some(message) = &data.message {
                    self.registry
                        .append_log(execution_id, LogKind::Progress, message, None)?;
                }
                Ok(WebhookOutcome::new("Progress updated"))
            }
            WebhookAction::SubtaskComplete => {
                let subtask_id = required(data.subtask_id.as_deref(), "subtaskId")?;
                self.registry.mark_subtask(execution_id, subtask_id)?;
                Ok(WebhookOutcome::new("Subtask marked as complete"))
            }
            WebhookAction::Log => {
                let message = required(data.message.as_deref(), "message")?;
                self.registry
                    .append_log(execution_id, LogKind::Info, message, None)?;
                Ok(WebhookOutcome::new("Log added"))
            }
            WebhookAction::RequestReview => {
                self.registry
                    .request_review(execution_id, data.review_notes.as_deref())?;
                info!(execution_id = %execution_id, "review requested");
                Ok(WebhookOutcome::with_target("Review requested", "review"))
            }
            WebhookAction::Complete => {
                self.registry
                    .complete(execution_id, data.summary.as_deref(), None)?;
                info!(execution_id = %execution_id, "completed via webhook");
                Ok(WebhookOutcome::with_target("Execution completed", "done"))
            }
            WebhookAction::Error => {
                let message = data.error.as_deref().unwrap_or("Unknown error");
                self.registry.fail(execution_id, message)?;
                Ok(WebhookOutcome::new("Error recorded"))
            }
        }
    }
}

fn required<'v>(value: Option<&'v str>, field: &'static str) -> Result<&'v str> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ExecutionError::MissingField(field)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ExecutionStatus;
    use serde_json::json;

    fn running_execution(registry: &ExecutionRegistry, task_id: &str) -> Uuid {
        let record = registry.admit(task_id, false, 10).unwrap();
        registry.set_status(record.id, ExecutionStatus::Starting).unwrap();
        registry.set_status(record.id, ExecutionStatus::Running).unwrap();
        record.id
    }

    fn payload(task_id: &str, execution_id: Uuid, action: &str, data: serde_json::Value) -> WebhookPayload {
        serde_json::from_value(json!({
            "taskId": task_id,
            "executionId": execution_id.to_string(),
            "action": action,
            "data": data,
        }))
        .unwrap()
    }

    #[test]
    fn rejects_missing_fields() {
        let registry = ExecutionRegistry::new();
        let reconciler = Reconciler::new(&registry);

        let bad: WebhookPayload =
            serde_json::from_value(json!({ "taskId": "task-1" })).unwrap();
        assert!(matches!(
            reconciler.apply(&bad),
            Err(ExecutionError::MissingField("executionId"))
        ));
    }

    #[test]
    fn rejects_task_id_mismatch() {
        let registry = ExecutionRegistry::new();
        let id = running_execution(&registry, "task-1");
        let reconciler = Reconciler::new(&registry);

        let err = reconciler
            .apply(&payload("task-2", id, "progress_update", json!({"progress": 10})))
            .unwrap_err();
        assert!(matches!(err, ExecutionError::TaskMismatch { .. }));
        // The record was not touched.
        assert_eq!(registry.get(id).unwrap().progress, 0);
    }

    #[test]
    fn rejects_unknown_action() {
        let registry = ExecutionRegistry::new();
        let id = running_execution(&registry, "task-1");
        let reconciler = Reconciler::new(&registry);

        let err = reconciler
            .apply(&payload("task-1", id, "celebrate", json!({})))
            .unwrap_err();
        assert!(matches!(err, ExecutionError::UnknownAction(_)));
    }

    #[test]
    fn unknown_execution_is_not_found() {
        let registry = ExecutionRegistry::new();
        let reconciler = Reconciler::new(&registry);
        let err = reconciler
            .apply(&payload("task-1", Uuid::new_v4(), "log", json!({"message": "hi"})))
            .unwrap_err();
        assert!(matches!(err, ExecutionError::NotFound(_)));
    }

    #[test]
    fn progress_update_applies_value_and_message() {
        let registry = ExecutionRegistry::new();
        let id = running_execution(&registry, "task-1");
        let reconciler = Reconciler::new(&registry);

        reconciler
            .apply(&payload(
                "task-1",
                id,
                "progress_update",
                json!({"progress": 50, "message": "halfway"}),
            ))
            .unwrap();

        let record = registry.get(id).unwrap();
        assert_eq!(record.progress, 50);
        assert_eq!(record.current_step.as_deref(), Some("halfway"));
    }

    #[test]
    fn duplicate_subtask_complete_is_idempotent() {
        let registry = ExecutionRegistry::new();
        let id = running_execution(&registry, "task-1");
        let reconciler = Reconciler::new(&registry);

        for _ in 0..2 {
            reconciler
                .apply(&payload(
                    "task-1",
                    id,
                    "subtask_complete",
                    json!({"subtaskId": "st-1"}),
                ))
                .unwrap();
        }

        let record = registry.get(id).unwrap();
        assert_eq!(record.result.completed_subtasks, vec!["st-1"]);
    }

    #[test]
    fn review_then_complete_keeps_both_result_fields() {
        let registry = ExecutionRegistry::new();
        let id = running_execution(&registry, "task-1");
        let reconciler = Reconciler::new(&registry);

        let review = reconciler
            .apply(&payload(
                "task-1",
                id,
                "request_review",
                json!({"reviewNotes": "check the migration"}),
            ))
            .unwrap();
        assert_eq!(review.target_status, Some("review"));
        assert_eq!(registry.get(id).unwrap().status, ExecutionStatus::Paused);

        let done = reconciler
            .apply(&payload(
                "task-1",
                id,
                "complete",
                json!({"summary": "all green"}),
            ))
            .unwrap();
        assert_eq!(done.target_status, Some("done"));

        let record = registry.get(id).unwrap();
        assert_eq!(record.status, ExecutionStatus::Completed);
        assert_eq!(record.result.review_notes.as_deref(), Some("check the migration"));
        assert_eq!(record.result.summary.as_deref(), Some("all green"));
    }

    #[test]
    fn error_action_fails_the_execution() {
        let registry = ExecutionRegistry::new();
        let id = running_execution(&registry, "task-1");
        let reconciler = Reconciler::new(&registry);

        reconciler
            .apply(&payload("task-1", id, "error", json!({"error": "no api key"})))
            .unwrap();

        let record = registry.get(id).unwrap();
        assert_eq!(record.status, ExecutionStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("no api key"));
        assert!(record.completed_at.is_some());
    }

    #[test]
    fn instruction_examples_are_accepted_by_the_reconciler() {
        use ocb_core::agent::{build_instructions, profile_by_id};
        use ocb_core::task::TaskSpec;

        let profile = profile_by_id("developer").unwrap();
        // One fresh running execution per example; each payload must validate
        // and apply from the running state it was written for.
        for i in 0..6 {
            let registry = ExecutionRegistry::new();
            let id = running_execution(&registry, "task-1");
            let text = build_instructions(
                profile,
                &TaskSpec::untitled("task-1"),
                &id.to_string(),
                "http://localhost:8080",
            );

            let block = text.split("```json\n").nth(i + 1).unwrap();
            let json = block.split("```").next().unwrap();
            let parsed: WebhookPayload = serde_json::from_str(json).unwrap();

            let outcome = Reconciler::new(&registry).apply(&parsed);
            assert!(outcome.is_ok(), "example {} rejected: {:?}", i, outcome.err());
        }
    }

    #[test]
    fn late_callback_after_completion_is_a_terminal_conflict() {
        let registry = ExecutionRegistry::new();
        let id = running_execution(&registry, "task-1");
        let reconciler = Reconciler::new(&registry);

        registry.complete(id, Some("done"), None).unwrap();
        let frozen = registry.get(id).unwrap();

        let err = reconciler
            .apply(&payload(
                "task-1",
                id,
                "progress_update",
                json!({"progress": 99}),
            ))
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Terminal { .. }));

        let after = registry.get(id).unwrap();
        assert_eq!(after.progress, frozen.progress);
        assert_eq!(after.updated_at, frozen.updated_at);
    }
}
