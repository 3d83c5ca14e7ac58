//! Execution events and the fan-out bus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

use crate::record::{ExecutionRecord, ExecutionStatus, LogEntry};

/// Kind of execution event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ExecutionStarted,
    StatusChanged,
    ProgressUpdate,
    SubtaskComplete,
    LogAdded,
    ExecutionCompleted,
    ExecutionFailed,
}

/// A state change on its way to subscribers. Transient, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub execution_id: Uuid,
    pub task_id: String,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl ExecutionEvent {
    pub fn new(
        kind: EventKind,
        execution_id: Uuid,
        task_id: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            kind,
            execution_id,
            task_id: task_id.into(),
            timestamp: Utc::now(),
            data,
        }
    }

    pub fn started(record: &ExecutionRecord) -> Self {
        Self::new(
            EventKind::ExecutionStarted,
            record.id,
            record.task_id.clone(),
            json!({
                "status": record.status,
                "progress": record.progress,
                "currentStep": record.current_step,
            }),
        )
    }

    pub fn status_changed(record: &ExecutionRecord, status: ExecutionStatus) -> Self {
        Self::new(
            EventKind::StatusChanged,
            record.id,
            record.task_id.clone(),
            json!({ "status": status }),
        )
    }

    pub fn progress(record: &ExecutionRecord, progress: u8, message: Option<&str>) -> Self {
        Self::new(
            EventKind::ProgressUpdate,
            record.id,
            record.task_id.clone(),
            json!({ "progress": progress, "message": message }),
        )
    }

    pub fn subtask_complete(record: &ExecutionRecord, subtask_id: &str) -> Self {
        Self::new(
            EventKind::SubtaskComplete,
            record.id,
            record.task_id.clone(),
            json!({ "subtaskId": subtask_id }),
        )
    }

    pub fn log_added(record: &ExecutionRecord, entry: &LogEntry) -> Self {
        Self::new(
            EventKind::LogAdded,
            record.id,
            record.task_id.clone(),
            json!({ "log": entry }),
        )
    }

    pub fn completed(record: &ExecutionRecord) -> Self {
        Self::new(
            EventKind::ExecutionCompleted,
            record.id,
            record.task_id.clone(),
            json!({
                "summary": record.result.summary,
                "reviewNotes": record.result.review_notes,
            }),
        )
    }

    pub fn failed(record: &ExecutionRecord, error: &str) -> Self {
        Self::new(
            EventKind::ExecutionFailed,
            record.id,
            record.task_id.clone(),
            json!({ "error": error }),
        )
    }
}

/// Fan-out bus for execution events.
///
/// Built on a broadcast channel: publishing never waits on subscribers, and
/// a subscriber that falls behind loses events (observed as a lag on its
/// receiver) instead of slowing anyone else down. Per-execution ordering is
/// the publisher's responsibility; the registry publishes while holding its
/// lock, so events leave in mutation order.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
    published: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            published: AtomicU64::new(0),
        }
    }

    /// Open a new subscription; the receiver sees events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    /// Publish to all current subscribers. Having none is not an error.
    pub fn publish(&self, event: ExecutionEvent) {
        self.published.fetch_add(1, Ordering::Relaxed);
        trace!(kind = ?event.kind, execution_id = %event.execution_id, "publishing event");
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
