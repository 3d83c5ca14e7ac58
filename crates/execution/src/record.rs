//! Execution records and the status state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on retained log entries per execution; oldest are evicted.
pub const MAX_LOG_ENTRIES: usize = 200;

/// Status of an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Admitted, worker not yet spawned
    Pending,
    /// Worker process is being spawned
    Starting,
    /// Worker is executing
    Running,
    /// Worker asked for human review
    Paused,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
    /// Stopped on request
    Cancelled,
}

impl ExecutionStatus {
    /// Terminal statuses are sinks: no transition leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// An active execution counts toward the one-per-task invariant.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether a cancel request can take effect from this status.
    pub fn is_cancellable(&self) -> bool {
        self.is_active()
    }

    /// The transition table. `Running -> Running` is allowed so progress
    /// updates pass the same guard as everything else.
    pub fn can_transition(&self, to: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        match (self, to) {
            (Pending, Starting) => true,
            (Pending, Failed) | (Pending, Cancelled) => true,
            (Starting, Running) => true,
            (Starting, Failed) | (Starting, Cancelled) => true,
            (Running, Running) => true,
            (Running, Paused) => true,
            (Running, Completed) | (Running, Failed) | (Running, Cancelled) => true,
            (Paused, Completed) | (Paused, Failed) | (Paused, Cancelled) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Info,
    Progress,
    Subtask,
    Error,
    System,
}

/// One immutable log line on an execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl LogEntry {
    pub fn new(kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
            message: message.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Structured outcome accumulated over a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_notes: Option<String>,
    /// Set semantics: insertion order kept, duplicates ignored.
    #[serde(default)]
    pub completed_subtasks: Vec<String>,
}

/// One attempt to run a task through the worker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub task_id: String,
    pub status: ExecutionStatus,
    /// 0-100, last write wins
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub logs: Vec<LogEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub result: ExecutionResult,
}

impl ExecutionRecord {
    pub fn new(task_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            task_id: task_id.into(),
            status: ExecutionStatus::Pending,
            progress: 0,
            current_step: None,
            started_at: now,
            updated_at: now,
            completed_at: None,
            logs: Vec::new(),
            error: None,
            result: ExecutionResult::default(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Append a log entry, evicting the oldest beyond the cap.
    pub(crate) fn push_log(&mut self, entry: LogEntry) {
        self.logs.push(entry);
        if self.logs.len() > MAX_LOG_ENTRIES {
            let excess = self.logs.len() - MAX_LOG_ENTRIES;
            self.logs.drain(..excess);
        }
    }

    /// Idempotent insert into the completed-subtask set.
    pub(crate) fn add_completed_subtask(&mut self, subtask_id: &str) -> bool {
        if self
            .result
            .completed_subtasks
            .iter()
            .any(|s| s == subtask_id)
        {
            return false;
        }
        self.result.completed_subtasks.push(subtask_id.to_string());
        true
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
