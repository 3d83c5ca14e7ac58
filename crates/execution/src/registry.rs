//! Execution registry: record store and waiting queue
//!
//! One mutex guards all state. Every mutation checks the transition table
//! and writes inside a single critical section, which is what makes the
//! dual completion paths (webhook vs process exit) safe: whichever applies
//! its terminal transition first wins, the other becomes a logged no-op.
//! Events are published before the lock is released, so subscribers see a
//! given execution's events in mutation order.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use ocb_core::task::{TaskPriority, TaskSpec};

use crate::error::{ExecutionError, Result};
use crate::event::{EventBus, EventKind, ExecutionEvent};
use crate::record::{ExecutionRecord, ExecutionStatus, LogEntry, LogKind};

/// Terminal records kept after pruning, most recent by completion time.
const KEEP_FINISHED: usize = 50;

/// A task waiting for a free slot.
///
/// Carries the full task payload so promotion can launch the worker without
/// going back to the board.
#[derive(Debug, Clone)]
pub struct QueuedExecution {
    pub task: TaskSpec,
    pub agent_id: Option<String>,
    pub priority: TaskPriority,
    pub queued_at: DateTime<Utc>,
}

/// Wire summary of one queue entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedSummary {
    pub task_id: String,
    pub priority: TaskPriority,
    pub queued_at: DateTime<Utc>,
}

impl From<&QueuedExecution> for QueuedSummary {
    fn from(q: &QueuedExecution) -> Self {
        Self {
            task_id: q.task.id.clone(),
            priority: q.priority,
            queued_at: q.queued_at,
        }
    }
}

/// Snapshot of admission state for clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueState {
    pub running: Vec<ExecutionRecord>,
    pub queued: Vec<QueuedSummary>,
    pub max_concurrent: usize,
}

#[derive(Default)]
struct RegistryInner {
    executions: HashMap<Uuid, ExecutionRecord>,
    /// Latest execution per task; active-or-not is decided by its status.
    by_task: HashMap<String, Uuid>,
    /// Ordered: priority rank, then FIFO within a rank.
    queue: Vec<QueuedExecution>,
}

/// In-memory store of execution records, task index, and waiting queue.
pub struct ExecutionRegistry {
    inner: Mutex<RegistryInner>,
    bus: EventBus,
    keep_finished: usize,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            bus: EventBus::new(),
            keep_finished: KEEP_FINISHED,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        // A poisoned lock means a panic mid-mutation; the records are plain
        // data, so continuing with them is still sound.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ------------------------------------------------------------------
    // Admission and lookups
    // ------------------------------------------------------------------

    /// Create a new pending execution for a task, enforcing the one-active-
    /// execution-per-task rule and the concurrency cap in one critical
    /// section.
    pub fn admit(&self, task_id: &str, force: bool, max_concurrent: usize) -> Result<ExecutionRecord> {
        let mut inner = self.lock();

        if let Some(existing) = inner
            .by_task
            .get(task_id)
            .and_then(|id| inner.executions.get(id))
        {
            if existing.is_active() && !force {
                return Err(ExecutionError::AlreadyRunning {
                    execution_id: existing.id,
                });
            }
        }

        let running = inner
            .executions
            .values()
            .filter(|e| e.status == ExecutionStatus::Running)
            .count();
        if running >= max_concurrent {
            return Err(ExecutionError::CapacityExceeded { max_concurrent });
        }

        let mut record = ExecutionRecord::new(task_id);
        record.push_log(LogEntry::new(
            LogKind::System,
            "Execution created, waiting to start...",
        ));

        inner.executions.insert(record.id, record.clone());
        inner.by_task.insert(task_id.to_string(), record.id);

        self.bus.publish(ExecutionEvent::started(&record));
        debug!(execution_id = %record.id, task_id, "execution admitted");

        Ok(record)
    }

    pub fn get(&self, execution_id: Uuid) -> Option<ExecutionRecord> {
        self.lock().executions.get(&execution_id).cloned()
    }

    pub fn get_by_task(&self, task_id: &str) -> Option<ExecutionRecord> {
        let inner = self.lock();
        inner
            .by_task
            .get(task_id)
            .and_then(|id| inner.executions.get(id))
            .cloned()
    }

    /// All non-terminal executions.
    pub fn active(&self) -> Vec<ExecutionRecord> {
        let mut active: Vec<_> = self
            .lock()
            .executions
            .values()
            .filter(|e| e.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|e| e.started_at);
        active
    }

    pub fn running_count(&self) -> usize {
        self.lock()
            .executions
            .values()
            .filter(|e| e.status == ExecutionStatus::Running)
            .count()
    }

    // ------------------------------------------------------------------
    // Guarded transitions
    // ------------------------------------------------------------------

    fn record_mut<'a>(
        inner: &'a mut RegistryInner,
        execution_id: Uuid,
    ) -> Result<&'a mut ExecutionRecord> {
        inner
            .executions
            .get_mut(&execution_id)
            .ok_or(ExecutionError::NotFound(execution_id))
    }

    fn guard(record: &ExecutionRecord, to: ExecutionStatus) -> Result<()> {
        if record.is_terminal() {
            return Err(ExecutionError::Terminal {
                status: record.status,
            });
        }
        if !record.status.can_transition(to) {
            return Err(ExecutionError::InvalidTransition {
                from: record.status,
                to,
            });
        }
        Ok(())
    }

    /// Non-terminal status move (`pending -> starting`, `starting -> running`,
    /// `running -> paused`). Terminal targets go through `complete`, `fail`,
    /// or `cancel`.
    pub fn set_status(&self, execution_id: Uuid, status: ExecutionStatus) -> Result<ExecutionRecord> {
        debug_assert!(!status.is_terminal());
        let mut inner = self.lock();
        let record = Self::record_mut(&mut inner, execution_id)?;
        Self::guard(record, status)?;

        record.status = status;
        record.touch();
        let snapshot = record.clone();

        self.bus
            .publish(ExecutionEvent::status_changed(&snapshot, status));
        Ok(snapshot)
    }

    /// Apply a progress value (clamped to 100) and optionally a step message.
    pub fn update_progress(
        &self,
        execution_id: Uuid,
        progress: u8,
        message: Option<&str>,
    ) -> Result<ExecutionRecord> {
        let mut inner = self.lock();
        let record = Self::record_mut(&mut inner, execution_id)?;
        if record.is_terminal() {
            return Err(ExecutionError::Terminal {
                status: record.status,
            });
        }

        record.progress = progress.min(100);
        record.touch();
        if let Some(message) = message {
            record.current_step = Some(message.to_string());
            let entry = LogEntry::new(LogKind::Progress, message);
            record.push_log(entry.clone());
            let snapshot = record.clone();
            self.bus.publish(ExecutionEvent::log_added(&snapshot, &entry));
        }
        let snapshot = record.clone();

        self.bus.publish(ExecutionEvent::progress(
            &snapshot,
            snapshot.progress,
            message,
        ));
        Ok(snapshot)
    }

    /// Append a log entry to an active execution.
    pub fn append_log(
        &self,
        execution_id: Uuid,
        kind: LogKind,
        message: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<LogEntry> {
        let mut inner = self.lock();
        let record = Self::record_mut(&mut inner, execution_id)?;
        if record.is_terminal() {
            return Err(ExecutionError::Terminal {
                status: record.status,
            });
        }

        let mut entry = LogEntry::new(kind, message);
        if let Some(metadata) = metadata {
            entry = entry.with_metadata(metadata);
        }
        record.push_log(entry.clone());
        record.touch();
        let snapshot = record.clone();

        self.bus.publish(ExecutionEvent::log_added(&snapshot, &entry));
        Ok(entry)
    }

    /// Idempotently record a completed subtask.
    pub fn mark_subtask(&self, execution_id: Uuid, subtask_id: &str) -> Result<ExecutionRecord> {
        let mut inner = self.lock();
        let record = Self::record_mut(&mut inner, execution_id)?;
        if record.is_terminal() {
            return Err(ExecutionError::Terminal {
                status: record.status,
            });
        }

        if record.add_completed_subtask(subtask_id) {
            record.touch();
            let entry = LogEntry::new(
                LogKind::Subtask,
                format!("Subtask completed: {}", subtask_id),
            )
            .with_metadata(serde_json::json!({ "subtaskId": subtask_id }));
            record.push_log(entry.clone());
            let snapshot = record.clone();
            self.bus.publish(ExecutionEvent::log_added(&snapshot, &entry));
            self.bus
                .publish(ExecutionEvent::subtask_complete(&snapshot, subtask_id));
            Ok(snapshot)
        } else {
            // Duplicate delivery; nothing to record.
            Ok(record.clone())
        }
    }

    /// Move a running execution to paused, storing the reviewer-facing notes.
    pub fn request_review(
        &self,
        execution_id: Uuid,
        review_notes: Option<&str>,
    ) -> Result<ExecutionRecord> {
        let mut inner = self.lock();
        let record = Self::record_mut(&mut inner, execution_id)?;
        Self::guard(record, ExecutionStatus::Paused)?;

        record.status = ExecutionStatus::Paused;
        record.result.review_notes = review_notes.map(String::from);
        record.touch();
        let entry = LogEntry::new(
            LogKind::System,
            format!(
                "Review requested: {}",
                review_notes.unwrap_or("No notes provided")
            ),
        );
        record.push_log(entry.clone());
        let snapshot = record.clone();

        self.bus.publish(ExecutionEvent::log_added(&snapshot, &entry));
        self.bus.publish(ExecutionEvent::new(
            EventKind::StatusChanged,
            snapshot.id,
            snapshot.task_id.clone(),
            serde_json::json!({
                "status": ExecutionStatus::Paused,
                "targetStatus": "review",
                "reviewNotes": snapshot.result.review_notes,
            }),
        ));
        Ok(snapshot)
    }

    /// Terminal success. Allowed from `running` and `paused`.
    pub fn complete(
        &self,
        execution_id: Uuid,
        summary: Option<&str>,
        review_notes: Option<&str>,
    ) -> Result<ExecutionRecord> {
        let mut inner = self.lock();
        let record = Self::record_mut(&mut inner, execution_id)?;
        Self::guard(record, ExecutionStatus::Completed)?;
        Self::finish_completed(record, &self.bus, summary, review_notes);
        Ok(record.clone())
    }

    /// Terminal failure. Allowed from every non-terminal status.
    pub fn fail(&self, execution_id: Uuid, error: &str) -> Result<ExecutionRecord> {
        let mut inner = self.lock();
        let record = Self::record_mut(&mut inner, execution_id)?;
        Self::guard(record, ExecutionStatus::Failed)?;
        Self::finish_failed(record, &self.bus, error);
        Ok(record.clone())
    }

    /// Cancel an active execution.
    pub fn cancel(&self, execution_id: Uuid) -> Result<ExecutionRecord> {
        let mut inner = self.lock();
        let record = Self::record_mut(&mut inner, execution_id)?;
        Self::guard(record, ExecutionStatus::Cancelled)?;

        record.status = ExecutionStatus::Cancelled;
        record.completed_at = Some(Utc::now());
        record.touch();
        let entry = LogEntry::new(LogKind::System, "Execution cancelled by user");
        record.push_log(entry.clone());
        let snapshot = record.clone();

        self.bus.publish(ExecutionEvent::log_added(&snapshot, &entry));
        self.bus.publish(ExecutionEvent::status_changed(
            &snapshot,
            ExecutionStatus::Cancelled,
        ));
        Ok(snapshot)
    }

    /// Resolve a worker process exit.
    ///
    /// Only acts while the record is still `running`; a webhook that already
    /// drove the execution to a terminal state (or to paused review) wins,
    /// and the exit becomes a logged no-op.
    pub fn resolve_exit(
        &self,
        execution_id: Uuid,
        exit_code: i32,
        error_detail: Option<&str>,
    ) -> Result<Option<ExecutionRecord>> {
        let mut inner = self.lock();
        let record = Self::record_mut(&mut inner, execution_id)?;

        if record.status != ExecutionStatus::Running {
            debug!(
                execution_id = %execution_id,
                status = %record.status,
                exit_code,
                "process exit ignored, execution no longer running"
            );
            return Ok(None);
        }

        if exit_code == 0 {
            Self::finish_completed(
                record,
                &self.bus,
                Some("Worker process completed"),
                None,
            );
        } else {
            let error = match error_detail {
                Some(detail) if !detail.is_empty() => detail.to_string(),
                _ => format!("Process exited with code {}", exit_code),
            };
            Self::finish_failed(record, &self.bus, &error);
        }
        Ok(Some(record.clone()))
    }

    fn finish_completed(
        record: &mut ExecutionRecord,
        bus: &EventBus,
        summary: Option<&str>,
        review_notes: Option<&str>,
    ) {
        record.status = ExecutionStatus::Completed;
        record.progress = 100;
        record.completed_at = Some(Utc::now());
        record.touch();
        if let Some(summary) = summary {
            record.result.summary = Some(summary.to_string());
        }
        if let Some(notes) = review_notes {
            record.result.review_notes = Some(notes.to_string());
        }
        let entry = LogEntry::new(
            LogKind::System,
            summary.unwrap_or("Execution completed successfully"),
        );
        record.push_log(entry.clone());

        bus.publish(ExecutionEvent::log_added(record, &entry));
        bus.publish(ExecutionEvent::completed(record));
    }

    fn finish_failed(record: &mut ExecutionRecord, bus: &EventBus, error: &str) {
        record.status = ExecutionStatus::Failed;
        record.error = Some(error.to_string());
        record.completed_at = Some(Utc::now());
        record.touch();
        let entry = LogEntry::new(LogKind::Error, format!("Execution failed: {}", error));
        record.push_log(entry.clone());

        bus.publish(ExecutionEvent::log_added(record, &entry));
        bus.publish(ExecutionEvent::failed(record, error));
    }

    // ------------------------------------------------------------------
    // Waiting queue
    // ------------------------------------------------------------------

    /// Queue a task for later admission. Re-queuing replaces the previous
    /// entry; ordering is priority rank first, FIFO within a rank.
    pub fn enqueue(&self, entry: QueuedExecution) {
        let mut inner = self.lock();
        inner.queue.retain(|q| q.task.id != entry.task.id);

        let position = inner
            .queue
            .iter()
            .position(|q| q.priority.rank() > entry.priority.rank())
            .unwrap_or(inner.queue.len());
        inner.queue.insert(position, entry);
    }

    /// Pop the highest-priority, oldest entry.
    pub fn pop_queued(&self) -> Option<QueuedExecution> {
        let mut inner = self.lock();
        if inner.queue.is_empty() {
            None
        } else {
            Some(inner.queue.remove(0))
        }
    }

    pub fn remove_queued(&self, task_id: &str) -> Option<QueuedExecution> {
        let mut inner = self.lock();
        let position = inner.queue.iter().position(|q| q.task.id == task_id)?;
        Some(inner.queue.remove(position))
    }

    pub fn queued(&self) -> Vec<QueuedSummary> {
        self.lock().queue.iter().map(QueuedSummary::from).collect()
    }

    pub fn queue_state(&self, max_concurrent: usize) -> QueueState {
        let inner = self.lock();
        QueueState {
            running: inner
                .executions
                .values()
                .filter(|e| e.status == ExecutionStatus::Running)
                .cloned()
                .collect(),
            queued: inner.queue.iter().map(QueuedSummary::from).collect(),
            max_concurrent,
        }
    }

    // ------------------------------------------------------------------
    // Housekeeping
    // ------------------------------------------------------------------

    /// Drop terminal records beyond the most recent `keep_finished`,
    /// ordered by completion time. Active records are never touched.
    pub fn prune_finished(&self) -> usize {
        let mut inner = self.lock();

        let mut finished: Vec<(Uuid, DateTime<Utc>)> = inner
            .executions
            .values()
            .filter(|e| e.is_terminal())
            .map(|e| (e.id, e.completed_at.unwrap_or(e.updated_at)))
            .collect();
        finished.sort_by(|a, b| b.1.cmp(&a.1));

        let stale: Vec<Uuid> = finished
            .into_iter()
            .skip(self.keep_finished)
            .map(|(id, _)| id)
            .collect();

        for id in &stale {
            if let Some(record) = inner.executions.remove(id) {
                // Only clear the task index if it still points here.
                if inner.by_task.get(&record.task_id) == Some(id) {
                    inner.by_task.remove(&record.task_id);
                }
            }
        }

        if !stale.is_empty() {
            warn!(pruned = stale.len(), "pruned old finished executions");
        }
        stale.len()
    }
}

impl Default for ExecutionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
