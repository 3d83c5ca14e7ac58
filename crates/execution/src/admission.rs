//! Admission control
//!
//! Gates how many executions may run concurrently. Exceeding the cap never
//! blocks the caller: the task lands on the waiting queue and the start
//! request returns immediately.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use ocb_core::task::TaskSpec;

use crate::error::{ExecutionError, Result};
use crate::record::ExecutionRecord;
use crate::registry::{ExecutionRegistry, QueueState, QueuedExecution};

/// Options on a start request.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Start even if the task already has an active execution.
    pub force: bool,
    /// Explicit agent selection; inferred from the task when absent.
    pub agent_id: Option<String>,
}

/// What a cancel request ended up doing.
#[derive(Debug, Clone)]
pub enum CancelOutcome {
    /// An active execution was cancelled.
    Cancelled(ExecutionRecord),
    /// The task was only waiting in the queue; the entry was removed.
    Dequeued,
    /// The execution had already finished.
    AlreadyFinished(ExecutionRecord),
    /// Nothing matched the request.
    NotFound,
}

/// Enforces the concurrency cap and owns queue admission.
pub struct AdmissionController {
    registry: Arc<ExecutionRegistry>,
    max_concurrent: usize,
}

impl AdmissionController {
    /// `max_concurrent` is the global cap on simultaneously running workers.
    pub fn new(registry: Arc<ExecutionRegistry>, max_concurrent: usize) -> Self {
        Self {
            registry,
            max_concurrent,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Whether a new execution would be admitted right now.
    pub fn can_admit(&self) -> bool {
        self.registry.running_count() < self.max_concurrent
    }

    /// Admit a task, or queue it when the cap is reached.
    ///
    /// On `CapacityExceeded` the task has been placed on the waiting queue
    /// before the error is returned; the caller reports the soft failure and
    /// moves on.
    pub fn start(&self, task: TaskSpec, options: StartOptions) -> Result<ExecutionRecord> {
        match self
            .registry
            .admit(&task.id, options.force, self.max_concurrent)
        {
            Ok(record) => {
                info!(execution_id = %record.id, task_id = %task.id, "execution admitted");
                Ok(record)
            }
            Err(ExecutionError::CapacityExceeded { max_concurrent }) => {
                self.registry.enqueue(QueuedExecution {
                    priority: task.priority,
                    agent_id: options.agent_id,
                    queued_at: Utc::now(),
                    task,
                });
                Err(ExecutionError::CapacityExceeded { max_concurrent })
            }
            Err(other) => Err(other),
        }
    }

    /// Cancel by task id: the active execution if there is one, otherwise
    /// the queue entry.
    pub fn cancel_task(&self, task_id: &str) -> CancelOutcome {
        if let Some(record) = self.registry.get_by_task(task_id) {
            return self.cancel_record(record.id);
        }
        if self.registry.remove_queued(task_id).is_some() {
            info!(task_id, "queued task removed before start");
            return CancelOutcome::Dequeued;
        }
        CancelOutcome::NotFound
    }

    /// Cancel a specific execution. Also clears any queue entry for the same
    /// task, so a cancelled task cannot be promoted right back.
    pub fn cancel_record(&self, execution_id: Uuid) -> CancelOutcome {
        match self.registry.cancel(execution_id) {
            Ok(record) => {
                self.registry.remove_queued(&record.task_id);
                CancelOutcome::Cancelled(record)
            }
            Err(ExecutionError::Terminal { .. }) => match self.registry.get(execution_id) {
                Some(record) => CancelOutcome::AlreadyFinished(record),
                None => CancelOutcome::NotFound,
            },
            Err(_) => CancelOutcome::NotFound,
        }
    }

    /// Pop the next queued task, but only when a slot is actually free.
    pub fn next_queued(&self) -> Option<QueuedExecution> {
        if !self.can_admit() {
            return None;
        }
        self.registry.pop_queued()
    }

    pub fn queue_state(&self) -> QueueState {
        self.registry.queue_state(self.max_concurrent)
    }
}
