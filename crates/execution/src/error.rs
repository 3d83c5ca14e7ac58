//! Error types for the execution engine

use thiserror::Error;
use uuid::Uuid;

use crate::record::ExecutionStatus;

/// Result type alias for execution operations
pub type Result<T> = std::result::Result<T, ExecutionError>;

/// Errors that can occur while orchestrating executions
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The task already has an active execution
    #[error("Task is already being executed")]
    AlreadyRunning { execution_id: Uuid },

    /// The concurrency cap is reached; the task was queued instead
    #[error("Maximum concurrent executions reached")]
    CapacityExceeded { max_concurrent: usize },

    /// No execution with this id
    #[error("Execution not found: {0}")]
    NotFound(Uuid),

    /// A required request field is missing or empty
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A request field is present but unusable
    #[error("Invalid field: {0}")]
    InvalidField(&'static str),

    /// The webhook's task id does not match the execution's
    #[error("Task ID mismatch for execution {execution_id}")]
    TaskMismatch { execution_id: Uuid },

    /// Webhook action string is not part of the protocol
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// The execution already reached a terminal status
    #[error("Execution is already {status}")]
    Terminal { status: ExecutionStatus },

    /// The state machine rejects this transition
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },

    /// Failed to spawn the worker process
    #[error("Failed to spawn worker: {message}")]
    SpawnFailed {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// The worker exceeded its wall-clock budget
    #[error("Worker timed out after {seconds} seconds")]
    Timeout { seconds: u64 },
}

impl ExecutionError {
    pub fn spawn_failed(message: impl Into<String>) -> Self {
        Self::SpawnFailed {
            message: message.into(),
            source: None,
        }
    }

    pub fn spawn_failed_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::SpawnFailed {
            message: message.into(),
            source: Some(source),
        }
    }
}
