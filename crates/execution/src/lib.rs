//! Execution engine for OpenClaw Board
//!
//! This crate owns the orchestration core: execution records and their
//! status state machine, the event bus, the in-memory registry (record
//! store plus waiting queue), admission control, the worker supervisor,
//! and the webhook reconciler.
//!
//! The registry is the single source of truth. Both completion paths
//! (webhook callbacks and process exit) mutate records through the same
//! guarded transitions, so neither can overwrite the other's outcome.

mod admission;
mod error;
mod event;
mod record;
mod registry;
mod supervisor;
mod webhook;

pub use admission::{AdmissionController, CancelOutcome, StartOptions};
pub use error::{ExecutionError, Result};
pub use event::{EventBus, EventKind, ExecutionEvent};
pub use record::{
    ExecutionRecord, ExecutionResult, ExecutionStatus, LogEntry, LogKind, MAX_LOG_ENTRIES,
};
pub use registry::{ExecutionRegistry, QueueState, QueuedExecution, QueuedSummary};
pub use supervisor::{WorkerConfig, WorkerSupervisor};
pub use webhook::{Reconciler, WebhookData, WebhookOutcome, WebhookPayload};
