//! Application state

use std::sync::Arc;

use tracing::{info, warn};

use ocb_core::agent::select_profile;
use ocb_core::task::TaskSpec;
use ocb_execution::{
    AdmissionController, ExecutionError, ExecutionRecord, ExecutionRegistry, StartOptions,
    WorkerConfig, WorkerSupervisor,
};

/// Shared application state
///
/// Owns the one registry / admission controller / supervisor trio for the
/// process; handlers and background loops all go through here.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    registry: Arc<ExecutionRegistry>,
    admission: AdmissionController,
    supervisor: Arc<WorkerSupervisor>,
}

impl AppState {
    pub fn new(max_concurrent: usize, worker: WorkerConfig) -> Self {
        let registry = Arc::new(ExecutionRegistry::new());
        let admission = AdmissionController::new(Arc::clone(&registry), max_concurrent);
        let supervisor = Arc::new(WorkerSupervisor::new(Arc::clone(&registry), worker));

        Self {
            inner: Arc::new(AppStateInner {
                registry,
                admission,
                supervisor,
            }),
        }
    }

    pub fn registry(&self) -> &ExecutionRegistry {
        &self.inner.registry
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.inner.admission
    }

    pub fn supervisor(&self) -> &Arc<WorkerSupervisor> {
        &self.inner.supervisor
    }

    /// Admit a task and hand it to the supervisor.
    ///
    /// On `CapacityExceeded` the task is already queued; the caller reports
    /// the soft failure.
    pub fn start_task(
        &self,
        task: TaskSpec,
        options: StartOptions,
    ) -> Result<ExecutionRecord, ExecutionError> {
        let profile = select_profile(options.agent_id.as_deref(), &task);
        let record = self.inner.admission.start(task.clone(), options)?;
        self.inner.supervisor.launch(record.id, task, profile);
        Ok(record)
    }

    /// Promote queued tasks while capacity allows.
    ///
    /// Called whenever a running slot frees up; each promotion re-enters the
    /// normal admission path.
    pub fn try_drain(&self) {
        while let Some(queued) = self.inner.admission.next_queued() {
            let task_id = queued.task.id.clone();
            let options = StartOptions {
                force: false,
                agent_id: queued.agent_id,
            };
            let profile = select_profile(options.agent_id.as_deref(), &queued.task);
            match self.inner.admission.start(queued.task.clone(), options) {
                Ok(record) => {
                    info!(execution_id = %record.id, task_id = %task_id, "promoted from queue");
                    self.inner.supervisor.launch(record.id, queued.task, profile);
                }
                Err(ExecutionError::CapacityExceeded { .. }) => {
                    // Lost the slot to a concurrent start; the entry is back
                    // on the queue, stop here.
                    break;
                }
                Err(e) => {
                    warn!(task_id = %task_id, "dropping queue entry: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocb_execution::ExecutionStatus;

    fn test_state(max_concurrent: usize) -> AppState {
        AppState::new(
            max_concurrent,
            WorkerConfig {
                program: "ocb-worker-that-does-not-exist".to_string(),
                ..WorkerConfig::default()
            },
        )
    }

    fn run(state: &AppState, execution_id: uuid::Uuid) {
        state
            .registry()
            .set_status(execution_id, ExecutionStatus::Starting)
            .unwrap();
        state
            .registry()
            .set_status(execution_id, ExecutionStatus::Running)
            .unwrap();
    }

    #[tokio::test]
    async fn drain_promotes_when_a_slot_frees() {
        let state = test_state(1);

        // Occupy the only slot without the supervisor in the way.
        let busy = state.registry().admit("task-busy", false, 1).unwrap();
        run(&state, busy.id);

        let err = state
            .start_task(TaskSpec::untitled("task-queued"), StartOptions::default())
            .unwrap_err();
        assert!(matches!(err, ExecutionError::CapacityExceeded { .. }));
        assert_eq!(state.admission().queue_state().queued.len(), 1);

        state.registry().complete(busy.id, None, None).unwrap();
        state.try_drain();

        assert!(state.admission().queue_state().queued.is_empty());
        let promoted = state.registry().get_by_task("task-queued").unwrap();
        assert!(promoted.is_active());
    }

    #[tokio::test]
    async fn drain_stops_while_capacity_is_full() {
        let state = test_state(1);
        let busy = state.registry().admit("task-busy", false, 1).unwrap();
        run(&state, busy.id);

        let _ = state.start_task(TaskSpec::untitled("task-queued"), StartOptions::default());
        state.try_drain();

        // Still occupied, still queued.
        assert_eq!(state.admission().queue_state().queued.len(), 1);
    }
}
