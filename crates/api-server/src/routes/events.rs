//! Execution event stream (SSE)
//!
//! A subscriber first gets a `connected` frame and one `execution_started`
//! frame per currently-active execution, then live events as the registry
//! publishes them. A comment heartbeat every 30 seconds keeps intermediaries
//! from cutting the connection. Subscribing happens before the snapshot is
//! taken, so nothing published in between can be missed (a frame may be
//! seen twice instead, which consumers already tolerate).

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use chrono::Utc;
use futures::stream::{self, Stream, StreamExt};
use serde_json::json;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

use ocb_execution::{EventKind, ExecutionEvent, ExecutionRegistry};

use crate::state::AppState;

/// Frames pushed to a subscriber before any live event.
fn snapshot_events(registry: &ExecutionRegistry) -> Vec<ExecutionEvent> {
    registry
        .active()
        .iter()
        .map(|record| ExecutionEvent {
            kind: EventKind::ExecutionStarted,
            execution_id: record.id,
            task_id: record.task_id.clone(),
            timestamp: record.started_at,
            data: json!({
                "status": record.status,
                "progress": record.progress,
                "currentStep": record.current_step,
            }),
        })
        .collect()
}

async fn execution_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.registry().bus().subscribe();

    let mut initial = vec![Event::default().data(
        json!({
            "type": "connected",
            "data": { "timestamp": Utc::now() },
        })
        .to_string(),
    )];
    for event in snapshot_events(state.registry()) {
        if let Ok(data) = serde_json::to_string(&event) {
            initial.push(Event::default().data(data));
        }
    }

    let live = BroadcastStream::new(receiver).filter_map(|result| async move {
        match result {
            Ok(event) => serde_json::to_string(&event)
                .ok()
                .map(|data| Event::default().data(data)),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(skipped, "event stream subscriber lagged");
                None
            }
        }
    });

    let stream = stream::iter(initial).chain(live).map(Ok::<Event, Infallible>);

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("heartbeat"),
    )
}

pub fn router() -> Router<AppState> {
    Router::new().route("/execution/events", get(execution_events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocb_execution::ExecutionStatus;

    #[test]
    fn snapshot_covers_active_executions_only() {
        let registry = ExecutionRegistry::new();
        let active = registry.admit("task-active", false, 10).unwrap();
        registry.set_status(active.id, ExecutionStatus::Starting).unwrap();
        let finished = registry.admit("task-finished", false, 10).unwrap();
        registry.cancel(finished.id).unwrap();

        let snapshot = snapshot_events(&registry);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].kind, EventKind::ExecutionStarted);
        assert_eq!(snapshot[0].task_id, "task-active");
        assert_eq!(snapshot[0].data["status"], "starting");
    }

    #[test]
    fn snapshot_carries_progress_and_step() {
        let registry = ExecutionRegistry::new();
        let record = registry.admit("task-1", false, 10).unwrap();
        registry.set_status(record.id, ExecutionStatus::Starting).unwrap();
        registry.set_status(record.id, ExecutionStatus::Running).unwrap();
        registry
            .update_progress(record.id, 42, Some("compiling"))
            .unwrap();

        let snapshot = snapshot_events(&registry);
        assert_eq!(snapshot[0].data["progress"], 42);
        assert_eq!(snapshot[0].data["currentStep"], "compiling");
    }
}
