//! API Server for OpenClaw Board
//!
//! Hosts the execution orchestration endpoints: start/cancel, the SSE event
//! stream, and the worker webhook. State is in-process; one registry,
//! admission controller, and supervisor live for the lifetime of the server.

mod routes;
mod state;

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ocb_execution::{EventKind, WorkerConfig};

use crate::state::AppState;

/// How often terminal records beyond the retention window are pruned.
const PRUNE_INTERVAL: Duration = Duration::from_secs(300);

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

/// Promote queued tasks whenever a running slot frees up.
fn spawn_queue_drain(state: AppState) {
    let mut receiver = state.registry().bus().subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let slot_freed = matches!(
                        event.kind,
                        EventKind::ExecutionCompleted | EventKind::ExecutionFailed
                    ) || (event.kind == EventKind::StatusChanged
                        && event.data["status"] == "cancelled");
                    if slot_freed {
                        state.try_drain();
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "drain loop lagged behind the event bus");
                    state.try_drain();
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Periodic housekeeping on the registry.
fn spawn_prune_loop(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PRUNE_INTERVAL);
        interval.tick().await; // first tick fires immediately
        loop {
            interval.tick().await;
            state.registry().prune_finished();
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api_server=debug,ocb_execution=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let port: u16 = env_or("OCB_PORT", 8080);
    let max_concurrent: usize = env_or("OCB_MAX_CONCURRENT", 2);
    let worker = WorkerConfig {
        program: std::env::var("OCB_WORKER_BIN").unwrap_or_else(|_| "openclaw".to_string()),
        callback_base: std::env::var("OCB_CALLBACK_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", port)),
        ..WorkerConfig::default()
    };

    tracing::info!(
        max_concurrent,
        worker = %worker.program,
        callback = %worker.callback_base,
        "starting execution core"
    );

    let state = AppState::new(max_concurrent, worker);
    spawn_queue_drain(state.clone());
    spawn_prune_loop(state.clone());

    let app = Router::new()
        .merge(routes::health::router())
        .merge(routes::execution::router())
        .merge(routes::events::router())
        .merge(routes::webhook::router())
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .await
        .context("server error")?;

    Ok(())
}
