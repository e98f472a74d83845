use crate::runner::Runner;
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tokio::sync::Mutex;

/// The mutex doubles as the run-in-progress guard: whoever holds it owns
/// the one allowed run. Overlapping triggers are rejected, not queued.
#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<Mutex<Runner>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/run", get(trigger_run).post(trigger_run))
        .fallback(alive)
        .with_state(state)
}

pub async fn serve(state: AppState, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Binding HTTP listener on {}", addr))?;
    tracing::info!("HTTP listener on {}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Runs one cycle synchronously. The ack is fixed: per-ad failures are
/// visible only in logs.
async fn trigger_run(State(state): State<AppState>) -> (StatusCode, &'static str) {
    let Ok(runner) = state.runner.try_lock() else {
        tracing::info!("Run already in progress, rejecting HTTP trigger");
        return (StatusCode::CONFLICT, "busy\n");
    };

    tracing::info!("HTTP-triggered run starting");
    if let Err(e) = runner.run_once().await {
        tracing::error!("HTTP-triggered run failed: {:#}", e);
    }
    (StatusCode::OK, "ok\n")
}

async fn alive() -> &'static str {
    "alive\n"
}
