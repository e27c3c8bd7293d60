//! Health and engine status endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ApiState;
use crate::engines::{EngineStatus, probe_engines};

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
    pub uptime_secs: i64,
    pub extensions: usize,
    pub sessions: usize,
    pub agents: usize,
}

/// Build health router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/test", post(test_engines))
        .with_state(state)
}

/// Basic liveness check
async fn health(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    let now = Utc::now();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: now,
        uptime_secs: (now - state.started_at).num_seconds(),
        extensions: state.extensions.len(),
        sessions: state.sessions.len().await,
        agents: state.agents.count().await,
    })
}

/// Check that every external engine answers
async fn test_engines(State(state): State<Arc<ApiState>>) -> Json<EngineStatus> {
    let status = probe_engines(&state.config).await;
    if !status.all_ok() {
        tracing::warn!(?status, "some engines are unavailable");
    }
    Json(status)
}
