//! Agent lifecycle and media-room join endpoints
//!
//! Agents are bookkeeping only: the streaming session over `/ws` does the
//! real work. Room tokens are mocked.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::post};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{ApiError, ApiState};

/// Token handed out by the mock join endpoint
pub const MOCK_TOKEN: &str = "mock-token";

/// Running agents keyed by channel name
#[derive(Debug, Clone, Default)]
pub struct Agents {
    inner: Arc<RwLock<HashMap<String, AgentInfo>>>,
}

impl Agents {
    /// Number of running agents
    pub async fn count(&self) -> usize {
        self.inner.read().await.len()
    }
}

/// A started agent
#[derive(Debug, Clone, Serialize)]
pub struct AgentInfo {
    pub channel_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_uid: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_type: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Build agent router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/agent/start", post(start_agent))
        .route("/agent/stop", post(stop_agent))
        .route("/livekit/join", post(join_room))
        .with_state(state)
}

/// Start agent request
#[derive(Debug, Deserialize)]
pub struct StartAgentRequest {
    #[serde(default)]
    pub channel_name: String,
    pub user_uid: Option<u64>,
    pub graph_name: Option<String>,
    pub language: Option<String>,
    pub voice_type: Option<String>,
}

/// Start agent response
#[derive(Debug, Serialize)]
pub struct StartAgentResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub agent: AgentInfo,
}

async fn start_agent(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<StartAgentRequest>,
) -> Result<Json<StartAgentResponse>, ApiError> {
    let channel_name = request.channel_name.trim();
    if channel_name.is_empty() {
        return Err(ApiError::BadRequest("No channel name provided"));
    }

    let agent = AgentInfo {
        channel_name: channel_name.to_string(),
        user_uid: request.user_uid,
        graph_name: request.graph_name,
        language: request.language,
        voice_type: request.voice_type,
        started_at: Utc::now(),
    };

    let replaced = state
        .agents
        .inner
        .write()
        .await
        .insert(agent.channel_name.clone(), agent.clone());
    tracing::info!(
        channel = %agent.channel_name,
        restarted = replaced.is_some(),
        "agent started"
    );

    Ok(Json(StartAgentResponse {
        status: "started",
        agent,
    }))
}

/// Stop agent request
#[derive(Debug, Deserialize)]
pub struct StopAgentRequest {
    #[serde(default)]
    pub channel_name: String,
}

/// Stop agent response
#[derive(Debug, Serialize)]
pub struct StopAgentResponse {
    pub status: &'static str,
    pub channel_name: String,
}

async fn stop_agent(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<StopAgentRequest>,
) -> Result<Json<StopAgentResponse>, ApiError> {
    let channel_name = request.channel_name.trim().to_string();
    let removed = state.agents.inner.write().await.remove(&channel_name);

    if removed.is_none() {
        return Err(ApiError::NotFound(format!(
            "No agent running on channel {channel_name}"
        )));
    }

    tracing::info!(channel = %channel_name, "agent stopped");
    Ok(Json(StopAgentResponse {
        status: "stopped",
        channel_name,
    }))
}

/// Room join request
#[derive(Debug, Default, Deserialize)]
pub struct JoinRequest {
    pub room: Option<String>,
    pub identity: Option<String>,
}

/// Room join response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    pub token: &'static str,
    pub ws_url: String,
}

async fn join_room(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<JoinRequest>,
) -> Json<JoinResponse> {
    tracing::debug!(room = ?request.room, identity = ?request.identity, "issuing mock room token");
    Json(JoinResponse {
        room: request.room,
        identity: request.identity,
        token: MOCK_TOKEN,
        ws_url: state.config.livekit_url.clone(),
    })
}
