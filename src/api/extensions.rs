//! Extension listing

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};

use super::ApiState;
use crate::extensions::ExtensionInfo;

/// Build extensions router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/extensions", get(list_extensions))
        .with_state(state)
}

/// List discovered extensions with their manifests
async fn list_extensions(State(state): State<Arc<ApiState>>) -> Json<Vec<ExtensionInfo>> {
    Json(state.extensions.list().to_vec())
}
