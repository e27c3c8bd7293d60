//! Live session lookup shared across connections

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use super::actor::SessionHandle;

/// Map from session id to session handle
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, SessionHandle>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, handle: SessionHandle) {
        let id = handle.id();
        self.sessions.write().await.insert(id, handle);
        tracing::debug!(session_id = %id, "session registered");
    }

    pub async fn remove(&self, id: Uuid) -> Option<SessionHandle> {
        let removed = self.sessions.write().await.remove(&id);
        if removed.is_some() {
            tracing::debug!(session_id = %id, "session deregistered");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
