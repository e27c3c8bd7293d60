//! Server-to-client conversation events

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::voice::{TurnDecision, TurnState, VadResult};

/// Outgoing WebSocket message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    SessionStarted {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
    },
    Transcription {
        text: String,
        #[serde(rename = "sessionId")]
        session_id: Uuid,
    },
    VadResult {
        is_speech: bool,
        confidence: f64,
        rms: f64,
        #[serde(rename = "sessionId")]
        session_id: Uuid,
    },
    TurnResult {
        state: TurnState,
        confidence: f64,
        text: String,
        should_respond: bool,
        #[serde(rename = "sessionId")]
        session_id: Uuid,
    },
    LlmResponse {
        text: String,
        #[serde(rename = "sessionId")]
        session_id: Uuid,
    },
    /// Base64 raw PCM slice of synthesized speech
    TtsAudioChunk {
        audio: String,
        #[serde(rename = "sessionId")]
        session_id: Uuid,
    },
    TtsAudioEnd {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
    },
    SessionEnded {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
    },
    Error {
        message: String,
        #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
        session_id: Option<Uuid>,
    },
    /// Keep-alive reply
    Pong,
}

impl ServerEvent {
    /// Error not tied to any session
    #[must_use]
    pub fn connection_error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            session_id: None,
        }
    }
}

/// Session-scoped event emitter
///
/// Delivery fails silently once the transport is gone.
#[derive(Debug, Clone)]
pub struct EventSink {
    session_id: Uuid,
    tx: mpsc::Sender<ServerEvent>,
}

impl EventSink {
    #[must_use]
    pub const fn new(session_id: Uuid, tx: mpsc::Sender<ServerEvent>) -> Self {
        Self { session_id, tx }
    }

    #[must_use]
    pub const fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Queue an event, returning whether the transport accepted it
    pub async fn emit(&self, event: ServerEvent) -> bool {
        if self.tx.send(event).await.is_err() {
            tracing::trace!(session_id = %self.session_id, "transport closed, event dropped");
            return false;
        }
        true
    }

    pub async fn session_started(&self) -> bool {
        self.emit(ServerEvent::SessionStarted {
            session_id: self.session_id,
        })
        .await
    }

    pub async fn transcription(&self, text: &str) -> bool {
        self.emit(ServerEvent::Transcription {
            text: text.to_string(),
            session_id: self.session_id,
        })
        .await
    }

    pub async fn vad_result(&self, result: VadResult) -> bool {
        self.emit(ServerEvent::VadResult {
            is_speech: result.is_speech,
            confidence: result.confidence,
            rms: result.rms,
            session_id: self.session_id,
        })
        .await
    }

    pub async fn turn_result(&self, decision: TurnDecision, text: &str) -> bool {
        self.emit(ServerEvent::TurnResult {
            state: decision.state,
            confidence: decision.confidence,
            text: text.to_string(),
            should_respond: decision.should_respond(),
            session_id: self.session_id,
        })
        .await
    }

    pub async fn llm_response(&self, text: &str) -> bool {
        self.emit(ServerEvent::LlmResponse {
            text: text.to_string(),
            session_id: self.session_id,
        })
        .await
    }

    pub async fn audio_chunk(&self, pcm: &[u8]) -> bool {
        self.emit(ServerEvent::TtsAudioChunk {
            audio: STANDARD.encode(pcm),
            session_id: self.session_id,
        })
        .await
    }

    pub async fn audio_end(&self) -> bool {
        self.emit(ServerEvent::TtsAudioEnd {
            session_id: self.session_id,
        })
        .await
    }

    pub async fn session_ended(&self) -> bool {
        self.emit(ServerEvent::SessionEnded {
            session_id: self.session_id,
        })
        .await
    }

    pub async fn error(&self, message: impl Into<String>) -> bool {
        self.emit(ServerEvent::Error {
            message: message.into(),
            session_id: Some(self.session_id),
        })
        .await
    }
}
