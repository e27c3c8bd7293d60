//! WebSocket transport for streaming voice sessions

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use super::ApiState;
use crate::session::{ServerEvent, SessionHandle};

/// Capacity of the per-connection outgoing event queue
const EVENT_BUFFER: usize = 256;

/// How long a restart waits for the previous session to drain
const RESTART_WAIT: Duration = Duration::from_secs(10);

/// Incoming WebSocket message from client
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsIncoming {
    /// Open a new streaming session, ending any current one
    StartAudioSession,
    /// Base64 raw 16kHz mono 16-bit PCM
    AudioChunk { audio: String },
    /// Flush buffered audio and close the session once it settles
    EndAudioSession,
    /// Ping to keep connection alive
    Ping,
}

/// Build WebSocket router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new().route("/ws", get(ws_upgrade)).with_state(state)
}

/// Handle WebSocket upgrade request
async fn ws_upgrade(
    State(state): State<Arc<ApiState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<ApiState>) {
    let (mut sender, mut receiver) = socket.split();

    // Channel shared by this connection and every session it starts
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(EVENT_BUFFER);

    // Spawn task to forward events from channel to WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(text) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::error!(error = %e, "failed to serialize event"),
            }
        }
    });

    tracing::info!("voice connection opened");
    let mut connection = Connection::new(state, tx);

    loop {
        tokio::select! {
            _ = &mut send_task => {
                tracing::debug!("client stopped accepting events");
                break;
            }
            message = receiver.next() => match message {
                Some(Ok(message)) => {
                    if !connection.handle(message).await {
                        break;
                    }
                }
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "websocket receive failed");
                    break;
                }
                None => break,
            }
        }
    }

    connection.close().await;
    send_task.abort();
    tracing::info!("voice connection closed");
}

/// Per-connection state: at most one active session
struct Connection {
    state: Arc<ApiState>,
    tx: mpsc::Sender<ServerEvent>,
    current: Option<SessionHandle>,
}

impl Connection {
    const fn new(state: Arc<ApiState>, tx: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            state,
            tx,
            current: None,
        }
    }

    /// Process one frame; `false` once the client has closed
    async fn handle(&mut self, message: Message) -> bool {
        match message {
            Message::Text(text) => self.on_text(text.as_str()).await,
            Message::Binary(bytes) => self.on_audio(bytes.to_vec()).await,
            Message::Ping(_) | Message::Pong(_) => {
                // Handled by axum automatically
            }
            Message::Close(_) => return false,
        }
        true
    }

    async fn on_text(&mut self, text: &str) {
        let incoming = match serde_json::from_str::<WsIncoming>(text) {
            Ok(incoming) => incoming,
            Err(e) => {
                tracing::debug!(error = %e, "unparsable client frame");
                self.reply(ServerEvent::connection_error(format!("Invalid message: {e}")))
                    .await;
                return;
            }
        };

        match incoming {
            WsIncoming::StartAudioSession => self.start_session().await,
            WsIncoming::AudioChunk { audio } => match STANDARD.decode(audio.as_bytes()) {
                Ok(pcm) => self.on_audio(pcm).await,
                Err(e) => {
                    let session_id = self.current.as_ref().map(SessionHandle::id);
                    tracing::debug!(?session_id, error = %e, "invalid audio payload");
                    self.reply(ServerEvent::Error {
                        message: format!("Invalid audio data: {e}"),
                        session_id,
                    })
                    .await;
                }
            },
            WsIncoming::EndAudioSession => self.end_session().await,
            WsIncoming::Ping => self.reply(ServerEvent::Pong).await,
        }
    }

    async fn on_audio(&mut self, pcm: Vec<u8>) {
        let Some(handle) = &self.current else {
            self.reply(ServerEvent::connection_error("no active audio session"))
                .await;
            return;
        };

        if let Err(e) = handle.send_audio(pcm).await {
            let session_id = handle.id();
            tracing::warn!(%session_id, error = %e, "session no longer accepts audio");
            self.state.sessions.remove(session_id).await;
            self.current = None;
            self.reply(ServerEvent::connection_error("no active audio session"))
                .await;
        }
    }

    /// Open a new session once the previous one, if any, has ended
    async fn start_session(&mut self) {
        if let Some(previous) = self.current.take() {
            self.finish(&previous).await;
            if tokio::time::timeout(RESTART_WAIT, previous.stopped())
                .await
                .is_err()
            {
                tracing::warn!(session_id = %previous.id(), "previous session still draining");
            }
        }

        let handle = SessionHandle::spawn(
            self.state.config.session,
            self.state.pipeline.clone(),
            self.tx.clone(),
        );
        self.state.sessions.insert(handle.clone()).await;
        self.current = Some(handle);
    }

    /// Ask the current session to finish; it reports `session_ended` itself
    async fn end_session(&mut self) {
        match self.current.take() {
            Some(handle) => self.finish(&handle).await,
            None => {
                self.reply(ServerEvent::connection_error("no active audio session"))
                    .await;
            }
        }
    }

    async fn finish(&self, handle: &SessionHandle) {
        self.state.sessions.remove(handle.id()).await;
        if let Err(e) = handle.end().await {
            tracing::debug!(session_id = %handle.id(), error = %e, "session already stopped");
        }
    }

    /// Detach the current session without waiting for it to settle
    async fn close(&mut self) {
        if let Some(handle) = self.current.take() {
            self.state.sessions.remove(handle.id()).await;
            tracing::debug!(session_id = %handle.id(), "detaching session");
        }
    }

    async fn reply(&self, event: ServerEvent) {
        if self.tx.send(event).await.is_err() {
            tracing::trace!("event dropped, connection closing");
        }
    }
}
