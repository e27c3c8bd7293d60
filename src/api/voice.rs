//! Synchronous voice endpoints over the same engines and analyzers the
//! streaming sessions use

use std::sync::Arc;

use axum::{Json, Router, body::Bytes, extract::State, routing::post};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiState};
use crate::engines::GenerationRequest;
use crate::voice::{TurnState, VadResult, decode_wav, detect_turn, is_wav, pcm_samples, pcm_to_wav};

/// Build voice router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/transcribe", post(transcribe))
        .route("/vad", post(vad))
        .route("/turn-detection", post(turn_detection))
        .with_state(state)
}

/// Chat request
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
}

/// Chat response
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    /// Base64 WAV of the spoken reply
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
}

/// Generate a reply and speak it
async fn chat(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let message = request.message.trim();
    if message.is_empty() {
        return Err(ApiError::BadRequest("No message provided"));
    }

    let engines = state.engines();
    let response = engines
        .generator
        .generate(&GenerationRequest::new(message))
        .await?;

    let audio = match speak(&state, &response).await {
        Ok(pcm) if !pcm.is_empty() => Some(STANDARD.encode(pcm_to_wav(&pcm)?)),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(error = %e, "synthesis failed, replying without audio");
            None
        }
    };

    Ok(Json(ChatResponse { response, audio }))
}

/// Collect the full synthesized PCM for `text`
async fn speak(state: &ApiState, text: &str) -> crate::Result<Vec<u8>> {
    let mut stream = state.engines().synthesizer.synthesize(text).await?;
    let mut pcm = Vec::new();
    while let Some(chunk) = stream.next().await {
        pcm.extend_from_slice(&chunk?);
    }
    Ok(pcm)
}

/// Transcription response
#[derive(Debug, Serialize)]
pub struct TranscribeResponse {
    pub text: String,
}

/// Transcribe a WAV file or raw 16kHz mono PCM
async fn transcribe(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<Json<TranscribeResponse>, ApiError> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("No audio file provided"));
    }

    let wav = if is_wav(&body) {
        body.to_vec()
    } else {
        pcm_to_wav(&body)?
    };

    match state.engines().transcriber.transcribe(&wav).await {
        Ok(Some(text)) => Ok(Json(TranscribeResponse { text })),
        Ok(None) => Err(ApiError::Engine("Transcription failed".to_string())),
        Err(e) => {
            tracing::warn!(error = %e, "transcription failed");
            Err(ApiError::Engine("Transcription failed".to_string()))
        }
    }
}

/// Voice activity of a WAV file or raw 16-bit PCM
async fn vad(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<Json<VadResult>, ApiError> {
    let samples = if is_wav(&body) {
        decode_wav(&body).map_err(|e| {
            tracing::debug!(error = %e, "rejecting unreadable WAV");
            ApiError::BadRequest("Invalid WAV data")
        })?
    } else {
        pcm_samples(&body)
    };

    Ok(Json(state.pipeline.vad().analyze_samples(&samples)))
}

/// Turn detection request
#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    #[serde(default)]
    pub text: String,
}

/// Turn detection response
#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub state: TurnState,
    pub confidence: f64,
    pub should_respond: bool,
}

/// Classify whether `text` ends the speaker's turn
async fn turn_detection(Json(request): Json<TurnRequest>) -> Json<TurnResponse> {
    let decision = detect_turn(&request.text);
    Json(TurnResponse {
        state: decision.state,
        confidence: decision.confidence,
        should_respond: decision.should_respond(),
    })
}
