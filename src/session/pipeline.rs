//! Per-utterance processing: transcription, analysis and reply

use futures::StreamExt;
use tokio::sync::mpsc;

use super::chat::ChatMessage;
use super::events::EventSink;
use crate::engines::{Engines, GenerationRequest};
use crate::voice::{Utterance, VoiceActivity, detect_turn, pcm_to_wav};

/// Progress reported back to the owning session
#[derive(Debug)]
pub enum PipelineUpdate {
    /// The turn was judged finished and a reply is being generated
    Responding,
    /// The utterance is fully handled
    Finished(TurnOutcome),
}

/// What one utterance produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Recognized user text
    pub transcript: Option<String>,
    /// Generated agent reply
    pub reply: Option<String>,
    /// Whether the agent took the floor
    pub responded: bool,
}

/// Shared, stateless utterance processor
#[derive(Debug, Clone)]
pub struct Pipeline {
    engines: Engines,
    vad: VoiceActivity,
}

impl Pipeline {
    #[must_use]
    pub const fn new(engines: Engines, vad: VoiceActivity) -> Self {
        Self { engines, vad }
    }

    #[must_use]
    pub const fn engines(&self) -> &Engines {
        &self.engines
    }

    #[must_use]
    pub const fn vad(&self) -> &VoiceActivity {
        &self.vad
    }

    /// Process one utterance, emitting events as each stage completes
    ///
    /// `Responding` is sent on `updates` before generation begins. Engine
    /// failures are reported to the client and end the turn early.
    pub async fn run(
        &self,
        utterance: Utterance,
        history: Vec<ChatMessage>,
        sink: &EventSink,
        updates: &mpsc::Sender<PipelineUpdate>,
    ) -> TurnOutcome {
        let session_id = sink.session_id();
        let mut outcome = TurnOutcome::default();

        let wav = match pcm_to_wav(utterance.audio()) {
            Ok(wav) => wav,
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "failed to wrap utterance");
                sink.error(e.to_string()).await;
                return outcome;
            }
        };

        tracing::debug!(
            %session_id,
            bytes = utterance.len(),
            chunks = utterance.chunk_count(),
            "processing utterance"
        );

        let transcript = match self.engines.transcriber.transcribe(&wav).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                tracing::info!(%session_id, "no transcript, discarding utterance");
                return outcome;
            }
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "transcription failed");
                sink.error(e.to_string()).await;
                return outcome;
            }
        };

        sink.transcription(&transcript).await;
        sink.vad_result(self.vad.analyze(utterance.audio())).await;

        let decision = detect_turn(&transcript);
        sink.turn_result(decision, &transcript).await;
        outcome.transcript = Some(transcript.clone());

        if !decision.should_respond() {
            tracing::debug!(%session_id, state = ?decision.state, "turn not finished, waiting");
            return outcome;
        }

        outcome.responded = true;
        if updates.send(PipelineUpdate::Responding).await.is_err() {
            tracing::debug!(%session_id, "session gone before reply");
        }

        let request = GenerationRequest::new(transcript).with_history(history);
        let reply = match self.engines.generator.generate(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "generation failed");
                sink.error(e.to_string()).await;
                return outcome;
            }
        };

        sink.llm_response(&reply).await;
        outcome.reply = Some(reply.clone());

        self.speak(&reply, sink).await;
        sink.audio_end().await;

        outcome
    }

    /// Stream synthesized audio to the client
    ///
    /// Synthesis failures drop the remaining audio without notifying the
    /// client; the caller still closes the audio stream.
    async fn speak(&self, text: &str, sink: &EventSink) {
        let session_id = sink.session_id();
        let mut audio = match self.engines.synthesizer.synthesize(text).await {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "synthesis failed to start");
                return;
            }
        };

        let mut chunks = 0usize;
        while let Some(chunk) = audio.next().await {
            match chunk {
                Ok(pcm) => {
                    sink.audio_chunk(&pcm).await;
                    chunks += 1;
                }
                Err(e) => {
                    tracing::warn!(%session_id, error = %e, chunks, "synthesis failed mid-stream");
                    return;
                }
            }
        }
        tracing::debug!(%session_id, chunks, "synthesis complete");
    }
}
