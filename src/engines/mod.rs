//! External speech and language engines
//!
//! Every engine sits behind a narrow async trait so the conversation
//! pipeline can be driven by local subprocesses, HTTP services or test
//! doubles interchangeably.

mod http;
mod ollama;
mod probe;
mod process;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};

use crate::Result;
use crate::config::{Backend, Config};
use crate::session::ChatMessage;

pub use http::{HttpSynthesizer, HttpTranscriber};
pub use ollama::{OllamaGenerator, ResponseAssembler, render_prompt};
pub use probe::{EngineStatus, livekit_http_url, probe_engines};
pub use process::{ProcessSynthesizer, ProcessTranscriber};

/// Stream of raw 16kHz mono 16-bit PCM slices, in playback order
///
/// An `Err` item means synthesis failed partway; no items follow it.
pub type AudioStream = BoxStream<'static, Result<Vec<u8>>>;

/// Speech-to-text engine
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe a canonical WAV file
    ///
    /// Returns `Ok(None)` when the engine ran but produced nothing usable.
    ///
    /// # Errors
    ///
    /// Returns error if the engine could not be reached or started
    async fn transcribe(&self, wav: &[u8]) -> Result<Option<String>>;

    /// Short engine name for logs
    fn name(&self) -> &'static str;
}

/// Input to a text generation request
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    /// The latest user utterance
    pub prompt: String,

    /// Earlier turns of the conversation, oldest first
    pub history: Vec<ChatMessage>,
}

impl GenerationRequest {
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            history: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }
}

/// Text generation engine
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce a complete, non-empty reply
    ///
    /// # Errors
    ///
    /// Returns error if the engine is unreachable or produced no reply
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    fn name(&self) -> &'static str;
}

/// Text-to-speech engine
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Start synthesizing `text` into a stream of PCM slices
    ///
    /// # Errors
    ///
    /// Returns error if the engine could not be started
    async fn synthesize(&self, text: &str) -> Result<AudioStream>;

    fn name(&self) -> &'static str;
}

/// The engine set shared by every session
#[derive(Clone)]
pub struct Engines {
    pub transcriber: Arc<dyn Transcriber>,
    pub generator: Arc<dyn Generator>,
    pub synthesizer: Arc<dyn Synthesizer>,
}

impl std::fmt::Debug for Engines {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engines")
            .field("transcriber", &self.transcriber.name())
            .field("generator", &self.generator.name())
            .field("synthesizer", &self.synthesizer.name())
            .finish()
    }
}

impl Engines {
    #[must_use]
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        generator: Arc<dyn Generator>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        Self {
            transcriber,
            generator,
            synthesizer,
        }
    }

    /// Build the configured engine adapters
    ///
    /// # Errors
    ///
    /// Returns error if an HTTP client cannot be created
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;

        let transcriber: Arc<dyn Transcriber> = match config.stt.backend {
            Backend::Process => Arc::new(ProcessTranscriber::new(
                config.stt.command.clone(),
                config.stt.args.clone(),
            )),
            Backend::Http => Arc::new(HttpTranscriber::new(
                client.clone(),
                config.stt.url.clone(),
                config.stt.model.clone(),
            )),
        };

        let generator: Arc<dyn Generator> =
            Arc::new(OllamaGenerator::new(client.clone(), config.llm.clone()));

        let synthesizer: Arc<dyn Synthesizer> = match config.tts.backend {
            Backend::Process => Arc::new(ProcessSynthesizer::piper(
                config.tts.command.clone(),
                &config.tts.voice,
                config.tts.speed,
                config.tts.chunk_bytes,
            )),
            Backend::Http => Arc::new(HttpSynthesizer::new(client, &config.tts)),
        };

        tracing::info!(
            stt = transcriber.name(),
            llm = generator.name(),
            tts = synthesizer.name(),
            "engines configured"
        );

        Ok(Self::new(transcriber, generator, synthesizer))
    }
}

/// Regroup an arbitrary byte stream into fixed-size slices
///
/// Every slice but the last is exactly `chunk_bytes` long, which keeps
/// 16-bit samples from straddling two slices when `chunk_bytes` is even.
pub fn reframe<S>(inner: S, chunk_bytes: usize) -> AudioStream
where
    S: Stream<Item = Result<Vec<u8>>> + Send + 'static,
{
    let chunk_bytes = chunk_bytes.max(1);
    futures::stream::unfold(
        Some((inner.boxed(), Vec::new())),
        move |state| async move {
            let (mut inner, mut pending) = state?;
            loop {
                if pending.len() >= chunk_bytes {
                    let rest = pending.split_off(chunk_bytes);
                    return Some((Ok(pending), Some((inner, rest))));
                }
                match inner.next().await {
                    Some(Ok(bytes)) => pending.extend_from_slice(&bytes),
                    Some(Err(e)) => return Some((Err(e), None)),
                    None if pending.is_empty() => return None,
                    None => return Some((Ok(pending), None)),
                }
            }
        },
    )
    .boxed()
}
