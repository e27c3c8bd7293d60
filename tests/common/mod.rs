//! Shared test utilities: scripted engine doubles

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parley_gateway::engines::{
    AudioStream, Engines, GenerationRequest, Generator, Synthesizer, Transcriber,
};
use parley_gateway::session::{Pipeline, ServerEvent};
use parley_gateway::voice::VoiceActivity;
use parley_gateway::{Error, Result};
use tokio::sync::mpsc;

/// One scripted transcription result
#[derive(Debug, Clone)]
pub enum Heard {
    Text(&'static str),
    Nothing,
    Fail,
}

/// Transcriber that replays a script and records every WAV it receives
#[derive(Default)]
pub struct ScriptedTranscriber {
    script: Mutex<VecDeque<Heard>>,
    received: Mutex<Vec<Vec<u8>>>,
    delay: Duration,
}

impl ScriptedTranscriber {
    pub fn new(script: impl IntoIterator<Item = Heard>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        })
    }

    pub fn slow(delay: Duration, script: impl IntoIterator<Item = Heard>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            received: Mutex::default(),
            delay,
        })
    }

    /// Every WAV handed to the engine so far
    pub fn received(&self) -> Vec<Vec<u8>> {
        self.received.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, wav: &[u8]) -> Result<Option<String>> {
        self.received.lock().unwrap().push(wav.to_vec());
        let next = self.script.lock().unwrap().pop_front().unwrap_or(Heard::Nothing);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match next {
            Heard::Text(text) => Ok(Some(text.to_string())),
            Heard::Nothing => Ok(None),
            Heard::Fail => Err(Error::Stt("whisper failed to start".into())),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Generator that always answers with the same reply
#[derive(Default)]
pub struct FixedGenerator {
    reply: String,
    delay: Duration,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl FixedGenerator {
    pub fn new(reply: &str) -> Arc<Self> {
        Self::slow(reply, Duration::ZERO)
    }

    pub fn slow(reply: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            delay,
            requests: Mutex::default(),
        })
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for FixedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.reply.clone())
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Generator whose engine is unreachable
pub struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
        Err(Error::Generation("ollama unreachable".into()))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Synthesizer that streams fixed PCM chunks
pub struct ChunkSynthesizer {
    chunks: Vec<Vec<u8>>,
}

impl ChunkSynthesizer {
    pub fn new(chunks: Vec<Vec<u8>>) -> Arc<Self> {
        Arc::new(Self { chunks })
    }
}

#[async_trait]
impl Synthesizer for ChunkSynthesizer {
    async fn synthesize(&self, _text: &str) -> Result<AudioStream> {
        Ok(futures::stream::iter(self.chunks.clone().into_iter().map(Ok)).boxed())
    }

    fn name(&self) -> &'static str {
        "chunks"
    }
}

/// Synthesizer whose engine cannot be started
pub struct FailingSynthesizer;

#[async_trait]
impl Synthesizer for FailingSynthesizer {
    async fn synthesize(&self, _text: &str) -> Result<AudioStream> {
        Err(Error::Tts("piper not found".into()))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Engines built from doubles
pub fn engines(
    transcriber: Arc<dyn Transcriber>,
    generator: Arc<dyn Generator>,
    synthesizer: Arc<dyn Synthesizer>,
) -> Engines {
    Engines::new(transcriber, generator, synthesizer)
}

/// Pipeline with the default VAD threshold
pub fn pipeline(engines: Engines) -> Pipeline {
    Pipeline::new(engines, VoiceActivity::default())
}

/// `n` bytes of loud PCM
pub fn speech(n: usize, fill: u8) -> Vec<u8> {
    vec![fill; n]
}

/// Receive events until one matches `done`, returning all of them
pub async fn events_until(
    rx: &mut mpsc::Receiver<ServerEvent>,
    done: impl Fn(&ServerEvent) -> bool,
) -> Vec<ServerEvent> {
    let mut seen = Vec::new();
    while let Some(event) = rx.recv().await {
        let stop = done(&event);
        seen.push(event);
        if stop {
            return seen;
        }
    }
    panic!("event stream closed early, saw {seen:?}");
}

/// Event `type` tags in order
pub fn kinds(events: &[ServerEvent]) -> Vec<String> {
    events
        .iter()
        .map(|event| {
            serde_json::to_value(event).unwrap()["type"]
                .as_str()
                .unwrap()
                .to_string()
        })
        .collect()
}
