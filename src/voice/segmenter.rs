//! Silence-delimited utterance accumulation
//!
//! The segmenter is a plain state holder: callers feed it chunks with the
//! current time and poll it when its deadline passes. It never sleeps.

use std::time::Duration;

use tokio::time::Instant;

/// Default silence gap that closes an utterance
pub const DEFAULT_SILENCE: Duration = Duration::from_millis(1500);

/// A contiguous stretch of client speech
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    audio: Vec<u8>,
    chunks: usize,
}

impl Utterance {
    /// Raw 16kHz mono PCM bytes, in arrival order
    #[must_use]
    pub fn audio(&self) -> &[u8] {
        &self.audio
    }

    /// Consume into the raw PCM bytes
    #[must_use]
    pub fn into_audio(self) -> Vec<u8> {
        self.audio
    }

    /// Number of chunks concatenated into this utterance
    #[must_use]
    pub const fn chunk_count(&self) -> usize {
        self.chunks
    }

    /// Length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.audio.len()
    }

    /// Whether the utterance holds no audio
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.audio.is_empty()
    }
}

/// Accumulates chunks until a silence gap elapses
#[derive(Debug)]
pub struct Segmenter {
    silence: Duration,
    chunks: Vec<Vec<u8>>,
    deadline: Option<Instant>,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new(DEFAULT_SILENCE)
    }
}

impl Segmenter {
    /// Create a segmenter closing utterances after `silence` without input
    #[must_use]
    pub const fn new(silence: Duration) -> Self {
        Self {
            silence,
            chunks: Vec::new(),
            deadline: None,
        }
    }

    /// Append a chunk and restart the silence window
    ///
    /// Empty chunks carry no audio and leave the window untouched.
    pub fn push(&mut self, now: Instant, chunk: Vec<u8>) {
        if chunk.is_empty() {
            return;
        }
        self.chunks.push(chunk);
        self.deadline = Some(now + self.silence);
    }

    /// When the pending utterance closes, if any
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Close the utterance if its silence window has elapsed
    pub fn take_due(&mut self, now: Instant) -> Option<Utterance> {
        match self.deadline {
            Some(deadline) if deadline <= now => self.flush(),
            _ => None,
        }
    }

    /// Close the utterance immediately, cancelling the silence window
    pub fn flush(&mut self) -> Option<Utterance> {
        self.deadline = None;
        if self.chunks.is_empty() {
            return None;
        }

        let chunks = std::mem::take(&mut self.chunks);
        let count = chunks.len();
        Some(Utterance {
            audio: chunks.concat(),
            chunks: count,
        })
    }

    /// Whether nothing is buffered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}
