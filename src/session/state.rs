//! Turn-taking state machine
//!
//! `Conversation` owns the segmenter and decides, for every input, whether
//! audio is buffered or dropped and which utterance runs next. It performs
//! no I/O and never sleeps; the session actor drives it with timestamps.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::voice::{Segmenter, Utterance};

/// Who holds the floor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the user
    Idle,
    /// Buffering user audio
    UserSpeaking,
    /// Transcribing and classifying an utterance
    Processing,
    /// Generating or streaming a reply, plus the grace period after it
    AgentSpeaking,
}

/// Flags mirrored to clients and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConversationFlags {
    pub user_speaking: bool,
    pub agent_speaking: bool,
    pub waiting_for_user_input: bool,
}

/// What happened to an incoming audio chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    Buffered,
    /// Discarded because the agent holds the floor
    Dropped,
}

/// Per-session turn-taking state
#[derive(Debug)]
pub struct Conversation {
    phase: Phase,
    segmenter: Segmenter,
    queued: VecDeque<Utterance>,
    grace: Duration,
    release_at: Option<Instant>,
    last_activity: Option<Instant>,
}

impl Conversation {
    #[must_use]
    pub fn new(silence: Duration, grace: Duration) -> Self {
        Self {
            phase: Phase::Idle,
            segmenter: Segmenter::new(silence),
            queued: VecDeque::new(),
            grace,
            release_at: None,
            last_activity: None,
        }
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn flags(&self) -> ConversationFlags {
        ConversationFlags {
            user_speaking: !self.segmenter.is_empty(),
            agent_speaking: self.phase == Phase::AgentSpeaking,
            waiting_for_user_input: self.phase == Phase::Idle,
        }
    }

    /// When user audio was last buffered
    #[must_use]
    pub const fn last_activity(&self) -> Option<Instant> {
        self.last_activity
    }

    /// Utterances closed while another one was in flight
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queued.len()
    }

    /// Earliest pending timer: silence window or agent grace
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        match (self.segmenter.deadline(), self.release_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Whether nothing is running, buffered or queued
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.phase == Phase::Idle && self.queued.is_empty() && self.segmenter.is_empty()
    }

    /// Accept a chunk of client audio
    pub fn on_chunk(&mut self, now: Instant, chunk: Vec<u8>) -> ChunkOutcome {
        if self.phase == Phase::AgentSpeaking {
            return ChunkOutcome::Dropped;
        }

        if !chunk.is_empty() {
            self.last_activity = Some(now);
        }
        self.segmenter.push(now, chunk);
        if self.phase == Phase::Idle && !self.segmenter.is_empty() {
            self.phase = Phase::UserSpeaking;
        }
        ChunkOutcome::Buffered
    }

    /// Fire any timers due at `now`, returning an utterance to start
    pub fn on_timer(&mut self, now: Instant) -> Option<Utterance> {
        let mut ready = None;

        if self.release_at.is_some_and(|at| at <= now) {
            self.release_at = None;
            ready = self.advance();
        }

        if let Some(utterance) = self.segmenter.take_due(now) {
            if let Some(start) = self.admit(utterance) {
                ready = Some(start);
            }
        }

        ready
    }

    /// Close the open utterance immediately, as on an explicit end
    ///
    /// Audio buffered while the agent holds the floor is discarded.
    pub fn on_end(&mut self) -> Option<Utterance> {
        let utterance = self.segmenter.flush()?;
        if self.phase == Phase::AgentSpeaking {
            tracing::debug!(bytes = utterance.len(), "discarding audio buffered during agent turn");
            return None;
        }
        self.admit(utterance)
    }

    /// The in-flight utterance is getting a reply
    pub fn begin_response(&mut self) {
        if self.phase == Phase::Processing {
            self.phase = Phase::AgentSpeaking;
        }
    }

    /// The in-flight utterance is done
    ///
    /// After a reply the floor is held for the grace period; otherwise the
    /// next queued utterance, if any, starts right away.
    pub fn finish_turn(&mut self, now: Instant) -> Option<Utterance> {
        match self.phase {
            Phase::AgentSpeaking => {
                self.release_at = Some(now + self.grace);
                None
            }
            Phase::Processing => self.advance(),
            Phase::Idle | Phase::UserSpeaking => None,
        }
    }

    /// Start `utterance` now if the floor is free, otherwise queue it
    fn admit(&mut self, utterance: Utterance) -> Option<Utterance> {
        match self.phase {
            Phase::Idle | Phase::UserSpeaking => {
                self.phase = Phase::Processing;
                Some(utterance)
            }
            Phase::Processing | Phase::AgentSpeaking => {
                self.queued.push_back(utterance);
                None
            }
        }
    }

    /// Leave the current turn for the next queued utterance or the user
    fn advance(&mut self) -> Option<Utterance> {
        if let Some(next) = self.queued.pop_front() {
            self.phase = Phase::Processing;
            return Some(next);
        }

        self.phase = if self.segmenter.is_empty() {
            Phase::Idle
        } else {
            Phase::UserSpeaking
        };
        None
    }
}
