//! Session task: one logical worker per conversation

use std::future;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use uuid::Uuid;

use super::chat::{ChatLog, ChatMessage, ChatRole};
use super::events::{EventSink, ServerEvent};
use super::pipeline::{Pipeline, PipelineUpdate};
use super::state::{ChunkOutcome, Conversation};
use crate::config::SessionConfig;
use crate::{Error, Result};

/// Capacity of the command queue feeding a session
const COMMAND_BUFFER: usize = 256;

/// Instruction from the transport to a session
#[derive(Debug)]
pub enum SessionCommand {
    /// Raw 16kHz mono PCM from the client
    Audio(Vec<u8>),
    /// Flush buffered audio, finish outstanding work and stop
    End,
}

/// Handle to a running session task
///
/// Dropping every handle detaches the session: its timers stop and no
/// further events are delivered.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: Uuid,
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Spawn a session task delivering events to `events`
    ///
    /// `session_started` is the first event the task emits.
    #[must_use]
    pub fn spawn(
        config: SessionConfig,
        pipeline: Pipeline,
        events: mpsc::Sender<ServerEvent>,
    ) -> Self {
        let id = Uuid::new_v4();
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        let actor = SessionActor::new(id, config, pipeline, EventSink::new(id, events), rx);
        tokio::spawn(actor.run());

        Self { id, commands }
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Forward a chunk of client audio
    ///
    /// # Errors
    ///
    /// Returns error if the session has stopped
    pub async fn send_audio(&self, pcm: Vec<u8>) -> Result<()> {
        self.send(SessionCommand::Audio(pcm)).await
    }

    /// Ask the session to finish
    ///
    /// # Errors
    ///
    /// Returns error if the session has stopped
    pub async fn end(&self) -> Result<()> {
        self.send(SessionCommand::End).await
    }

    /// Resolve once the session task has exited
    ///
    /// Every event the session emitted, `session_ended` included, is queued
    /// before this returns.
    pub async fn stopped(&self) {
        self.commands.closed().await;
    }

    async fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::Session(format!("session {} has stopped", self.id)))
    }
}

struct SessionActor {
    id: Uuid,
    conversation: Conversation,
    chat: ChatLog,
    pipeline: Pipeline,
    sink: EventSink,
    commands: mpsc::Receiver<SessionCommand>,
    updates_tx: mpsc::Sender<PipelineUpdate>,
    updates: mpsc::Receiver<PipelineUpdate>,
    ending: bool,
}

impl SessionActor {
    fn new(
        id: Uuid,
        config: SessionConfig,
        pipeline: Pipeline,
        sink: EventSink,
        commands: mpsc::Receiver<SessionCommand>,
    ) -> Self {
        let (updates_tx, updates) = mpsc::channel(8);
        Self {
            id,
            conversation: Conversation::new(config.silence, config.agent_grace),
            chat: ChatLog::new(config.history_messages),
            pipeline,
            sink,
            commands,
            updates_tx,
            updates,
            ending: false,
        }
    }

    async fn run(mut self) {
        tracing::info!(session_id = %self.id, "session started");
        self.sink.session_started().await;

        loop {
            let deadline = self.conversation.deadline();

            tokio::select! {
                command = self.commands.recv(), if !self.ending => match command {
                    Some(SessionCommand::Audio(pcm)) => self.on_audio(pcm),
                    Some(SessionCommand::End) => self.on_end(),
                    None => {
                        tracing::info!(session_id = %self.id, "transport detached, session stopped");
                        return;
                    }
                },
                Some(update) = self.updates.recv() => self.on_update(update),
                () = wait_until(deadline) => {
                    if let Some(utterance) = self.conversation.on_timer(Instant::now()) {
                        self.start(utterance);
                    }
                }
            }

            if self.ending && self.conversation.is_settled() {
                self.sink.session_ended().await;
                tracing::info!(session_id = %self.id, "session ended");
                return;
            }
        }
    }

    fn on_audio(&mut self, pcm: Vec<u8>) {
        let bytes = pcm.len();
        if self.conversation.on_chunk(Instant::now(), pcm) == ChunkOutcome::Dropped {
            tracing::trace!(
                session_id = %self.id,
                bytes,
                flags = ?self.conversation.flags(),
                "agent speaking, audio dropped"
            );
        }
    }

    fn on_end(&mut self) {
        let idle = self
            .conversation
            .last_activity()
            .map(|at| Instant::now().saturating_duration_since(at));
        tracing::debug!(
            session_id = %self.id,
            ?idle,
            flags = ?self.conversation.flags(),
            "end requested"
        );
        self.ending = true;
        if let Some(utterance) = self.conversation.on_end() {
            self.start(utterance);
        }
    }

    fn on_update(&mut self, update: PipelineUpdate) {
        match update {
            PipelineUpdate::Responding => self.conversation.begin_response(),
            PipelineUpdate::Finished(outcome) => {
                if outcome.responded {
                    if let Some(transcript) = outcome.transcript {
                        self.chat.push(ChatMessage::new(ChatRole::User, transcript));
                    }
                    if let Some(reply) = outcome.reply {
                        self.chat.push(ChatMessage::new(ChatRole::Agent, reply));
                    }
                }
                if let Some(next) = self.conversation.finish_turn(Instant::now()) {
                    self.start(next);
                }
                tracing::debug!(
                    session_id = %self.id,
                    flags = ?self.conversation.flags(),
                    queued = self.conversation.queued(),
                    "turn finished"
                );
            }
        }
    }

    /// Run the pipeline for `utterance` on its own task
    fn start(&self, utterance: crate::voice::Utterance) {
        let pipeline = self.pipeline.clone();
        let sink = self.sink.clone();
        let updates = self.updates_tx.clone();
        let history = self.chat.snapshot();

        tokio::spawn(async move {
            let outcome = pipeline.run(utterance, history, &sink, &updates).await;
            // The session may have been detached meanwhile
            let _ = updates.send(PipelineUpdate::Finished(outcome)).await;
        });
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}
