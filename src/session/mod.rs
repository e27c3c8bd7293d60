//! Conversation sessions
//!
//! Each session is a tokio task owning its audio buffer, silence timer and
//! turn-taking state. The transport talks to it through a [`SessionHandle`]
//! and receives [`ServerEvent`]s on a channel.

mod actor;
mod chat;
mod events;
mod pipeline;
mod registry;
mod state;

pub use actor::{SessionCommand, SessionHandle};
pub use chat::{ChatLog, ChatMessage, ChatRole};
pub use events::{EventSink, ServerEvent};
pub use pipeline::{Pipeline, PipelineUpdate, TurnOutcome};
pub use registry::SessionRegistry;
pub use state::{ChunkOutcome, Conversation, ConversationFlags, Phase};
