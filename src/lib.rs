//! Parley Gateway - real-time voice conversation gateway
//!
//! This library provides the core of the Parley gateway:
//! - Utterance segmentation on a silence timer
//! - Voice activity and end-of-turn heuristics
//! - Speech-to-text, text generation and text-to-speech engine adapters
//! - Per-connection conversation sessions with barge-in suppression
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Web client / UI                      │
//! │        HTTP (/api/*)     │     WebSocket (/ws)       │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Parley Gateway                       │
//! │   Sessions  │  Segmenter  │  VAD  │  Turn detection  │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                External engines                      │
//! │   Whisper (STT)  │  Ollama (LLM)  │  Piper (TTS)    │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod engines;
pub mod error;
pub mod extensions;
pub mod session;
pub mod voice;

pub use config::Config;
pub use engines::Engines;
pub use error::{Error, Result};
pub use extensions::{ExtensionInfo, ExtensionRegistry};
