//! Voice processing module
//!
//! Handles utterance segmentation, voice activity detection, turn
//! detection and the WAV container handed to speech engines.

mod segmenter;
mod turn;
mod vad;
mod wav;

pub use segmenter::{DEFAULT_SILENCE, Segmenter, Utterance};
pub use turn::{TurnDecision, TurnState, detect_turn};
pub use vad::{DEFAULT_THRESHOLD, VadResult, VoiceActivity};
pub use wav::{
    SAMPLE_RATE, WAV_HEADER_LEN, decode_wav, is_wav, pcm_samples, pcm_to_wav, wav_header,
};
