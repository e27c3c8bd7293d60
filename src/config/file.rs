//! TOML configuration file loading
//!
//! Supports `~/.config/parley/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ParleyConfigFile {
    /// Server/runtime configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Conversation session timing
    #[serde(default)]
    pub session: SessionFileConfig,

    /// Voice activity detection
    #[serde(default)]
    pub vad: VadFileConfig,

    /// Speech-to-text engine
    #[serde(default)]
    pub stt: SttFileConfig,

    /// Ollama text generation
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Text-to-speech engine
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// `LiveKit` media server
    #[serde(default)]
    pub livekit: LiveKitFileConfig,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// API server port
    pub port: Option<u16>,

    /// Static web client directory
    pub static_dir: Option<String>,

    /// Extension discovery directory
    pub extensions_dir: Option<String>,
}

/// Conversation session timing
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    pub silence_ms: Option<u64>,
    pub agent_grace_ms: Option<u64>,
    pub history_messages: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VadFileConfig {
    pub threshold: Option<f64>,
}

/// Speech-to-text engine configuration
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    /// "process" or "http"
    pub backend: Option<String>,
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
    pub url: Option<String>,
    pub model: Option<String>,
    /// Command line run by `parley check` to verify the engine
    pub probe: Option<Vec<String>>,
}

/// Ollama configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    pub url: Option<String>,
    pub model: Option<String>,
    pub stream: Option<bool>,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub context_size: Option<u32>,
}

/// Text-to-speech engine configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    /// "process" or "http"
    pub backend: Option<String>,
    pub command: Option<String>,
    pub voice: Option<String>,
    pub url: Option<String>,
    pub model: Option<String>,
    pub speed: Option<f64>,
    pub chunk_bytes: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LiveKitFileConfig {
    pub url: Option<String>,
}

/// Load the TOML config file from `path`, or the standard path when `None`
///
/// Returns `ParleyConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file(path: Option<&Path>) -> ParleyConfigFile {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_file_path) else {
        return ParleyConfigFile::default();
    };

    if !path.exists() {
        return ParleyConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ParleyConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ParleyConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/parley/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("parley").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_parses() {
        let fc: ParleyConfigFile = toml::from_str(
            r#"
            [server]
            port = 8080

            [tts]
            voice = "en_GB-alan-low"
            speed = 1.25
            "#,
        )
        .unwrap();

        assert_eq!(fc.server.port, Some(8080));
        assert_eq!(fc.tts.voice.as_deref(), Some("en_GB-alan-low"));
        assert!(fc.stt.command.is_none());
        assert!(fc.session.silence_ms.is_none());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let fc = load_config_file(Some(&dir.path().join("absent.toml")));
        assert!(fc.server.port.is_none());
    }

    #[test]
    fn unparsable_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "server = [not toml").unwrap();

        let fc = load_config_file(Some(&path));
        assert!(fc.server.port.is_none());
    }

    #[test]
    fn explicit_path_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.toml");
        std::fs::write(&path, "[llm]\nmodel = \"mistral\"\n").unwrap();

        let fc = load_config_file(Some(&path));
        assert_eq!(fc.llm.model.as_deref(), Some("mistral"));
    }
}
