//! Configuration management for the Parley gateway

pub mod file;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result};

use file::ParleyConfigFile;

/// Parley gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP/WebSocket server configuration
    pub server: ServerConfig,

    /// Conversation session timing
    pub session: SessionConfig,

    /// Voice activity detection threshold
    pub vad_threshold: f64,

    /// Speech-to-text engine
    pub stt: SttConfig,

    /// Ollama text generation
    pub llm: LlmConfig,

    /// Text-to-speech engine
    pub tts: TtsConfig,

    /// `LiveKit` WebSocket URL (reported, probed and handed out by the mock join)
    pub livekit_url: String,
}

/// HTTP/WebSocket server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Path to static files directory (web client)
    pub static_dir: PathBuf,

    /// Path to extensions directory
    pub extensions_dir: PathBuf,
}

/// Conversation session timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Silence gap that closes an utterance
    pub silence: Duration,

    /// Pause after the agent finishes before returning to idle
    pub agent_grace: Duration,

    /// Chat messages retained per session
    pub history_messages: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            silence: Duration::from_millis(1500),
            agent_grace: Duration::from_millis(500),
            history_messages: 20,
        }
    }
}

/// Which kind of engine adapter to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// Local subprocess
    #[default]
    Process,
    /// HTTP service
    Http,
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "process" => Ok(Self::Process),
            "http" => Ok(Self::Http),
            other => Err(Error::Config(format!(
                "unknown engine backend '{other}' (expected 'process' or 'http')"
            ))),
        }
    }
}

/// Speech-to-text engine configuration
#[derive(Debug, Clone)]
pub struct SttConfig {
    pub backend: Backend,

    /// Program spawned per utterance; the WAV path is appended to `args`
    pub command: String,
    pub args: Vec<String>,

    /// Whisper-compatible transcription service
    pub url: String,
    pub model: String,

    /// Command line whose success means the engine is installed
    pub probe: Vec<String>,
}

/// Ollama configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub url: String,
    pub model: String,
    pub stream: bool,
    pub system_prompt: Option<String>,
    pub temperature: f32,
    pub context_size: u32,
}

/// Text-to-speech engine configuration
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub backend: Backend,

    /// Piper-compatible program reading text on stdin and writing raw PCM
    pub command: String,
    pub voice: String,

    /// `OpenAI`-compatible speech service
    pub url: String,
    pub model: String,

    /// Speaking rate multiplier
    pub speed: f64,

    /// Bytes per streamed audio chunk
    pub chunk_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: 3000,
                static_dir: PathBuf::from("public"),
                extensions_dir: PathBuf::from("extensions"),
            },
            session: SessionConfig::default(),
            vad_threshold: crate::voice::DEFAULT_THRESHOLD,
            stt: SttConfig {
                backend: Backend::Process,
                command: "python3".to_string(),
                args: vec!["extensions/whisper_stt/standalone.py".to_string()],
                url: "http://localhost:8000".to_string(),
                model: "whisper-1".to_string(),
                probe: vec![
                    "python3".to_string(),
                    "-c".to_string(),
                    "import whisper".to_string(),
                ],
            },
            llm: LlmConfig {
                url: "http://localhost:11434".to_string(),
                model: "llama2".to_string(),
                stream: true,
                system_prompt: None,
                temperature: 0.7,
                context_size: 2048,
            },
            tts: TtsConfig {
                backend: Backend::Process,
                command: "piper".to_string(),
                voice: "en_US-amy-medium".to_string(),
                url: "http://localhost:8000".to_string(),
                model: "tts-1".to_string(),
                speed: 1.0,
                chunk_bytes: 3200,
            },
            livekit_url: "ws://localhost:7880".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment, config file and defaults
    ///
    /// # Errors
    ///
    /// Returns error if a setting is invalid
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let path = config_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("PARLEY_CONFIG").ok().map(PathBuf::from));
        let fc = file::load_config_file(path.as_deref());
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Resolve configuration with precedence env > toml > default
    ///
    /// # Errors
    ///
    /// Returns error if a setting is invalid
    pub fn from_sources(fc: ParleyConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let server = ServerConfig {
            port: parse_env(&env, "PARLEY_PORT")
                .or_else(|| parse_env(&env, "PORT"))
                .or(fc.server.port)
                .unwrap_or(defaults.server.port),
            static_dir: env("PARLEY_STATIC_DIR")
                .or(fc.server.static_dir)
                .map_or(defaults.server.static_dir, PathBuf::from),
            extensions_dir: env("PARLEY_EXTENSIONS_DIR")
                .or(fc.server.extensions_dir)
                .map_or(defaults.server.extensions_dir, PathBuf::from),
        };

        let session = SessionConfig {
            silence: parse_env(&env, "PARLEY_SILENCE_MS")
                .or(fc.session.silence_ms)
                .map_or(defaults.session.silence, Duration::from_millis),
            agent_grace: parse_env(&env, "PARLEY_AGENT_GRACE_MS")
                .or(fc.session.agent_grace_ms)
                .map_or(defaults.session.agent_grace, Duration::from_millis),
            history_messages: parse_env(&env, "PARLEY_HISTORY_MESSAGES")
                .or(fc.session.history_messages)
                .unwrap_or(defaults.session.history_messages),
        };

        let stt = SttConfig {
            backend: env("PARLEY_STT_BACKEND")
                .or(fc.stt.backend)
                .map(|s| s.parse::<Backend>())
                .transpose()?
                .unwrap_or(defaults.stt.backend),
            command: env("PARLEY_STT_COMMAND")
                .or(fc.stt.command)
                .unwrap_or(defaults.stt.command),
            args: fc.stt.args.unwrap_or(defaults.stt.args),
            url: env("PARLEY_STT_URL")
                .or(fc.stt.url)
                .unwrap_or(defaults.stt.url),
            model: fc.stt.model.unwrap_or(defaults.stt.model),
            probe: fc.stt.probe.unwrap_or(defaults.stt.probe),
        };

        let llm = LlmConfig {
            url: env("OLLAMA_URL")
                .or(fc.llm.url)
                .unwrap_or(defaults.llm.url),
            model: env("OLLAMA_MODEL")
                .or(fc.llm.model)
                .unwrap_or(defaults.llm.model),
            stream: fc.llm.stream.unwrap_or(defaults.llm.stream),
            system_prompt: env("PARLEY_SYSTEM_PROMPT").or(fc.llm.system_prompt),
            temperature: fc.llm.temperature.unwrap_or(defaults.llm.temperature),
            context_size: fc.llm.context_size.unwrap_or(defaults.llm.context_size),
        };

        let tts = TtsConfig {
            backend: env("PARLEY_TTS_BACKEND")
                .or(fc.tts.backend)
                .map(|s| s.parse::<Backend>())
                .transpose()?
                .unwrap_or(defaults.tts.backend),
            command: env("PIPER_COMMAND")
                .or(fc.tts.command)
                .unwrap_or(defaults.tts.command),
            voice: env("PIPER_VOICE")
                .or(fc.tts.voice)
                .unwrap_or(defaults.tts.voice),
            url: env("PARLEY_TTS_URL")
                .or(fc.tts.url)
                .unwrap_or(defaults.tts.url),
            model: fc.tts.model.unwrap_or(defaults.tts.model),
            speed: fc.tts.speed.unwrap_or(defaults.tts.speed),
            chunk_bytes: fc.tts.chunk_bytes.unwrap_or(defaults.tts.chunk_bytes),
        };

        let config = Self {
            server,
            session,
            vad_threshold: parse_env(&env, "PARLEY_VAD_THRESHOLD")
                .or(fc.vad.threshold)
                .unwrap_or(defaults.vad_threshold),
            stt,
            llm,
            tts,
            livekit_url: env("LIVEKIT_URL")
                .or(fc.livekit.url)
                .unwrap_or(defaults.livekit_url),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns error naming the first invalid setting
    pub fn validate(&self) -> Result<()> {
        if self.session.silence.is_zero() {
            return Err(Error::Config("session.silence_ms must be positive".into()));
        }
        if self.vad_threshold.is_nan() || self.vad_threshold <= 0.0 {
            return Err(Error::Config("vad.threshold must be positive".into()));
        }
        if self.tts.speed.is_nan() || self.tts.speed <= 0.0 {
            return Err(Error::Config("tts.speed must be positive".into()));
        }
        if self.tts.chunk_bytes == 0 {
            return Err(Error::Config("tts.chunk_bytes must be positive".into()));
        }
        if self.stt.command.trim().is_empty() {
            return Err(Error::Config("stt.command must not be empty".into()));
        }
        Ok(())
    }
}

/// Read an environment value, ignoring values that fail to parse
fn parse_env<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    env(key).and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn file(toml_src: &str) -> ParleyConfigFile {
        toml::from_str(toml_src).unwrap()
    }

    #[test]
    fn defaults_without_sources() {
        let config = Config::from_sources(ParleyConfigFile::default(), env_from(&[])).unwrap();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.session.silence, Duration::from_millis(1500));
        assert_eq!(config.session.agent_grace, Duration::from_millis(500));
        assert_eq!(config.session.history_messages, 20);
        assert_eq!(config.vad_threshold, 0.01);
        assert_eq!(config.stt.backend, Backend::Process);
        assert_eq!(config.llm.model, "llama2");
        assert_eq!(config.tts.voice, "en_US-amy-medium");
        assert_eq!(config.tts.chunk_bytes, 3200);
        assert_eq!(config.livekit_url, "ws://localhost:7880");
    }

    #[test]
    fn env_overrides_file() {
        let fc = file(
            r#"
            [server]
            port = 4000

            [llm]
            model = "mistral"
            url = "http://gpu-box:11434"
            "#,
        );
        let config = Config::from_sources(
            fc,
            env_from(&[("PARLEY_PORT", "5000"), ("OLLAMA_MODEL", "phi3")]),
        )
        .unwrap();

        assert_eq!(config.server.port, 5000);
        assert_eq!(config.llm.model, "phi3");
        assert_eq!(config.llm.url, "http://gpu-box:11434");
    }

    #[test]
    fn port_falls_back_to_generic_env() {
        let config =
            Config::from_sources(ParleyConfigFile::default(), env_from(&[("PORT", "8081")]))
                .unwrap();
        assert_eq!(config.server.port, 8081);
    }

    #[test]
    fn unparsable_env_number_is_ignored() {
        let fc = file("[session]\nsilence_ms = 900\n");
        let config =
            Config::from_sources(fc, env_from(&[("PARLEY_SILENCE_MS", "soon")])).unwrap();
        assert_eq!(config.session.silence, Duration::from_millis(900));
    }

    #[test]
    fn backend_parses_case_insensitively() {
        let config = Config::from_sources(
            ParleyConfigFile::default(),
            env_from(&[("PARLEY_STT_BACKEND", "HTTP")]),
        )
        .unwrap();
        assert_eq!(config.stt.backend, Backend::Http);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let fc = file("[tts]\nbackend = \"espeak\"\n");
        let err = Config::from_sources(fc, env_from(&[])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        for src in [
            "[session]\nsilence_ms = 0\n",
            "[vad]\nthreshold = 0.0\n",
            "[tts]\nspeed = -1.0\n",
            "[tts]\nchunk_bytes = 0\n",
        ] {
            let result = Config::from_sources(file(src), env_from(&[]));
            assert!(matches!(result, Err(Error::Config(_))), "accepted {src}");
        }
    }
}
