//! Reachability checks for the external engines

use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::{Backend, Config};

/// Upper bound on each individual check
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Availability of each engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub ollama: bool,
    pub whisper: bool,
    pub piper: bool,
    pub livekit: bool,
}

impl EngineStatus {
    /// Whether every engine answered
    #[must_use]
    pub const fn all_ok(&self) -> bool {
        self.ollama && self.whisper && self.piper && self.livekit
    }

    /// Named results in reporting order
    #[must_use]
    pub const fn entries(&self) -> [(&'static str, bool); 4] {
        [
            ("ollama", self.ollama),
            ("whisper", self.whisper),
            ("piper", self.piper),
            ("livekit", self.livekit),
        ]
    }
}

/// Check every configured engine concurrently
pub async fn probe_engines(config: &Config) -> EngineStatus {
    let client = reqwest::Client::new();

    let ollama = probe_http(
        &client,
        format!("{}/api/tags", config.llm.url.trim_end_matches('/')),
        true,
    );

    let whisper = async {
        match config.stt.backend {
            Backend::Process => match config.stt.probe.split_first() {
                Some((program, args)) => probe_command(program, args).await,
                None => which::which(&config.stt.command).is_ok(),
            },
            Backend::Http => probe_http(&client, config.stt.url.clone(), false).await,
        }
    };

    let piper = async {
        match config.tts.backend {
            Backend::Process => {
                probe_command(&config.tts.command, &["--help".to_string()]).await
            }
            Backend::Http => probe_http(&client, config.tts.url.clone(), false).await,
        }
    };

    let livekit = async {
        match livekit_http_url(&config.livekit_url) {
            Some(url) => probe_http(&client, url, false).await,
            None => {
                tracing::warn!(url = %config.livekit_url, "invalid LiveKit URL");
                false
            }
        }
    };

    let (ollama, whisper, piper, livekit) = tokio::join!(ollama, whisper, piper, livekit);
    let status = EngineStatus {
        ollama,
        whisper,
        piper,
        livekit,
    };
    tracing::debug!(?status, "engine probe complete");
    status
}

/// Map a `ws://`/`wss://` URL onto its HTTP equivalent
#[must_use]
pub fn livekit_http_url(ws_url: &str) -> Option<String> {
    let mut url = url::Url::parse(ws_url).ok()?;
    let scheme = match url.scheme() {
        "ws" => "http",
        "wss" => "https",
        "http" | "https" => return Some(url.to_string()),
        _ => return None,
    };
    url.set_scheme(scheme).ok()?;
    Some(url.to_string())
}

/// Whether `url` answers, optionally with a success status
async fn probe_http(client: &reqwest::Client, url: String, require_success: bool) -> bool {
    match timeout(PROBE_TIMEOUT, client.get(&url).send()).await {
        Ok(Ok(response)) => !require_success || response.status().is_success(),
        Ok(Err(e)) => {
            tracing::debug!(url = %url, error = %e, "probe failed");
            false
        }
        Err(_) => {
            tracing::debug!(url = %url, "probe timed out");
            false
        }
    }
}

/// The program must be on `PATH` and exit successfully
async fn probe_command(program: &str, args: &[String]) -> bool {
    if which::which(program).is_err() {
        tracing::debug!(program, "not found on PATH");
        return false;
    }

    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status();

    matches!(timeout(PROBE_TIMEOUT, status).await, Ok(Ok(s)) if s.success())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_urls_map_to_http() {
        assert_eq!(
            livekit_http_url("ws://localhost:7880").as_deref(),
            Some("http://localhost:7880/")
        );
        assert_eq!(
            livekit_http_url("wss://media.example.com/rtc").as_deref(),
            Some("https://media.example.com/rtc")
        );
        assert_eq!(livekit_http_url("not a url"), None);
        assert_eq!(livekit_http_url("ftp://example.com"), None);
    }

    #[test]
    fn all_ok_requires_every_engine() {
        let mut status = EngineStatus {
            ollama: true,
            whisper: true,
            piper: true,
            livekit: true,
        };
        assert!(status.all_ok());

        status.piper = false;
        assert!(!status.all_ok());
        assert_eq!(status.entries()[2], ("piper", false));
    }

    #[tokio::test]
    async fn missing_program_fails_probe() {
        assert!(!probe_command("parley-no-such-engine", &[]).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_status_decides_probe() {
        assert!(probe_command("sh", &["-c".to_string(), "exit 0".to_string()]).await);
        assert!(!probe_command("sh", &["-c".to_string(), "exit 1".to_string()]).await);
    }

    #[tokio::test]
    async fn unreachable_engines_report_false() {
        let mut config = Config::default();
        config.llm.url = "http://127.0.0.1:1".to_string();
        config.stt.probe = vec!["parley-no-such-engine".to_string()];
        config.tts.command = "parley-no-such-engine".to_string();
        config.livekit_url = "ws://127.0.0.1:1".to_string();

        let status = probe_engines(&config).await;
        assert_eq!(status, EngineStatus::default());
        assert!(!status.all_ok());
    }
}
