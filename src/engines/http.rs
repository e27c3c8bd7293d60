//! HTTP-backed speech engines
//!
//! Speak the Whisper transcription and `OpenAI` speech wire formats, which
//! self-hosted servers such as faster-whisper-server and openedai-speech
//! expose as well.

use async_trait::async_trait;
use futures::StreamExt;

use super::{AudioStream, Synthesizer, Transcriber, reframe};
use crate::config::TtsConfig;
use crate::{Error, Result};

/// Response from a Whisper-compatible transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Transcribes speech through a Whisper-compatible HTTP service
#[derive(Debug, Clone)]
pub struct HttpTranscriber {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl HttpTranscriber {
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: String, model: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, wav: &[u8]) -> Result<Option<String>> {
        tracing::debug!(audio_bytes = wav.len(), "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Whisper request failed");
                Error::Stt(format!("transcription service unreachable: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "Whisper API error");
            return Ok(None);
        }

        let result: WhisperResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse response");
            e
        })?;

        let transcript = result.text.trim().to_string();
        if transcript.is_empty() {
            return Ok(None);
        }

        tracing::info!(transcript = %transcript, "transcription complete");
        Ok(Some(transcript))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Synthesizes speech through an `OpenAI`-compatible HTTP service
///
/// Requests raw PCM so the output matches the client's playback format.
#[derive(Debug, Clone)]
pub struct HttpSynthesizer {
    client: reqwest::Client,
    base_url: String,
    model: String,
    voice: String,
    speed: f64,
    chunk_bytes: usize,
}

impl HttpSynthesizer {
    #[must_use]
    pub fn new(client: reqwest::Client, config: &TtsConfig) -> Self {
        Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            voice: config.voice.clone(),
            speed: config.speed,
            chunk_bytes: config.chunk_bytes,
        }
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<AudioStream> {
        #[derive(serde::Serialize)]
        struct SpeechRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f64,
            response_format: &'a str,
        }

        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
            response_format: "pcm",
        };

        let response = self
            .client
            .post(format!("{}/v1/audio/speech", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Tts(format!("speech service unreachable: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("speech API error {status}: {body}")));
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(Error::from));

        Ok(reframe(body, self.chunk_bytes))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_transcription_service_is_an_error() {
        let transcriber = HttpTranscriber::new(
            reqwest::Client::new(),
            "http://127.0.0.1:1/".to_string(),
            "whisper-1".to_string(),
        );
        assert!(matches!(
            transcriber.transcribe(b"RIFF").await,
            Err(Error::Stt(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_speech_service_is_an_error() {
        let config = TtsConfig {
            url: "http://127.0.0.1:1".to_string(),
            ..crate::Config::default().tts
        };
        let synthesizer = HttpSynthesizer::new(reqwest::Client::new(), &config);
        assert!(matches!(synthesizer.synthesize("hi").await, Err(Error::Tts(_))));
    }
}
