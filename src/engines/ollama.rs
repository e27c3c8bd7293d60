//! Ollama text generation
//!
//! Streaming replies arrive as newline-delimited JSON objects whose
//! `response` fields concatenate into the full reply.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use super::{GenerationRequest, Generator};
use crate::config::LlmConfig;
use crate::session::{ChatMessage, ChatRole};
use crate::{Error, Result};

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_ctx: u32,
}

#[derive(Deserialize)]
struct GenerateLine {
    #[serde(default)]
    response: String,
    #[serde(default)]
    error: Option<String>,
}

/// Reassembles an NDJSON reply that may arrive split at arbitrary bytes
#[derive(Debug, Default)]
pub struct ResponseAssembler {
    pending: Vec<u8>,
    text: String,
    valid_lines: usize,
    skipped_lines: usize,
}

impl ResponseAssembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes from the network
    ///
    /// # Errors
    ///
    /// Returns error if a complete line reports an engine error
    pub fn push(&mut self, bytes: &[u8]) -> Result<()> {
        self.pending.extend_from_slice(bytes);
        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            self.consume_line(&line)?;
        }
        Ok(())
    }

    /// Flush the trailing line and return the trimmed reply
    ///
    /// # Errors
    ///
    /// Returns error if no line parsed or the reply is empty
    pub fn finish(mut self) -> Result<String> {
        let rest = std::mem::take(&mut self.pending);
        self.consume_line(&rest)?;

        if self.valid_lines == 0 {
            return Err(Error::Generation(format!(
                "no valid response lines ({} malformed)",
                self.skipped_lines
            )));
        }

        let reply = self.text.trim();
        if reply.is_empty() {
            return Err(Error::Generation("empty reply".into()));
        }
        Ok(reply.to_string())
    }

    fn consume_line(&mut self, line: &[u8]) -> Result<()> {
        let line = String::from_utf8_lossy(line);
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }

        match serde_json::from_str::<GenerateLine>(line) {
            Ok(parsed) => {
                if let Some(error) = parsed.error {
                    return Err(Error::Generation(error));
                }
                self.text.push_str(&parsed.response);
                self.valid_lines += 1;
            }
            Err(e) => {
                self.skipped_lines += 1;
                tracing::warn!(error = %e, line = %line, "skipping malformed ollama line");
            }
        }
        Ok(())
    }
}

/// Render recent history and the new utterance as a plain-text prompt
#[must_use]
pub fn render_prompt(request: &GenerationRequest) -> String {
    if request.history.is_empty() {
        return request.prompt.clone();
    }

    let mut prompt = String::new();
    for ChatMessage { role, text, .. } in &request.history {
        let speaker = match role {
            ChatRole::User => "User",
            ChatRole::Agent => "Assistant",
            ChatRole::System => "System",
        };
        prompt.push_str(speaker);
        prompt.push_str(": ");
        prompt.push_str(text);
        prompt.push('\n');
    }
    prompt.push_str("User: ");
    prompt.push_str(&request.prompt);
    prompt.push_str("\nAssistant:");
    prompt
}

/// Ollama `/api/generate` client
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: reqwest::Client,
    config: LlmConfig,
}

impl OllamaGenerator {
    #[must_use]
    pub fn new(client: reqwest::Client, mut config: LlmConfig) -> Self {
        config.url = config.url.trim_end_matches('/').to_string();
        Self { client, config }
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let prompt = render_prompt(request);
        let body = GenerateRequest {
            model: &self.config.model,
            prompt: &prompt,
            stream: self.config.stream,
            system: self.config.system_prompt.as_deref(),
            options: GenerateOptions {
                temperature: self.config.temperature,
                num_ctx: self.config.context_size,
            },
        };

        tracing::debug!(
            model = %self.config.model,
            history = request.history.len(),
            "requesting generation"
        );

        let response = self
            .client
            .post(format!("{}/api/generate", self.config.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Generation(format!("ollama unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Generation(format!("ollama error {status}: {body}")));
        }

        let mut assembler = ResponseAssembler::new();
        let mut bytes = response.bytes_stream();
        while let Some(chunk) = bytes.next().await {
            assembler.push(&chunk?)?;
        }
        let reply = assembler.finish()?;

        tracing::info!(chars = reply.len(), "generation complete");
        Ok(reply)
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}
