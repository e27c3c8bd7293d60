//! Subprocess-backed speech engines
//!
//! The transcriber runs once per utterance against a scratch WAV file;
//! the synthesizer pipes text to stdin and streams raw PCM from stdout.

use std::process::Stdio;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdout, Command};

use super::{AudioStream, Synthesizer, Transcriber};
use crate::{Error, Result};

/// Runs a local speech-to-text program
///
/// The program receives the path of a WAV file as its final argument and
/// prints the transcript on stdout.
#[derive(Debug, Clone)]
pub struct ProcessTranscriber {
    command: String,
    args: Vec<String>,
}

impl ProcessTranscriber {
    #[must_use]
    pub const fn new(command: String, args: Vec<String>) -> Self {
        Self { command, args }
    }
}

#[async_trait]
impl Transcriber for ProcessTranscriber {
    async fn transcribe(&self, wav: &[u8]) -> Result<Option<String>> {
        let scratch = tempfile::Builder::new()
            .prefix("parley-utterance-")
            .suffix(".wav")
            .tempfile()?;
        tokio::fs::write(scratch.path(), wav).await?;

        tracing::debug!(
            command = %self.command,
            path = %scratch.path().display(),
            audio_bytes = wav.len(),
            "starting transcription"
        );

        let output = Command::new(&self.command)
            .args(&self.args)
            .arg(scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::Stt(format!("failed to start {}: {e}", self.command)))?;

        if let Err(e) = scratch.close() {
            tracing::debug!(error = %e, "failed to remove scratch audio");
        }

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(code, stderr = %stderr.trim(), "transcriber exited unsuccessfully");
            return Ok(None);
        }

        let transcript = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if transcript.is_empty() {
            tracing::debug!("transcriber produced no text");
            return Ok(None);
        }

        tracing::info!(transcript = %transcript, "transcription complete");
        Ok(Some(transcript))
    }

    fn name(&self) -> &'static str {
        "process"
    }
}

/// Runs a Piper-compatible text-to-speech program
///
/// Text is written to stdin; raw 16-bit mono PCM is read from stdout.
#[derive(Debug, Clone)]
pub struct ProcessSynthesizer {
    command: String,
    args: Vec<String>,
    chunk_bytes: usize,
}

impl ProcessSynthesizer {
    #[must_use]
    pub fn new(command: String, args: Vec<String>, chunk_bytes: usize) -> Self {
        Self {
            command,
            args,
            chunk_bytes: chunk_bytes.max(1),
        }
    }

    /// Piper invocation for `voice` at the given speaking rate
    #[must_use]
    pub fn piper(command: String, voice: &str, speed: f64, chunk_bytes: usize) -> Self {
        let mut args = vec![
            "--model".to_string(),
            voice.to_string(),
            "--output_raw".to_string(),
        ];
        if (speed - 1.0).abs() > f64::EPSILON {
            args.push("--length_scale".to_string());
            args.push(format!("{:.3}", 1.0 / speed));
        }
        Self::new(command, args, chunk_bytes)
    }

    /// Arguments passed to the program
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// Live synthesis process and its output pipe
struct Synthesis {
    child: Child,
    stdout: ChildStdout,
}

#[async_trait]
impl Synthesizer for ProcessSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<AudioStream> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Tts(format!("failed to start {}: {e}", self.command)))?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Tts("synthesizer stdout unavailable".into()))?;

        // Feed stdin concurrently so a full stdout pipe cannot stall the writer
        if let Some(mut stdin) = stdin {
            let text = text.to_string();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(text.as_bytes()).await {
                    tracing::debug!(error = %e, "failed to write synthesizer stdin");
                }
                // Dropping stdin closes the pipe and signals end of input
            });
        }

        tracing::debug!(command = %self.command, chars = text.len(), "synthesis started");

        let chunk_bytes = self.chunk_bytes;
        let stream = futures::stream::unfold(
            Some(Synthesis { child, stdout }),
            move |state| async move {
                let mut synthesis = state?;
                let mut buf = vec![0u8; chunk_bytes];
                match read_full(&mut synthesis.stdout, &mut buf).await {
                    Ok(0) => match synthesis.child.wait().await {
                        Ok(status) if status.success() => None,
                        Ok(status) => Some((
                            Err(Error::Tts(format!("synthesizer exited with {status}"))),
                            None,
                        )),
                        Err(e) => Some((Err(e.into()), None)),
                    },
                    Ok(n) => {
                        buf.truncate(n);
                        Some((Ok(buf), Some(synthesis)))
                    }
                    Err(e) => Some((Err(e.into()), None)),
                }
            },
        );

        Ok(stream.boxed())
    }

    fn name(&self) -> &'static str {
        "process"
    }
}

/// Fill `buf` from `reader`, stopping early only at end of stream
async fn read_full(reader: &mut ChildStdout, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
