//! Voice collaborators: audio recording, speech-to-text and text-to-speech.
//!
//! The session only sees the three traits. The concrete implementations run
//! external commands configured under `[voice]`, for example:
//!
//! ```toml
//! [voice]
//! record_command = ["arecord", "-q", "-f", "S16_LE", "-r", "16000", "{path}"]
//! transcribe_command = ["whisper-cli", "-nt", "-f", "{path}"]
//! speak_command = ["espeak", "{text}"]
//! ```
//!
//! An empty command selects the matching `Disabled*` implementation, which
//! fails every call with a descriptive error.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::config::VoiceConfig;

#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("audio recording is not configured")]
    Unavailable,
    #[error("a recording is already in progress")]
    AlreadyRecording,
    #[error("recording file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("recorder command failed: {0}")]
    Command(String),
}

/// File-based recorder with at most one active recording.
#[async_trait]
pub trait AudioRecorder: Send + Sync {
    /// Starts recording and returns the output file path.
    async fn start(&self) -> Result<PathBuf, RecordingError>;
    /// Stops the active recording. Stopping when idle is a no-op.
    async fn stop(&self);
    /// Deletes the last output file, if any.
    async fn cleanup(&self);
}

/// Turns one recording into text.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio: &Path) -> Result<String>;
}

/// Speaks text. Fire-and-forget: returns once playback has been started.
/// Command-backed implementations must be called inside a Tokio runtime.
pub trait TextToSpeech: Send + Sync {
    fn speak(&self, text: &str) -> Result<()>;
}

fn expand(args: &[String], key: &str, value: &str) -> Vec<String> {
    args.iter().map(|a| a.replace(key, value)).collect()
}

// ============ Recorder ============

pub fn recorder_from_config(config: &VoiceConfig) -> Box<dyn AudioRecorder> {
    if config.record_command.is_empty() {
        Box::new(DisabledRecorder)
    } else {
        Box::new(CommandRecorder::new(
            config.record_command.clone(),
            config.recordings_dir.clone(),
        ))
    }
}

pub struct DisabledRecorder;

#[async_trait]
impl AudioRecorder for DisabledRecorder {
    async fn start(&self) -> Result<PathBuf, RecordingError> {
        Err(RecordingError::Unavailable)
    }
    async fn stop(&self) {}
    async fn cleanup(&self) {}
}

#[derive(Default)]
struct RecorderSlot {
    child: Option<Child>,
    output: Option<PathBuf>,
}

/// Records by running an external capture command until [`stop`](AudioRecorder::stop).
pub struct CommandRecorder {
    command: Vec<String>,
    dir: PathBuf,
    slot: Mutex<RecorderSlot>,
}

impl CommandRecorder {
    pub fn new(command: Vec<String>, dir: PathBuf) -> Self {
        Self {
            command,
            dir,
            slot: Mutex::new(RecorderSlot::default()),
        }
    }

    fn next_output_path(&self) -> PathBuf {
        self.dir
            .join(format!("recording_{}.wav", Utc::now().timestamp_millis()))
    }
}

#[async_trait]
impl AudioRecorder for CommandRecorder {
    async fn start(&self) -> Result<PathBuf, RecordingError> {
        let mut slot = self.slot.lock().await;
        if slot.child.is_some() {
            return Err(RecordingError::AlreadyRecording);
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.next_output_path();
        tokio::fs::File::create(&path).await?;
        slot.output = Some(path.clone());

        let args = expand(&self.command, "{path}", &path.to_string_lossy());
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| RecordingError::Command("empty record command".to_string()))?;

        let child = Command::new(program)
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RecordingError::Command(format!("{}: {}", program, e)))?;

        tracing::info!(path = %path.display(), "recording started");
        slot.child = Some(child);
        Ok(path)
    }

    async fn stop(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(mut child) = slot.child.take() {
            if let Err(e) = child.kill().await {
                tracing::debug!(error = %e, "recorder process already exited");
            }
            tracing::info!("recording stopped");
        }
    }

    async fn cleanup(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(path) = slot.output.take() {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::debug!(path = %path.display(), error = %e, "could not remove recording");
            }
        }
    }
}

// ============ Speech-to-text ============

pub fn transcriber_from_config(config: &VoiceConfig) -> Box<dyn SpeechToText> {
    if config.transcribe_command.is_empty() {
        Box::new(DisabledTranscriber)
    } else {
        Box::new(CommandTranscriber::new(config.transcribe_command.clone()))
    }
}

pub struct DisabledTranscriber;

#[async_trait]
impl SpeechToText for DisabledTranscriber {
    async fn transcribe(&self, _audio: &Path) -> Result<String> {
        bail!("Voice recognition not available")
    }
}

/// Runs a transcription command and takes its trimmed stdout as the transcript.
pub struct CommandTranscriber {
    command: Vec<String>,
}

impl CommandTranscriber {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl SpeechToText for CommandTranscriber {
    async fn transcribe(&self, audio: &Path) -> Result<String> {
        let args = expand(&self.command, "{path}", &audio.to_string_lossy());
        let Some((program, rest)) = args.split_first() else {
            bail!("empty transcribe command");
        };

        let output = Command::new(program)
            .args(rest)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to run transcriber: {}", program))?;

        if !output.status.success() {
            bail!(
                "Voice recognition error: {} exited with {}",
                program,
                output.status
            );
        }

        let transcript = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if transcript.is_empty() {
            bail!("Voice recognition error: empty transcript");
        }
        Ok(transcript)
    }
}

// ============ Text-to-speech ============

pub fn speaker_from_config(config: &VoiceConfig) -> Box<dyn TextToSpeech> {
    if config.speak_command.is_empty() {
        Box::new(DisabledSpeaker)
    } else {
        Box::new(CommandSpeaker::new(config.speak_command.clone()))
    }
}

pub struct DisabledSpeaker;

impl TextToSpeech for DisabledSpeaker {
    fn speak(&self, _text: &str) -> Result<()> {
        bail!("text-to-speech is not configured")
    }
}

/// Speaks through an external command such as `say` or `espeak`.
pub struct CommandSpeaker {
    command: Vec<String>,
}

impl CommandSpeaker {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl TextToSpeech for CommandSpeaker {
    fn speak(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            bail!("Cannot speak empty text");
        }

        let mut args = expand(&self.command, "{text}", text);
        if !self.command.iter().any(|a| a.contains("{text}")) {
            args.push(text.to_string());
        }
        let Some((program, rest)) = args.split_first() else {
            bail!("empty speak command");
        };

        let mut child = Command::new(program)
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to run speaker: {}", program))?;

        tokio::spawn(async move {
            if let Err(e) = child.wait().await {
                tracing::debug!(error = %e, "speaker process wait failed");
            }
        });
        Ok(())
    }
}
