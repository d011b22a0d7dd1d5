//! Chat session: the pipeline behind every presentation surface.
//!
//! A [`ChatSession`] owns the gateway, the knowledge store, the voice
//! collaborators and the [`SharedConversation`]. Each operation catches its
//! own failures and records them as `system` or `error` messages; nothing is
//! returned to the caller as an error and nothing is retried.
//!
//! ```text
//! text ──▶ send_message ───────────────────────────────┐
//! text ──▶ send_message_to_json ─▶ load ─▶ search ─▶ compose ─┤
//! voice ─▶ stop_recording ─▶ transcribe_recording ─▶ process_voice_input ─┤
//!                                                       ▼
//!                                    generation slot ─▶ gateway ─▶ conversation
//! ```
//!
//! Generation requests are serialized through a single slot, so at most one
//! request is outstanding at a time. Overlapping callers wait their turn;
//! `is_loading` stays true until the last of them completes.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio::sync::OnceCell;

use crate::config::Config;
use crate::conversation::{ConversationState, Message, MessageKind, Origin, SharedConversation};
use crate::gateway::{GatewayError, GeminiGateway, ResponseGateway};
use crate::knowledge::{Document, KnowledgeStore, LoadError};
use crate::matcher::{self, MatchResult};
use crate::prompt::{self, Prompt};
use crate::voice::{
    recorder_from_config, speaker_from_config, transcriber_from_config, AudioRecorder,
    DisabledRecorder, DisabledSpeaker, DisabledTranscriber, SpeechToText, TextToSpeech,
};

/// Content of the placeholder appended when a recording stops.
pub const VOICE_PLACEHOLDER: &str = "Voice message";
/// Content given to pending voice messages whose turn failed.
pub const VOICE_FAILED: &str = "Error processing";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Recording(PathBuf),
    Failed(String),
}

pub struct ChatSession {
    gateway: Arc<dyn ResponseGateway>,
    knowledge: KnowledgeStore,
    asset: String,
    document: OnceCell<Arc<Document>>,
    conversation: SharedConversation,
    last_matches: Mutex<Option<MatchResult>>,
    generation_slot: tokio::sync::Mutex<()>,
    recorder: Box<dyn AudioRecorder>,
    transcriber: Box<dyn SpeechToText>,
    speaker: Box<dyn TextToSpeech>,
    recording: tokio::sync::Mutex<RecordingState>,
    last_recording: tokio::sync::Mutex<Option<PathBuf>>,
}

impl ChatSession {
    /// Creates a session with voice collaborators disabled.
    pub fn new(
        gateway: Arc<dyn ResponseGateway>,
        knowledge: KnowledgeStore,
        asset: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            knowledge,
            asset: asset.into(),
            document: OnceCell::new(),
            conversation: SharedConversation::new(),
            last_matches: Mutex::new(None),
            generation_slot: tokio::sync::Mutex::new(()),
            recorder: Box::new(DisabledRecorder),
            transcriber: Box::new(DisabledTranscriber),
            speaker: Box::new(DisabledSpeaker),
            recording: tokio::sync::Mutex::new(RecordingState::Idle),
            last_recording: tokio::sync::Mutex::new(None),
        }
    }

    pub fn with_voice(
        mut self,
        recorder: Box<dyn AudioRecorder>,
        transcriber: Box<dyn SpeechToText>,
        speaker: Box<dyn TextToSpeech>,
    ) -> Self {
        self.recorder = recorder;
        self.transcriber = transcriber;
        self.speaker = speaker;
        self
    }

    /// Wires the Gemini gateway, the configured asset and the voice commands.
    pub fn from_config(config: &Config) -> Result<Self> {
        let gateway = GeminiGateway::from_config(&config.gateway)?;
        Ok(Self::new(
            Arc::new(gateway),
            KnowledgeStore::new(&config.knowledge.assets_dir),
            &config.knowledge.asset,
        )
        .with_voice(
            recorder_from_config(&config.voice),
            transcriber_from_config(&config.voice),
            speaker_from_config(&config.voice),
        ))
    }

    pub fn conversation(&self) -> ConversationState {
        self.conversation.snapshot()
    }

    pub fn shared_conversation(&self) -> SharedConversation {
        self.conversation.clone()
    }

    /// Result of the most recent knowledge-base search; `None` until one ran.
    pub fn last_matches(&self) -> Option<MatchResult> {
        self.last_matches
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub async fn recording_state(&self) -> RecordingState {
        self.recording.lock().await.clone()
    }

    /// Loads the knowledge document on first use. A failed load is retried
    /// on the next call.
    pub async fn document(&self) -> Result<Arc<Document>, LoadError> {
        let doc = self
            .document
            .get_or_try_init(|| async {
                let doc = self.knowledge.load(&self.asset)?;
                tracing::info!(asset = %self.asset, entries = doc.len(), "knowledge base loaded");
                Ok::<_, LoadError>(Arc::new(doc))
            })
            .await?;
        Ok(doc.clone())
    }

    /// Searches the knowledge base and remembers the result.
    pub async fn search(&self, query: &str) -> Result<MatchResult, LoadError> {
        let doc = self.document().await?;
        let matches = matcher::search(query, &doc);
        tracing::debug!(query, matches = matches.len(), "knowledge search");
        *self.last_matches.lock().unwrap_or_else(|p| p.into_inner()) = Some(matches.clone());
        Ok(matches)
    }

    /// Builds the knowledge-base prompt for `question` without sending it.
    pub async fn compose_prompt(&self, question: &str) -> Result<Prompt, LoadError> {
        let matches = self.search(question).await?;
        Ok(prompt::compose(question, matches.records()))
    }

    /// Sends `text` to the gateway as-is. Blank input is ignored.
    pub async fn send_message(&self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        self.conversation
            .update(|s| s.with_message(Message::user_text(text)).begin_request());

        let result = self.generate(text).await;
        self.complete_text_turn(result);
    }

    /// Sends `text` enriched with knowledge-base matches. Blank input is ignored.
    ///
    /// A knowledge base that cannot be loaded ends the turn with a system
    /// message; the gateway is not called.
    pub async fn send_message_to_json(&self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        self.conversation
            .update(|s| s.with_message(Message::user_text(text)).begin_request());

        let prompt = match self.compose_prompt(text).await {
            Ok(prompt) => prompt,
            Err(e) => {
                tracing::warn!(error = %e, "knowledge base unavailable");
                self.conversation.update(|s| {
                    s.with_message(Message::system(format!("Error: {}", e)))
                        .finish_request()
                });
                return;
            }
        };

        let result = self.generate(prompt.as_str()).await;
        self.complete_text_turn(result);
    }

    /// Answers a transcribed utterance.
    ///
    /// Pending voice messages resolve to the transcript on success and to
    /// [`VOICE_FAILED`] on failure. Without a pending placeholder the
    /// transcript is logged as a voice-input message first.
    ///
    /// A blank transcript is ignored, unless a recording or placeholder is
    /// waiting for it; then the voice turn fails.
    pub async fn process_voice_input(&self, transcript: &str) {
        let voice_turn = self.last_recording.lock().await.take().is_some();
        if transcript.trim().is_empty() {
            if voice_turn || self.conversation.snapshot().has_pending() {
                tracing::warn!("empty transcript for pending voice message");
                self.fail_voice_turn("Voice recognition error: empty transcript");
            }
            return;
        }

        self.conversation.update(|s| {
            let s = if s.has_pending() {
                s.clone()
            } else {
                s.with_message(Message::new(transcript, Origin::User, MessageKind::VoiceInput))
            };
            s.begin_request()
        });

        let result = self.generate(transcript).await;

        let kind = if voice_turn {
            MessageKind::VoiceResponse
        } else {
            MessageKind::Text
        };
        self.conversation.update(|s| {
            let next = match &result {
                Ok(response) => s
                    .resolve_pending(|_| transcript.to_string())
                    .with_message(Message::assistant(response.as_str(), kind))
                    .with_last_response(response.as_str()),
                Err(e) => s
                    .resolve_pending(|_| VOICE_FAILED.to_string())
                    .with_message(Message::error(format!("Error: {}", e))),
            };
            next.finish_request()
        });
    }

    /// Starts the recorder. Failures are logged to the conversation.
    pub async fn start_recording(&self) {
        let mut recording = self.recording.lock().await;
        match self.recorder.start().await {
            Ok(path) => {
                *recording = RecordingState::Recording(path);
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not start recording");
                *recording = RecordingState::Failed(e.to_string());
                self.recorder.cleanup().await;
                self.conversation.update(|s| {
                    s.with_message(Message::error(format!("Recording failed: {}", e)))
                });
            }
        }
    }

    /// Stops the recorder and appends a pending voice placeholder.
    pub async fn stop_recording(&self) {
        let previous = {
            let mut recording = self.recording.lock().await;
            std::mem::replace(&mut *recording, RecordingState::Idle)
        };
        self.recorder.stop().await;

        match previous {
            RecordingState::Recording(path) => {
                let media = path.to_string_lossy().to_string();
                *self.last_recording.lock().await = Some(path);
                self.conversation
                    .update(|s| s.with_message(Message::pending_voice(VOICE_PLACEHOLDER, media)));
            }
            _ => {
                self.conversation.update(|s| {
                    s.with_message(Message::error(
                        "Recording failed: Recording file path not found",
                    ))
                });
            }
        }
    }

    /// Transcribes the last stopped recording and answers it.
    pub async fn transcribe_recording(&self) {
        let path = self.last_recording.lock().await.clone();
        let Some(path) = path else {
            self.conversation
                .update(|s| s.with_message(Message::error("No recording to transcribe")));
            return;
        };

        match self.transcriber.transcribe(&path).await {
            Ok(transcript) => self.process_voice_input(&transcript).await,
            Err(e) => {
                tracing::warn!(error = %e, "transcription failed");
                *self.last_recording.lock().await = None;
                self.fail_voice_turn(&e.to_string());
            }
        }
    }

    /// Plays the pending response once, then clears it. Returns whether
    /// anything was handed to the speaker.
    pub fn speak_last_response(&self) -> bool {
        let mut taken = None;
        self.conversation.update(|s| {
            taken = s.last_response().map(str::to_string);
            s.clear_last_response()
        });
        let Some(text) = taken else {
            return false;
        };
        match self.speaker.speak(&text) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "text-to-speech failed");
                false
            }
        }
    }

    pub fn clear_last_response(&self) {
        self.conversation.update(|s| s.clear_last_response());
    }

    pub fn add_system_message(&self, content: &str) {
        self.conversation
            .update(|s| s.with_message(Message::system(content)));
    }

    fn fail_voice_turn(&self, error: &str) {
        self.conversation.update(|s| {
            s.resolve_pending(|_| VOICE_FAILED.to_string())
                .with_message(Message::error(error))
        });
    }

    async fn generate(&self, prompt: &str) -> Result<String, GatewayError> {
        let _slot = self.generation_slot.lock().await;
        let result = self.gateway.generate(prompt).await;
        if let Err(e) = &result {
            tracing::warn!(code = e.code(), "generation failed");
        }
        result
    }

    fn complete_text_turn(&self, result: Result<String, GatewayError>) {
        self.conversation.update(|s| {
            let next = match &result {
                Ok(response) => s
                    .with_message(Message::assistant(response.as_str(), MessageKind::Text))
                    .with_last_response(response.as_str()),
                Err(e) => s.with_message(Message::error(format!("Error: {}", e))),
            };
            next.finish_request()
        });
    }
}
