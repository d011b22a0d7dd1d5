//! Conversation state.
//!
//! [`ConversationState`] is a plain value: every operation returns a new
//! state rather than mutating in place. [`SharedConversation`] is the single
//! shared container handed to every handler; it only ever swaps in whole
//! values produced by a caller-supplied function.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    VoiceInput,
    VoiceResponse,
    Error,
    System,
}

/// One turn in the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: String,
    pub content: String,
    pub origin: Origin,
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
    /// Path or URI of attached audio.
    pub media: Option<String>,
    /// `true` while a voice message waits for its transcript or response.
    pub processing: bool,
}

impl Message {
    pub fn new(content: impl Into<String>, origin: Origin, kind: MessageKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            origin,
            kind,
            timestamp: Utc::now(),
            media: None,
            processing: false,
        }
    }

    pub fn user_text(content: impl Into<String>) -> Self {
        Self::new(content, Origin::User, MessageKind::Text)
    }

    pub fn assistant(content: impl Into<String>, kind: MessageKind) -> Self {
        Self::new(content, Origin::Assistant, kind)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(content, Origin::Assistant, MessageKind::System)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(content, Origin::Assistant, MessageKind::Error)
    }

    /// A pending voice-input placeholder pointing at a recording.
    pub fn pending_voice(content: impl Into<String>, media: impl Into<String>) -> Self {
        Self {
            media: Some(media.into()),
            processing: true,
            ..Self::new(content, Origin::User, MessageKind::VoiceInput)
        }
    }
}

/// Snapshot of the conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConversationState {
    messages: Vec<Message>,
    pending_requests: usize,
    last_response: Option<String>,
}

impl ConversationState {
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// True while at least one generation request is in flight.
    pub fn is_loading(&self) -> bool {
        self.pending_requests > 0
    }

    /// Response waiting for one-shot voice playback.
    pub fn last_response(&self) -> Option<&str> {
        self.last_response.as_deref()
    }

    pub fn with_message(&self, message: Message) -> Self {
        let mut next = self.clone();
        next.messages.push(message);
        next
    }

    /// Applies `transform` to every pending message and marks it resolved.
    /// Messages that are not pending are left untouched.
    pub fn resolve_pending<F>(&self, transform: F) -> Self
    where
        F: Fn(&Message) -> String,
    {
        let mut next = self.clone();
        for msg in next.messages.iter_mut().filter(|m| m.processing) {
            msg.content = transform(msg);
            msg.processing = false;
        }
        next
    }

    pub fn has_pending(&self) -> bool {
        self.messages.iter().any(|m| m.processing)
    }

    pub fn with_last_response(&self, text: impl Into<String>) -> Self {
        Self {
            last_response: Some(text.into()),
            ..self.clone()
        }
    }

    /// Clears the playback side channel. Clearing twice is a no-op.
    pub fn clear_last_response(&self) -> Self {
        Self {
            last_response: None,
            ..self.clone()
        }
    }

    pub fn begin_request(&self) -> Self {
        Self {
            pending_requests: self.pending_requests + 1,
            ..self.clone()
        }
    }

    pub fn finish_request(&self) -> Self {
        Self {
            pending_requests: self.pending_requests.saturating_sub(1),
            ..self.clone()
        }
    }
}

/// Shared, lock-guarded conversation updated by whole-value replacement.
#[derive(Debug, Clone, Default)]
pub struct SharedConversation {
    inner: Arc<RwLock<ConversationState>>,
}

impl SharedConversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ConversationState {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replaces the state with `f(current)` under the write lock and
    /// returns the new state.
    pub fn update<F>(&self, f: F) -> ConversationState
    where
        F: FnOnce(&ConversationState) -> ConversationState,
    {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let next = f(&guard);
        *guard = next.clone();
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_keeps_insertion_order() {
        let state = ConversationState::default()
            .with_message(Message::user_text("one"))
            .with_message(Message::assistant("two", MessageKind::Text));
        let contents: Vec<&str> = state.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two"]);
    }

    #[test]
    fn test_functional_update_leaves_original_untouched() {
        let before = ConversationState::default();
        let after = before.with_message(Message::user_text("hi"));
        assert!(before.messages().is_empty());
        assert_eq!(after.messages().len(), 1);
    }

    #[test]
    fn test_resolve_pending_only_touches_pending() {
        let state = ConversationState::default()
            .with_message(Message::pending_voice("Voice message", "/tmp/a.wav"))
            .with_message(Message::user_text("typed"))
            .with_message(Message::pending_voice("Voice message", "/tmp/b.wav"));

        let resolved = state.resolve_pending(|m| format!("heard {}", m.media.as_deref().unwrap_or("")));

        assert!(!resolved.has_pending());
        assert_eq!(resolved.messages()[0].content, "heard /tmp/a.wav");
        assert_eq!(resolved.messages()[1], state.messages()[1]);
        assert_eq!(resolved.messages()[2].content, "heard /tmp/b.wav");
        assert_eq!(resolved.messages()[0].id, state.messages()[0].id);
    }

    #[test]
    fn test_clear_last_response_idempotent() {
        let state = ConversationState::default().with_last_response("spoken");
        assert_eq!(state.last_response(), Some("spoken"));
        let once = state.clear_last_response();
        let twice = once.clear_last_response();
        assert_eq!(once, twice);
        assert_eq!(twice.last_response(), None);
    }

    #[test]
    fn test_loading_counts_overlapping_requests() {
        let state = ConversationState::default().begin_request().begin_request();
        assert!(state.is_loading());
        let state = state.finish_request();
        assert!(state.is_loading());
        let state = state.finish_request().finish_request();
        assert!(!state.is_loading());
    }

    #[test]
    fn test_shared_update_is_visible_to_clones() {
        let shared = SharedConversation::new();
        let other = shared.clone();
        shared.update(|s| s.with_message(Message::system("ready")));
        assert_eq!(other.snapshot().messages().len(), 1);
        assert_eq!(other.snapshot().messages()[0].kind, MessageKind::System);
    }
}
