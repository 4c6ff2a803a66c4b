//! Session chat log and typing debounce

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Who produced a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatDirection {
    /// Sent by the local participant
    Sent,
    /// Received from the partner
    Received,
}

/// One chat message within a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message direction
    pub direction: ChatDirection,
    /// Message text
    pub text: String,
    /// When the message passed through the client
    pub at: DateTime<Utc>,
}

impl ChatMessage {
    /// Build a locally sent message stamped now
    pub fn sent(text: impl Into<String>) -> Self {
        Self {
            direction: ChatDirection::Sent,
            text: text.into(),
            at: Utc::now(),
        }
    }

    /// Build a received message stamped now
    pub fn received(text: impl Into<String>) -> Self {
        Self {
            direction: ChatDirection::Received,
            text: text.into(),
            at: Utc::now(),
        }
    }
}

/// Chat history for the current session.
///
/// Cleared when a new match begins, like the original client wiping the
/// message pane on skip.
#[derive(Debug, Default)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,
}

impl ChatLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Drop the history
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Messages in arrival order
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Number of messages held
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Debounce for outbound typing notifications.
///
/// Emits one leading `typing=true` per burst of input and expects the
/// caller to send `typing=false` when [`TypingTracker::poll_expired`]
/// reports the trailing edge, or when the message is sent.
#[derive(Debug)]
pub struct TypingTracker {
    timeout: Duration,
    active_until: Option<Instant>,
}

impl TypingTracker {
    /// Create a tracker with the given trailing timeout
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            active_until: None,
        }
    }

    /// Record a keystroke at `now`.
    ///
    /// Returns `true` when this keystroke starts a burst and a
    /// `typing=true` notification should go out.
    pub fn record_input(&mut self, now: Instant) -> bool {
        let starting = match self.active_until {
            Some(deadline) => now >= deadline,
            None => true,
        };
        self.active_until = Some(now + self.timeout);
        starting
    }

    /// Deadline at which the burst expires, if one is active
    pub fn deadline(&self) -> Option<Instant> {
        self.active_until
    }

    /// Check the trailing edge at `now`.
    ///
    /// Returns `true` once per burst, when a `typing=false` notification
    /// should go out.
    pub fn poll_expired(&mut self, now: Instant) -> bool {
        match self.active_until {
            Some(deadline) if now >= deadline => {
                self.active_until = None;
                true
            }
            _ => false,
        }
    }

    /// End the burst explicitly (e.g. the message was sent).
    ///
    /// Returns `true` if a burst was active and `typing=false` should go
    /// out.
    pub fn stop(&mut self) -> bool {
        self.active_until.take().is_some()
    }
}
