//! Event system for session and chat events

use crate::chat::ChatMessage;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Client events emitted to the embedding application
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The backend assigned this participant a display identity
    IdentityAssigned {
        /// Assigned identity
        identity: String,
    },
    /// Presence count update from the backend
    OnlineCount {
        /// Number of participants currently online
        count: u64,
    },
    /// A partner search began
    SearchStarted,
    /// The search is queued; no partner available yet
    WaitingForPartner,
    /// A partner was found and negotiation began
    MatchFound {
        /// Session identifier for correlating later events
        session_id: Uuid,
        /// Partner identifier
        partner_id: String,
        /// Partner display identity, if assigned
        partner_identity: Option<String>,
        /// Whether the local side produces the offer
        initiator: bool,
    },
    /// The peer connection was established
    PeerConnected {
        /// Session identifier
        session_id: Uuid,
    },
    /// Negotiation or the established connection failed
    ConnectionFailed {
        /// What failed
        reason: String,
    },
    /// The partner left the session
    PartnerLeft,
    /// The session was stopped locally
    Stopped,
    /// A chat message arrived from the partner
    ChatReceived {
        /// The message
        message: ChatMessage,
    },
    /// A locally sent chat message was handed to the transport
    ChatSent {
        /// The message
        message: ChatMessage,
    },
    /// The partner's typing state changed
    PartnerTyping {
        /// Whether the partner is typing
        typing: bool,
    },
    /// The local interest tags changed
    InterestsUpdated {
        /// Current interest tags
        interests: Vec<String>,
    },
    /// A recoverable error occurred
    Error {
        /// Error description
        error: String,
        /// Error code for programmatic handling
        code: String,
        /// Whether the session can continue
        recoverable: bool,
    },
}

impl ClientEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::IdentityAssigned { .. } => "identity_assigned",
            ClientEvent::OnlineCount { .. } => "online_count",
            ClientEvent::SearchStarted => "search_started",
            ClientEvent::WaitingForPartner => "waiting_for_partner",
            ClientEvent::MatchFound { .. } => "match_found",
            ClientEvent::PeerConnected { .. } => "peer_connected",
            ClientEvent::ConnectionFailed { .. } => "connection_failed",
            ClientEvent::PartnerLeft => "partner_left",
            ClientEvent::Stopped => "stopped",
            ClientEvent::ChatReceived { .. } => "chat_received",
            ClientEvent::ChatSent { .. } => "chat_sent",
            ClientEvent::PartnerTyping { .. } => "partner_typing",
            ClientEvent::InterestsUpdated { .. } => "interests_updated",
            ClientEvent::Error { .. } => "error",
        }
    }

    /// Check if this is a session lifecycle event
    pub fn is_session_event(&self) -> bool {
        matches!(
            self,
            ClientEvent::SearchStarted
                | ClientEvent::WaitingForPartner
                | ClientEvent::MatchFound { .. }
                | ClientEvent::PeerConnected { .. }
                | ClientEvent::ConnectionFailed { .. }
                | ClientEvent::PartnerLeft
                | ClientEvent::Stopped
        )
    }

    /// Check if this is a chat-related event
    pub fn is_chat_event(&self) -> bool {
        matches!(
            self,
            ClientEvent::ChatReceived { .. }
                | ClientEvent::ChatSent { .. }
                | ClientEvent::PartnerTyping { .. }
        )
    }

    /// Check if this is a presence/profile event
    pub fn is_presence_event(&self) -> bool {
        matches!(
            self,
            ClientEvent::IdentityAssigned { .. }
                | ClientEvent::OnlineCount { .. }
                | ClientEvent::InterestsUpdated { .. }
        )
    }

    /// Check if this is an error event
    pub fn is_error_event(&self) -> bool {
        matches!(self, ClientEvent::Error { .. })
    }
}

/// Stream of client events for async iteration
#[derive(Debug)]
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<ClientEvent>,
}

impl EventStream {
    /// Create a new event stream over a receiver
    pub fn new(receiver: mpsc::UnboundedReceiver<ClientEvent>) -> Self {
        Self { receiver }
    }

    /// Get the next event from the stream
    pub async fn next(&mut self) -> Option<ClientEvent> {
        self.receiver.recv().await
    }

    /// Try to get the next event without blocking
    pub fn try_next(&mut self) -> Result<Option<ClientEvent>, mpsc::error::TryRecvError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                Err(mpsc::error::TryRecvError::Disconnected)
            }
        }
    }

    /// Close the event stream
    pub fn close(&mut self) {
        self.receiver.close();
    }

    /// Check if the event stream is closed
    pub fn is_closed(&self) -> bool {
        self.receiver.is_closed()
    }
}

impl futures::Stream for EventStream {
    type Item = ClientEvent;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Event filter for selective event processing
#[derive(Debug, Clone)]
pub struct EventFilter {
    /// Whether to include session lifecycle events
    pub include_session_events: bool,
    /// Whether to include chat events
    pub include_chat_events: bool,
    /// Whether to include presence events
    pub include_presence_events: bool,
    /// Whether to include error events
    pub include_error_events: bool,
    /// Specific event types to include (overrides the category flags)
    pub specific_event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Create a filter that includes all events
    pub fn all() -> Self {
        Self {
            include_session_events: true,
            include_chat_events: true,
            include_presence_events: true,
            include_error_events: true,
            specific_event_types: None,
        }
    }

    /// Create a filter that includes only session lifecycle events
    pub fn session_only() -> Self {
        Self {
            include_session_events: true,
            include_chat_events: false,
            include_presence_events: false,
            include_error_events: false,
            specific_event_types: None,
        }
    }

    /// Create a filter that includes only chat events
    pub fn chat_only() -> Self {
        Self {
            include_session_events: false,
            include_chat_events: true,
            include_presence_events: false,
            include_error_events: false,
            specific_event_types: None,
        }
    }

    /// Create a filter for specific event types
    pub fn specific(event_types: Vec<String>) -> Self {
        Self {
            include_session_events: false,
            include_chat_events: false,
            include_presence_events: false,
            include_error_events: false,
            specific_event_types: Some(event_types),
        }
    }

    /// Check if an event should be included based on this filter
    pub fn should_include(&self, event: &ClientEvent) -> bool {
        if let Some(ref specific_types) = self.specific_event_types {
            return specific_types.iter().any(|t| t == event.event_type());
        }

        (self.include_session_events && event.is_session_event())
            || (self.include_chat_events && event.is_chat_event())
            || (self.include_presence_events && event.is_presence_event())
            || (self.include_error_events && event.is_error_event())
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// Filtered event stream that only yields events matching a filter
#[derive(Debug)]
pub struct FilteredEventStream {
    stream: EventStream,
    filter: EventFilter,
}

impl FilteredEventStream {
    /// Create a new filtered event stream
    pub fn new(stream: EventStream, filter: EventFilter) -> Self {
        Self { stream, filter }
    }

    /// Get the next event that matches the filter
    pub async fn next(&mut self) -> Option<ClientEvent> {
        loop {
            match self.stream.next().await {
                Some(event) if self.filter.should_include(&event) => return Some(event),
                Some(_) => continue,
                None => return None,
            }
        }
    }

    /// Try to get the next filtered event without blocking
    pub fn try_next(&mut self) -> Result<Option<ClientEvent>, mpsc::error::TryRecvError> {
        loop {
            match self.stream.try_next()? {
                Some(event) if self.filter.should_include(&event) => return Ok(Some(event)),
                Some(_) => continue,
                None => return Ok(None),
            }
        }
    }

    /// Update the filter
    pub fn set_filter(&mut self, filter: EventFilter) {
        self.filter = filter;
    }

    /// Get the current filter
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}
