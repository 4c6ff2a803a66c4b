//! Matchmaking transport collaborator interface
//!
//! The backend matchmaker is unseen: it may be a socket connection, a
//! long-poll loop, or anything else that can relay signals between two
//! matched participants. The client consumes its deliveries as
//! [`TransportEvent`]s on a channel and calls back through
//! [`MatchmakingTransport`]. Signals for a session must be delivered in the
//! order the backend emitted them; the client performs no reordering.

use async_trait::async_trait;
use pairlink_core::{PairlinkError, Signal};
use tokio::sync::mpsc;

/// Events the transport pushes into the client
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The backend assigned this participant a display identity
    IdentityAssigned {
        /// Assigned identity
        identity: String,
    },
    /// Periodic presence count from the backend
    OnlineCount {
        /// Number of participants currently online
        count: u64,
    },
    /// The search request was queued; no partner is available yet
    Waiting,
    /// The matchmaker produced a partner
    Matched {
        /// Partner identifier used for signal routing
        partner_id: String,
        /// Partner display identity, if the backend assigns one
        partner_identity: Option<String>,
        /// Whether the local side should produce the offer
        initiator: bool,
    },
    /// A signal from the current partner
    Signal(Signal),
    /// A chat message from the current partner
    Chat {
        /// Message text
        text: String,
    },
    /// The partner's typing state changed
    Typing {
        /// Whether the partner is typing
        typing: bool,
    },
    /// The partner left or disconnected
    PartnerLeft,
}

/// Receiving half of the transport's event channel
pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

/// Matchmaking and relay operations the client calls on its transport.
///
/// Implementations may batch or queue outgoing traffic; the client only
/// relies on eventual emission, not on delivery.
#[async_trait]
pub trait MatchmakingTransport: Send + Sync {
    /// Ask the matchmaker for a partner, with the current interest tags
    async fn find_partner(&self, interests: &[String]) -> Result<(), PairlinkError>;

    /// Withdraw an in-progress search
    async fn stop_search(&self) -> Result<(), PairlinkError>;

    /// Relay a signal to the current partner
    async fn send_signal(&self, signal: Signal) -> Result<(), PairlinkError>;

    /// Relay a chat message to the current partner
    async fn send_chat(&self, text: &str) -> Result<(), PairlinkError>;

    /// Update the partner's typing indicator
    async fn set_typing(&self, typing: bool) -> Result<(), PairlinkError>;

    /// Push updated interest tags to the matchmaker
    async fn update_interests(&self, interests: &[String]) -> Result<(), PairlinkError>;

    /// File a report against the current partner
    async fn report_partner(&self, reason: &str) -> Result<(), PairlinkError>;

    /// Announce departure; called once when the client shuts down
    async fn leave(&self) -> Result<(), PairlinkError>;
}
