//! Peer resource collaborator interface
//!
//! The peer resource is the WebRTC (or equivalent) stack that actually
//! produces descriptions and candidate pairs. The client never parses SDP;
//! it sequences the exchange and forwards opaque payloads both ways.

use async_trait::async_trait;
use pairlink_core::{IceCandidate, IceState, PairlinkError, Role, SdpKind, SessionDescription};
use tokio::sync::mpsc;

/// Events a live peer resource pushes into the client
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// A local candidate was gathered and should be signaled to the partner
    LocalCandidate(IceCandidate),
    /// The ICE connection state changed
    IceState(IceState),
}

/// A live peer resource for one session.
///
/// Created fresh for every match and closed at teardown; a handle is never
/// reused across sessions.
#[async_trait]
pub trait PeerHandle: Send {
    /// Produce an offer and install it as the local description
    async fn create_offer(&mut self) -> Result<SessionDescription, PairlinkError>;

    /// Produce an answer and install it as the local description.
    ///
    /// Valid only after the remote offer has been applied.
    async fn create_answer(&mut self) -> Result<SessionDescription, PairlinkError>;

    /// Apply the partner's description
    async fn set_remote_description(
        &mut self,
        kind: SdpKind,
        description: SessionDescription,
    ) -> Result<(), PairlinkError>;

    /// Apply a remote candidate.
    ///
    /// The client guarantees the remote description is already set.
    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), PairlinkError>;

    /// Close and release the resource. Events for this handle cease.
    async fn close(&mut self);
}

/// Creates peer resources and owns local media acquisition
#[async_trait]
pub trait PeerConnector: Send + Sync {
    /// Acquire or re-validate local media before a session starts.
    ///
    /// Failure is non-fatal: the client surfaces it and stays idle.
    async fn ensure_local_media(&self) -> Result<(), PairlinkError>;

    /// Create a fresh peer resource for a match, pushing its events into
    /// `events`
    async fn create_peer(
        &self,
        role: Role,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Box<dyn PeerHandle>, PairlinkError>;
}
