//! Session state for one matched pair

use crate::signal::{IceCandidate, Signal};
use std::collections::VecDeque;
use uuid::Uuid;

/// Local role in the offer/answer exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// This side produces the offer
    Initiator,
    /// This side answers a received offer
    Responder,
}

impl Role {
    /// Get the role as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Initiator => "initiator",
            Role::Responder => "responder",
        }
    }
}

/// Lifecycle phase of the local participant's session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Not started
    Idle,
    /// Waiting for the matchmaker to produce a partner
    Searching,
    /// Matched; offer/answer and ICE negotiation in progress
    Connecting,
    /// Peer connection established
    Connected,
    /// Negotiation or the established connection failed
    Failed,
    /// Torn down by stop or partner departure
    Closed,
}

impl Phase {
    /// Get the phase as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Searching => "searching",
            Phase::Connecting => "connecting",
            Phase::Connected => "connected",
            Phase::Failed => "failed",
            Phase::Closed => "closed",
        }
    }

    /// Whether a search or session is in progress
    pub fn is_active(&self) -> bool {
        matches!(self, Phase::Searching | Phase::Connecting | Phase::Connected)
    }

    /// Whether a matched partner currently exists
    pub fn has_partner(&self) -> bool {
        matches!(self, Phase::Connecting | Phase::Connected)
    }
}

/// State associated with one matched pair of participants, from match to
/// teardown.
///
/// Owned exclusively by the state machine; there is at most one active
/// session per local participant. All per-match state lives here rather
/// than in ambient globals, so teardown is a single [`Session::clear`].
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    phase: Phase,
    partner_id: Option<String>,
    partner_identity: Option<String>,
    role: Option<Role>,
    offer_outstanding: bool,
    remote_description_set: bool,
    pending_remote_candidates: VecDeque<IceCandidate>,
    outbound: VecDeque<Signal>,
}

impl Session {
    /// Create an idle session
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            phase: Phase::Idle,
            partner_id: None,
            partner_identity: None,
            role: None,
            offer_outstanding: false,
            remote_description_set: false,
            pending_remote_candidates: VecDeque::new(),
            outbound: VecDeque::new(),
        }
    }

    /// Session identifier; regenerated for every match
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Matched partner's identifier, if any
    pub fn partner_id(&self) -> Option<&str> {
        self.partner_id.as_deref()
    }

    /// Matched partner's display identity, if the backend assigned one
    pub fn partner_identity(&self) -> Option<&str> {
        self.partner_identity.as_deref()
    }

    /// Local role for the current match
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// Whether a local offer has been sent and no answer applied yet
    pub fn offer_outstanding(&self) -> bool {
        self.offer_outstanding
    }

    /// Whether the remote description has been applied
    pub fn remote_description_set(&self) -> bool {
        self.remote_description_set
    }

    /// Number of remote candidates buffered for the remote description
    pub fn pending_candidates(&self) -> usize {
        self.pending_remote_candidates.len()
    }

    /// Number of outbound signals awaiting transport flush
    pub fn queued_outbound(&self) -> usize {
        self.outbound.len()
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    /// Bind the session to a matched partner and assign the local role
    pub(crate) fn begin_match(
        &mut self,
        partner_id: String,
        partner_identity: Option<String>,
        role: Role,
    ) {
        self.id = Uuid::new_v4();
        self.partner_id = Some(partner_id);
        self.partner_identity = partner_identity;
        self.role = Some(role);
        self.offer_outstanding = false;
        self.remote_description_set = false;
        self.pending_remote_candidates.clear();
        self.outbound.clear();
    }

    pub(crate) fn mark_offer_outstanding(&mut self) {
        self.offer_outstanding = true;
    }

    pub(crate) fn mark_remote_description(&mut self) {
        self.remote_description_set = true;
        self.offer_outstanding = false;
    }

    /// Buffer a remote candidate that arrived before the remote description
    pub(crate) fn buffer_candidate(&mut self, candidate: IceCandidate) {
        self.pending_remote_candidates.push_back(candidate);
    }

    /// Drain buffered remote candidates in arrival order
    pub(crate) fn drain_candidates(&mut self) -> Vec<IceCandidate> {
        self.pending_remote_candidates.drain(..).collect()
    }

    /// Queue a signal for the transport
    pub(crate) fn push_outbound(&mut self, signal: Signal) {
        self.outbound.push_back(signal);
    }

    /// Drain queued outbound signals in emission order
    pub(crate) fn take_outbound(&mut self) -> Vec<Signal> {
        self.outbound.drain(..).collect()
    }

    /// Discard all per-match state; the phase is set by the caller
    pub(crate) fn clear(&mut self) {
        self.partner_id = None;
        self.partner_identity = None;
        self.role = None;
        self.offer_outstanding = false;
        self.remote_description_set = false;
        self.pending_remote_candidates.clear();
        self.outbound.clear();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
