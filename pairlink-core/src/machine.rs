//! Signaling state machine for a single peer session
//!
//! One dispatch entry point takes a tagged [`SessionEvent`] and returns the
//! [`Command`] effects the driver must run against its collaborators. The
//! machine performs no I/O: producing descriptions, applying them, and
//! carrying signals all happen outside and feed back in as further events.

use crate::session::{Phase, Role, Session};
use crate::signal::{IceCandidate, SdpKind, SessionDescription, Signal};
use tracing::{debug, warn};

/// ICE connection states reported by the peer resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceState {
    /// Gathering has not produced a usable pair yet
    New,
    /// Candidate pairs are being checked
    Checking,
    /// A usable candidate pair is active
    Connected,
    /// Checks finished with a usable pair
    Completed,
    /// Connectivity was lost
    Disconnected,
    /// No candidate pair could be established
    Failed,
    /// The peer resource was closed
    Closed,
}

impl IceState {
    /// Get the state as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            IceState::New => "new",
            IceState::Checking => "checking",
            IceState::Connected => "connected",
            IceState::Completed => "completed",
            IceState::Disconnected => "disconnected",
            IceState::Failed => "failed",
            IceState::Closed => "closed",
        }
    }

    /// Whether this state means the peer link is up
    pub fn is_up(&self) -> bool {
        matches!(self, IceState::Connected | IceState::Completed)
    }

    /// Whether this state means negotiation or the link has failed
    pub fn is_down(&self) -> bool {
        matches!(self, IceState::Failed | IceState::Disconnected)
    }
}

/// Input events for the state machine, tagged and dispatched one at a time
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The local participant asked to find a partner
    Start,
    /// The local participant asked to skip to the next partner
    Next,
    /// The local participant stopped the session
    Stop,
    /// The matchmaker produced a partner
    Matched {
        /// Partner identifier used for signal routing
        partner_id: String,
        /// Display identity assigned by the backend, if any
        partner_identity: Option<String>,
        /// Whether the local side produces the offer
        initiator: bool,
    },
    /// A signal arrived from the partner via the transport
    SignalReceived(Signal),
    /// The peer resource finished producing a local description
    LocalDescription {
        /// Which half of the exchange the description is
        kind: SdpKind,
        /// The produced description
        description: SessionDescription,
    },
    /// The peer resource surfaced a local ICE candidate
    LocalCandidate(IceCandidate),
    /// The peer resource's ICE connection state changed
    IceState(IceState),
    /// The partner left or disconnected
    PartnerLeft,
}

/// Effects the driver must execute after a dispatch.
///
/// Outbound signals are not commands: they accumulate on the session's
/// outbound queue and are drained with [`SignalingMachine::take_outbound`]
/// for the transport to flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Ask the matchmaker for a partner
    FindPartner,
    /// Tell the matchmaker to stop an in-progress search
    StopSearch,
    /// Create a fresh peer resource for the new match
    CreatePeer {
        /// Local role for the match
        role: Role,
    },
    /// Ask the peer resource to produce an offer description
    CreateOffer,
    /// Ask the peer resource to produce an answer description
    CreateAnswer,
    /// Apply the partner's description to the peer resource
    ApplyRemoteDescription {
        /// Which half of the exchange the description is
        kind: SdpKind,
        /// The partner's description
        description: SessionDescription,
    },
    /// Apply a remote candidate to the peer resource
    ApplyCandidate(IceCandidate),
    /// Close and release the peer resource
    TeardownPeer,
}

/// The signaling state machine.
///
/// Owns the [`Session`] exclusively; drivers mutate it only through
/// [`SignalingMachine::dispatch`] on a single event-processing task.
#[derive(Debug)]
pub struct SignalingMachine {
    session: Session,
    requeue_on_failure: bool,
}

impl SignalingMachine {
    /// Create a machine in the idle phase.
    ///
    /// With `requeue_on_failure` set, an ICE failure tears the session down
    /// and immediately re-enters the search, matching the original client's
    /// behavior; otherwise the machine parks in [`Phase::Failed`].
    pub fn new(requeue_on_failure: bool) -> Self {
        Self {
            session: Session::new(),
            requeue_on_failure,
        }
    }

    /// Read access to the owned session
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    /// Drain outbound signals queued by previous dispatches
    pub fn take_outbound(&mut self) -> Vec<Signal> {
        self.session.take_outbound()
    }

    /// Process one event and return the effects to run.
    ///
    /// Unexpected or out-of-order inputs are ignored with a log; nothing
    /// here is fatal to the session.
    pub fn dispatch(&mut self, event: SessionEvent) -> Vec<Command> {
        match event {
            SessionEvent::Start => self.on_start(),
            SessionEvent::Next => self.on_next(),
            SessionEvent::Stop => self.on_stop(),
            SessionEvent::Matched {
                partner_id,
                partner_identity,
                initiator,
            } => self.on_matched(partner_id, partner_identity, initiator),
            SessionEvent::SignalReceived(signal) => self.on_signal(signal),
            SessionEvent::LocalDescription { kind, description } => {
                self.on_local_description(kind, description)
            }
            SessionEvent::LocalCandidate(candidate) => self.on_local_candidate(candidate),
            SessionEvent::IceState(state) => self.on_ice_state(state),
            SessionEvent::PartnerLeft => self.on_partner_left(),
        }
    }

    fn on_start(&mut self) -> Vec<Command> {
        match self.phase() {
            Phase::Idle | Phase::Closed | Phase::Failed => {
                self.session.clear();
                self.session.set_phase(Phase::Searching);
                vec![Command::FindPartner]
            }
            phase => {
                // Duplicate-search guard: one active session per participant.
                debug!(phase = phase.as_str(), "ignoring start while active");
                vec![]
            }
        }
    }

    fn on_next(&mut self) -> Vec<Command> {
        let mut commands = Vec::new();
        if self.phase().has_partner() {
            commands.push(Command::TeardownPeer);
        }
        self.session.clear();
        self.session.set_phase(Phase::Searching);
        commands.push(Command::FindPartner);
        commands
    }

    fn on_stop(&mut self) -> Vec<Command> {
        let mut commands = Vec::new();
        if self.phase() == Phase::Searching {
            commands.push(Command::StopSearch);
        }
        if self.phase().has_partner() {
            commands.push(Command::TeardownPeer);
        }
        self.session.clear();
        self.session.set_phase(Phase::Closed);
        commands
    }

    fn on_matched(
        &mut self,
        partner_id: String,
        partner_identity: Option<String>,
        initiator: bool,
    ) -> Vec<Command> {
        if self.phase() != Phase::Searching {
            // The polling client guarded against duplicate matches; the
            // socket client did not and could race itself. Guard uniformly.
            warn!(
                phase = self.phase().as_str(),
                partner_id = %partner_id,
                "ignoring match outside of search"
            );
            return vec![];
        }

        let role = if initiator {
            Role::Initiator
        } else {
            Role::Responder
        };
        self.session.begin_match(partner_id, partner_identity, role);
        self.session.set_phase(Phase::Connecting);

        let mut commands = vec![Command::CreatePeer { role }];
        if role == Role::Initiator {
            commands.push(Command::CreateOffer);
        }
        commands
    }

    fn on_signal(&mut self, signal: Signal) -> Vec<Command> {
        if !self.phase().has_partner() {
            debug!(
                kind = signal.kind(),
                phase = self.phase().as_str(),
                "discarding signal without a session"
            );
            return vec![];
        }

        match signal {
            Signal::Offer(description) => self.on_remote_offer(description),
            Signal::Answer(description) => self.on_remote_answer(description),
            Signal::Candidate(candidate) => self.on_remote_candidate(candidate),
        }
    }

    fn on_remote_offer(&mut self, description: SessionDescription) -> Vec<Command> {
        if self.session.role() != Some(Role::Responder)
            || self.session.remote_description_set()
            || self.phase() != Phase::Connecting
        {
            warn!(phase = self.phase().as_str(), "ignoring unexpected offer");
            return vec![];
        }

        self.session.mark_remote_description();
        let mut commands = vec![Command::ApplyRemoteDescription {
            kind: SdpKind::Offer,
            description,
        }];
        commands.extend(self.session.drain_candidates().into_iter().map(Command::ApplyCandidate));
        commands.push(Command::CreateAnswer);
        commands
    }

    fn on_remote_answer(&mut self, description: SessionDescription) -> Vec<Command> {
        // Answers are meaningful only while a local offer is outstanding.
        if self.phase() != Phase::Connecting
            || self.session.role() != Some(Role::Initiator)
            || !self.session.offer_outstanding()
        {
            warn!(phase = self.phase().as_str(), "ignoring unexpected answer");
            return vec![];
        }

        self.session.mark_remote_description();
        let mut commands = vec![Command::ApplyRemoteDescription {
            kind: SdpKind::Answer,
            description,
        }];
        commands.extend(self.session.drain_candidates().into_iter().map(Command::ApplyCandidate));
        commands
    }

    fn on_remote_candidate(&mut self, candidate: IceCandidate) -> Vec<Command> {
        if self.session.remote_description_set() {
            vec![Command::ApplyCandidate(candidate)]
        } else {
            // Never applied before the remote description exists.
            debug!("buffering early remote candidate");
            self.session.buffer_candidate(candidate);
            vec![]
        }
    }

    fn on_local_description(
        &mut self,
        kind: SdpKind,
        description: SessionDescription,
    ) -> Vec<Command> {
        if self.phase() != Phase::Connecting {
            // Stale completion from a peer torn down mid-production.
            debug!(
                kind = kind.as_str(),
                phase = self.phase().as_str(),
                "discarding local description"
            );
            return vec![];
        }

        match (kind, self.session.role()) {
            (SdpKind::Offer, Some(Role::Initiator))
                if !self.session.offer_outstanding()
                    && !self.session.remote_description_set() =>
            {
                self.session.mark_offer_outstanding();
                self.session.push_outbound(Signal::Offer(description));
            }
            (SdpKind::Answer, Some(Role::Responder))
                if self.session.remote_description_set() =>
            {
                self.session.push_outbound(Signal::Answer(description));
            }
            (kind, role) => {
                warn!(
                    kind = kind.as_str(),
                    role = role.map(|r| r.as_str()).unwrap_or("none"),
                    "ignoring local description that does not fit the exchange"
                );
            }
        }
        vec![]
    }

    fn on_local_candidate(&mut self, candidate: IceCandidate) -> Vec<Command> {
        if self.phase().has_partner() {
            self.session.push_outbound(Signal::Candidate(candidate));
        } else {
            debug!("dropping local candidate without a partner");
        }
        vec![]
    }

    fn on_ice_state(&mut self, state: IceState) -> Vec<Command> {
        match self.phase() {
            Phase::Connecting if state.is_up() => {
                self.session.set_phase(Phase::Connected);
                vec![]
            }
            Phase::Connecting | Phase::Connected if state.is_down() => {
                self.session.clear();
                self.session.set_phase(Phase::Failed);
                let mut commands = vec![Command::TeardownPeer];
                if self.requeue_on_failure {
                    self.session.set_phase(Phase::Searching);
                    commands.push(Command::FindPartner);
                }
                commands
            }
            phase => {
                debug!(
                    phase = phase.as_str(),
                    state = state.as_str(),
                    "ignoring ice state change"
                );
                vec![]
            }
        }
    }

    fn on_partner_left(&mut self) -> Vec<Command> {
        if !self.phase().has_partner() {
            debug!(phase = self.phase().as_str(), "partner-left without a session");
            return vec![];
        }
        self.session.clear();
        self.session.set_phase(Phase::Closed);
        vec![Command::TeardownPeer]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matched(partner: &str, initiator: bool) -> SessionEvent {
        SessionEvent::Matched {
            partner_id: partner.to_string(),
            partner_identity: None,
            initiator,
        }
    }

    fn start_connecting(machine: &mut SignalingMachine, initiator: bool) {
        assert_eq!(machine.dispatch(SessionEvent::Start), vec![Command::FindPartner]);
        machine.dispatch(matched("p1", initiator));
        assert_eq!(machine.phase(), Phase::Connecting);
    }

    #[test]
    fn start_moves_idle_to_searching() {
        let mut machine = SignalingMachine::new(true);
        assert_eq!(machine.phase(), Phase::Idle);
        assert_eq!(machine.dispatch(SessionEvent::Start), vec![Command::FindPartner]);
        assert_eq!(machine.phase(), Phase::Searching);
    }

    #[test]
    fn duplicate_start_is_ignored() {
        let mut machine = SignalingMachine::new(true);
        machine.dispatch(SessionEvent::Start);
        assert!(machine.dispatch(SessionEvent::Start).is_empty());
        assert_eq!(machine.phase(), Phase::Searching);
    }

    #[test]
    fn initiator_match_creates_peer_and_offer() {
        let mut machine = SignalingMachine::new(true);
        machine.dispatch(SessionEvent::Start);
        let commands = machine.dispatch(matched("p1", true));
        assert_eq!(
            commands,
            vec![
                Command::CreatePeer { role: Role::Initiator },
                Command::CreateOffer
            ]
        );
        assert_eq!(machine.session().partner_id(), Some("p1"));
    }

    #[test]
    fn responder_match_only_creates_peer() {
        let mut machine = SignalingMachine::new(true);
        machine.dispatch(SessionEvent::Start);
        let commands = machine.dispatch(matched("p1", false));
        assert_eq!(commands, vec![Command::CreatePeer { role: Role::Responder }]);
    }

    #[test]
    fn duplicate_match_is_ignored() {
        let mut machine = SignalingMachine::new(true);
        start_connecting(&mut machine, true);
        assert!(machine.dispatch(matched("p2", false)).is_empty());
        assert_eq!(machine.session().partner_id(), Some("p1"));
    }

    #[test]
    fn initiator_emits_exactly_one_offer() {
        let mut machine = SignalingMachine::new(true);
        start_connecting(&mut machine, true);

        machine.dispatch(SessionEvent::LocalDescription {
            kind: SdpKind::Offer,
            description: SessionDescription::new("v=0 offer"),
        });
        // A second completion for the same exchange must not produce another.
        machine.dispatch(SessionEvent::LocalDescription {
            kind: SdpKind::Offer,
            description: SessionDescription::new("v=0 duplicate"),
        });

        let outbound = machine.take_outbound();
        assert_eq!(outbound, vec![Signal::offer("v=0 offer")]);
        assert!(machine.session().offer_outstanding());
    }

    #[test]
    fn early_candidates_buffer_until_offer_applied() {
        let mut machine = SignalingMachine::new(true);
        start_connecting(&mut machine, false);

        let first = IceCandidate::new("cand-1");
        let second = IceCandidate::new("cand-2");
        assert!(machine
            .dispatch(SessionEvent::SignalReceived(Signal::Candidate(first.clone())))
            .is_empty());
        assert!(machine
            .dispatch(SessionEvent::SignalReceived(Signal::Candidate(second.clone())))
            .is_empty());
        assert_eq!(machine.session().pending_candidates(), 2);

        let commands = machine.dispatch(SessionEvent::SignalReceived(Signal::offer("v=0")));
        assert_eq!(
            commands,
            vec![
                Command::ApplyRemoteDescription {
                    kind: SdpKind::Offer,
                    description: SessionDescription::new("v=0"),
                },
                Command::ApplyCandidate(first),
                Command::ApplyCandidate(second),
                Command::CreateAnswer,
            ]
        );
        assert_eq!(machine.session().pending_candidates(), 0);
    }

    #[test]
    fn candidates_apply_directly_once_description_is_set() {
        let mut machine = SignalingMachine::new(true);
        start_connecting(&mut machine, false);
        machine.dispatch(SessionEvent::SignalReceived(Signal::offer("v=0")));

        let late = IceCandidate::new("late");
        let commands =
            machine.dispatch(SessionEvent::SignalReceived(Signal::Candidate(late.clone())));
        assert_eq!(commands, vec![Command::ApplyCandidate(late)]);
    }

    #[test]
    fn answer_requires_outstanding_offer() {
        let mut machine = SignalingMachine::new(true);
        start_connecting(&mut machine, true);

        // No local offer has been produced yet, so the answer is a no-op.
        assert!(machine
            .dispatch(SessionEvent::SignalReceived(Signal::answer("v=0")))
            .is_empty());

        machine.dispatch(SessionEvent::LocalDescription {
            kind: SdpKind::Offer,
            description: SessionDescription::new("v=0 offer"),
        });
        let commands = machine.dispatch(SessionEvent::SignalReceived(Signal::answer("v=0")));
        assert_eq!(
            commands,
            vec![Command::ApplyRemoteDescription {
                kind: SdpKind::Answer,
                description: SessionDescription::new("v=0"),
            }]
        );
        assert!(!machine.session().offer_outstanding());

        // A second answer is out of order and ignored.
        assert!(machine
            .dispatch(SessionEvent::SignalReceived(Signal::answer("v=0 again")))
            .is_empty());
    }

    #[test]
    fn responder_ignores_answer_signals() {
        let mut machine = SignalingMachine::new(true);
        start_connecting(&mut machine, false);
        assert!(machine
            .dispatch(SessionEvent::SignalReceived(Signal::answer("v=0")))
            .is_empty());
    }

    #[test]
    fn ice_up_transitions_connecting_to_connected() {
        let mut machine = SignalingMachine::new(true);
        start_connecting(&mut machine, true);
        assert!(machine.dispatch(SessionEvent::IceState(IceState::Connected)).is_empty());
        assert_eq!(machine.phase(), Phase::Connected);

        // Completed after connected changes nothing.
        assert!(machine.dispatch(SessionEvent::IceState(IceState::Completed)).is_empty());
        assert_eq!(machine.phase(), Phase::Connected);
    }

    #[test]
    fn ice_failure_tears_down_and_requeues() {
        let mut machine = SignalingMachine::new(true);
        start_connecting(&mut machine, true);
        machine.dispatch(SessionEvent::IceState(IceState::Connected));

        let commands = machine.dispatch(SessionEvent::IceState(IceState::Failed));
        assert_eq!(commands, vec![Command::TeardownPeer, Command::FindPartner]);
        assert_eq!(machine.phase(), Phase::Searching);
        assert_eq!(machine.session().partner_id(), None);
        assert_eq!(machine.session().pending_candidates(), 0);
        assert_eq!(machine.session().queued_outbound(), 0);
    }

    #[test]
    fn ice_failure_without_requeue_parks_in_failed() {
        let mut machine = SignalingMachine::new(false);
        start_connecting(&mut machine, true);

        let commands = machine.dispatch(SessionEvent::IceState(IceState::Disconnected));
        assert_eq!(commands, vec![Command::TeardownPeer]);
        assert_eq!(machine.phase(), Phase::Failed);

        // Start is accepted again from Failed.
        assert_eq!(machine.dispatch(SessionEvent::Start), vec![Command::FindPartner]);
    }

    #[test]
    fn stop_closes_and_silences_later_signals() {
        let mut machine = SignalingMachine::new(true);
        start_connecting(&mut machine, false);
        machine.dispatch(SessionEvent::SignalReceived(Signal::offer("v=0")));

        let commands = machine.dispatch(SessionEvent::Stop);
        assert_eq!(commands, vec![Command::TeardownPeer]);
        assert_eq!(machine.phase(), Phase::Closed);

        // A stale transport delivery after teardown must not mutate anything.
        assert!(machine
            .dispatch(SessionEvent::SignalReceived(Signal::Candidate(IceCandidate::new("stale"))))
            .is_empty());
        assert!(machine
            .dispatch(SessionEvent::SignalReceived(Signal::offer("v=1")))
            .is_empty());
        assert_eq!(machine.session().pending_candidates(), 0);
        assert_eq!(machine.session().partner_id(), None);
    }

    #[test]
    fn stop_while_searching_cancels_the_search() {
        let mut machine = SignalingMachine::new(true);
        machine.dispatch(SessionEvent::Start);
        let commands = machine.dispatch(SessionEvent::Stop);
        assert_eq!(commands, vec![Command::StopSearch]);
        assert_eq!(machine.phase(), Phase::Closed);
    }

    #[test]
    fn next_tears_down_and_searches_again() {
        let mut machine = SignalingMachine::new(true);
        start_connecting(&mut machine, true);

        let commands = machine.dispatch(SessionEvent::Next);
        assert_eq!(commands, vec![Command::TeardownPeer, Command::FindPartner]);
        assert_eq!(machine.phase(), Phase::Searching);
        assert_eq!(machine.session().partner_id(), None);
    }

    #[test]
    fn partner_left_closes_the_session() {
        let mut machine = SignalingMachine::new(true);
        start_connecting(&mut machine, true);
        let commands = machine.dispatch(SessionEvent::PartnerLeft);
        assert_eq!(commands, vec![Command::TeardownPeer]);
        assert_eq!(machine.phase(), Phase::Closed);
    }

    #[test]
    fn local_candidates_queue_only_with_a_partner() {
        let mut machine = SignalingMachine::new(true);
        machine.dispatch(SessionEvent::Start);
        machine.dispatch(SessionEvent::LocalCandidate(IceCandidate::new("early")));
        assert!(machine.take_outbound().is_empty());

        machine.dispatch(matched("p1", true));
        machine.dispatch(SessionEvent::LocalCandidate(IceCandidate::new("cand")));
        assert_eq!(
            machine.take_outbound(),
            vec![Signal::Candidate(IceCandidate::new("cand"))]
        );
    }

    #[test]
    fn stale_local_description_after_close_is_discarded() {
        let mut machine = SignalingMachine::new(true);
        start_connecting(&mut machine, true);
        machine.dispatch(SessionEvent::Stop);

        machine.dispatch(SessionEvent::LocalDescription {
            kind: SdpKind::Offer,
            description: SessionDescription::new("v=0 late"),
        });
        assert!(machine.take_outbound().is_empty());
    }
}
