//! Client handle and the session controller task
//!
//! The controller is the single event-processing task the whole crate runs
//! on: transport deliveries, peer resource events, and caller requests all
//! funnel into one loop that drives the signaling machine and executes its
//! commands. Nothing else mutates session state.

use crate::chat::{ChatLog, ChatMessage, TypingTracker};
use crate::config::ClientConfig;
use crate::event::{ClientEvent, EventStream};
use crate::peer::{PeerConnector, PeerEvent, PeerHandle};
use crate::transport::{MatchmakingTransport, TransportEvent, TransportEvents};
use pairlink_core::{
    Command, IceState, PairlinkError, Phase, Role, SdpKind, SessionEvent, SignalingMachine,
    SyncSchedule,
};
#[cfg(feature = "diagnostics")]
use pairlink_diagnostics::{NegotiationTimeline, SessionStats, SignalTally};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Requests from the [`Client`] handle to the controller task
enum Request {
    Start(oneshot::Sender<Result<(), PairlinkError>>),
    Next(oneshot::Sender<Result<(), PairlinkError>>),
    Stop,
    SendChat {
        text: String,
        reply: oneshot::Sender<Result<(), PairlinkError>>,
    },
    NotifyTyping,
    SetInterests(Vec<String>),
    Report {
        reason: String,
        reply: oneshot::Sender<Result<(), PairlinkError>>,
    },
    ChatHistory(oneshot::Sender<Vec<ChatMessage>>),
    #[cfg(feature = "diagnostics")]
    Stats(oneshot::Sender<SessionStats>),
    Shutdown,
}

/// State shared between the handle and the controller task
#[derive(Debug)]
struct Shared {
    phase: RwLock<Phase>,
    schedule: Mutex<SyncSchedule>,
}

/// Fluent builder for a [`Client`]
pub struct ClientBuilder {
    transport: Arc<dyn MatchmakingTransport>,
    connector: Arc<dyn PeerConnector>,
    transport_events: TransportEvents,
    config: ClientConfig,
}

impl ClientBuilder {
    /// Replace the whole configuration
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the interest tags sent with matchmaking requests
    pub fn interests<I, S>(mut self, interests: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.interests = interests.into_iter().map(Into::into).collect();
        self
    }

    /// Whether an ICE failure automatically re-enters the search
    pub fn requeue_on_failure(mut self, requeue: bool) -> Self {
        self.config.requeue_on_failure = requeue;
        self
    }

    /// Silence after the last keystroke before typing clears
    pub fn typing_timeout(mut self, timeout: Duration) -> Self {
        self.config.typing_timeout = timeout;
        self
    }

    /// Spawn the controller task and return the handle and event stream.
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn(self) -> (Client, EventStream) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            phase: RwLock::new(Phase::Idle),
            schedule: Mutex::new(SyncSchedule::new(self.config.sync.clone())),
        });

        let controller = Controller {
            machine: SignalingMachine::new(self.config.requeue_on_failure),
            transport: self.transport,
            connector: self.connector,
            peer: None,
            peer_events: None,
            transport_events: self.transport_events,
            requests: requests_rx,
            events: events_tx,
            shared: Arc::clone(&shared),
            interests: self.config.interests.clone(),
            chat: ChatLog::new(),
            typing: TypingTracker::new(self.config.typing_timeout),
            media_ready: false,
            #[cfg(feature = "diagnostics")]
            timeline: NegotiationTimeline::new(),
            #[cfg(feature = "diagnostics")]
            tally: SignalTally::new(),
        };
        tokio::spawn(controller.run());

        (
            Client {
                requests: requests_tx,
                shared,
            },
            EventStream::new(events_rx),
        )
    }
}

/// Handle to a running pairlink client.
///
/// Cheap to clone; all clones talk to the same controller task.
#[derive(Debug, Clone)]
pub struct Client {
    requests: mpsc::UnboundedSender<Request>,
    shared: Arc<Shared>,
}

impl Client {
    /// Create a builder over the two collaborators and the transport's
    /// event channel
    pub fn builder(
        transport: Arc<dyn MatchmakingTransport>,
        connector: Arc<dyn PeerConnector>,
        transport_events: TransportEvents,
    ) -> ClientBuilder {
        ClientBuilder {
            transport,
            connector,
            transport_events,
            config: ClientConfig::default(),
        }
    }

    /// Acquire local media and start searching for a partner.
    ///
    /// Fails with [`PairlinkError::MediaUnavailable`] when media cannot be
    /// acquired; the session stays idle and `start` may be retried.
    pub async fn start(&self) -> Result<(), PairlinkError> {
        self.request(Request::Start).await?
    }

    /// Skip the current partner (if any) and search again
    pub async fn next(&self) -> Result<(), PairlinkError> {
        self.request(Request::Next).await?
    }

    /// Stop the session and withdraw from matchmaking
    pub fn stop(&self) -> Result<(), PairlinkError> {
        self.send(Request::Stop)
    }

    /// Send a chat message to the current partner
    pub async fn send_chat(&self, text: impl Into<String>) -> Result<(), PairlinkError> {
        let text = text.into();
        let (reply, response) = oneshot::channel();
        self.send(Request::SendChat { text, reply })?;
        response.await.map_err(|_| PairlinkError::ClientClosed)?
    }

    /// Record a keystroke for the typing indicator
    pub fn notify_typing(&self) -> Result<(), PairlinkError> {
        self.send(Request::NotifyTyping)
    }

    /// Replace the interest tags used for matchmaking
    pub fn set_interests<I, S>(&self, interests: I) -> Result<(), PairlinkError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.send(Request::SetInterests(
            interests.into_iter().map(Into::into).collect(),
        ))
    }

    /// Report the current partner, then skip to the next one
    pub async fn report(&self, reason: impl Into<String>) -> Result<(), PairlinkError> {
        let reason = reason.into();
        let (reply, response) = oneshot::channel();
        self.send(Request::Report { reason, reply })?;
        response.await.map_err(|_| PairlinkError::ClientClosed)?
    }

    /// Chat history for the current session
    pub async fn chat_history(&self) -> Result<Vec<ChatMessage>, PairlinkError> {
        let (reply, response) = oneshot::channel();
        self.send(Request::ChatHistory(reply))?;
        response.await.map_err(|_| PairlinkError::ClientClosed)
    }

    /// Negotiation metrics for the current client
    #[cfg(feature = "diagnostics")]
    pub async fn stats(&self) -> Result<SessionStats, PairlinkError> {
        let (reply, response) = oneshot::channel();
        self.send(Request::Stats(reply))?;
        response.await.map_err(|_| PairlinkError::ClientClosed)
    }

    /// Shut the controller task down
    pub fn shutdown(&self) {
        let _ = self.requests.send(Request::Shutdown);
    }

    /// Current session phase
    pub fn phase(&self) -> Phase {
        *self.shared.phase.read()
    }

    /// For polling transports: how long to wait before the next sync round
    pub fn next_sync_interval(&self) -> Duration {
        let phase = self.phase();
        self.shared.schedule.lock().next_interval(phase)
    }

    /// For polling transports: record a round that carried data
    pub fn record_sync_activity(&self) {
        self.shared.schedule.lock().record_activity();
    }

    /// For polling transports: record a round that returned nothing
    pub fn record_sync_empty(&self) {
        self.shared.schedule.lock().record_empty();
    }

    fn send(&self, request: Request) -> Result<(), PairlinkError> {
        self.requests
            .send(request)
            .map_err(|_| PairlinkError::ClientClosed)
    }

    async fn request<F, T>(&self, make: F) -> Result<T, PairlinkError>
    where
        F: FnOnce(oneshot::Sender<T>) -> Request,
    {
        let (reply, response) = oneshot::channel();
        self.send(make(reply))?;
        response.await.map_err(|_| PairlinkError::ClientClosed)
    }
}

/// The controller task state
struct Controller {
    machine: SignalingMachine,
    transport: Arc<dyn MatchmakingTransport>,
    connector: Arc<dyn PeerConnector>,
    peer: Option<Box<dyn PeerHandle>>,
    peer_events: Option<mpsc::UnboundedReceiver<PeerEvent>>,
    transport_events: TransportEvents,
    requests: mpsc::UnboundedReceiver<Request>,
    events: mpsc::UnboundedSender<ClientEvent>,
    shared: Arc<Shared>,
    interests: Vec<String>,
    chat: ChatLog,
    typing: TypingTracker,
    media_ready: bool,
    #[cfg(feature = "diagnostics")]
    timeline: NegotiationTimeline,
    #[cfg(feature = "diagnostics")]
    tally: SignalTally,
}

impl Controller {
    async fn run(mut self) {
        loop {
            let typing_deadline = self.typing.deadline();
            tokio::select! {
                maybe_request = self.requests.recv() => match maybe_request {
                    Some(Request::Shutdown) | None => break,
                    Some(request) => self.handle_request(request).await,
                },
                peer_event = Self::next_peer_event(&mut self.peer_events) => match peer_event {
                    Some(event) => self.handle_peer_event(event).await,
                    None => self.peer_events = None,
                },
                maybe_event = self.transport_events.recv() => match maybe_event {
                    Some(event) => self.handle_transport_event(event).await,
                    None => {
                        warn!("transport event channel closed");
                        break;
                    }
                },
                _ = Self::sleep_until(typing_deadline) => {
                    if self.typing.poll_expired(Instant::now()) {
                        if let Err(error) = self.transport.set_typing(false).await {
                            debug!(error = %error, "clearing typing failed");
                        }
                    }
                },
            }
        }

        self.teardown_peer().await;
        if let Err(error) = self.transport.leave().await {
            debug!(error = %error, "leave failed");
        }
        *self.shared.phase.write() = Phase::Closed;
    }

    /// Await the next peer event, or never if no peer resource is live
    async fn next_peer_event(
        events: &mut Option<mpsc::UnboundedReceiver<PeerEvent>>,
    ) -> Option<PeerEvent> {
        match events {
            Some(receiver) => receiver.recv().await,
            None => std::future::pending().await,
        }
    }

    /// Await a typing deadline, or never if no burst is active
    async fn sleep_until(deadline: Option<Instant>) {
        match deadline {
            Some(deadline) => {
                tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await
            }
            None => std::future::pending().await,
        }
    }

    async fn handle_request(&mut self, request: Request) {
        match request {
            Request::Start(reply) => {
                let result = self.begin(SessionEvent::Start).await;
                let _ = reply.send(result);
            }
            Request::Next(reply) => {
                let result = self.begin(SessionEvent::Next).await;
                let _ = reply.send(result);
            }
            Request::Stop => {
                self.step(SessionEvent::Stop).await;
                self.emit(ClientEvent::Stopped);
            }
            Request::SendChat { text, reply } => {
                let _ = reply.send(self.send_chat(text).await);
            }
            Request::NotifyTyping => {
                if self.machine.phase().has_partner() && self.typing.record_input(Instant::now())
                {
                    if let Err(error) = self.transport.set_typing(true).await {
                        debug!(error = %error, "set_typing failed");
                    }
                }
            }
            Request::SetInterests(interests) => {
                self.interests = interests.clone();
                if let Err(error) = self.transport.update_interests(&interests).await {
                    warn!(error = %error, "update_interests failed");
                }
                self.emit(ClientEvent::InterestsUpdated { interests });
            }
            Request::Report { reason, reply } => {
                let _ = reply.send(self.report(reason).await);
            }
            Request::ChatHistory(reply) => {
                let _ = reply.send(self.chat.messages().to_vec());
            }
            #[cfg(feature = "diagnostics")]
            Request::Stats(reply) => {
                let _ = reply.send(SessionStats::snapshot(&self.timeline, &self.tally));
            }
            Request::Shutdown => {}
        }
    }

    /// Start or skip, acquiring local media first if needed.
    ///
    /// A media failure is surfaced to the caller and leaves the session
    /// idle.
    async fn begin(&mut self, event: SessionEvent) -> Result<(), PairlinkError> {
        if !self.media_ready {
            self.connector.ensure_local_media().await?;
            self.media_ready = true;
        }
        self.step(event).await;
        Ok(())
    }

    async fn send_chat(&mut self, text: String) -> Result<(), PairlinkError> {
        if !self.machine.phase().has_partner() {
            return Err(PairlinkError::NoActivePartner {
                operation: "chat".to_string(),
            });
        }
        self.transport.send_chat(&text).await?;
        if self.typing.stop() {
            if let Err(error) = self.transport.set_typing(false).await {
                debug!(error = %error, "clearing typing failed");
            }
        }
        let message = ChatMessage::sent(text);
        self.chat.push(message.clone());
        self.emit(ClientEvent::ChatSent { message });
        Ok(())
    }

    async fn report(&mut self, reason: String) -> Result<(), PairlinkError> {
        if !self.machine.phase().has_partner() {
            return Err(PairlinkError::NoActivePartner {
                operation: "report".to_string(),
            });
        }
        self.transport.report_partner(&reason).await?;
        // Reporting always moves on to the next partner.
        self.step(SessionEvent::Next).await;
        Ok(())
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::IdentityAssigned { identity } => {
                self.emit(ClientEvent::IdentityAssigned { identity });
            }
            TransportEvent::OnlineCount { count } => {
                self.emit(ClientEvent::OnlineCount { count });
            }
            TransportEvent::Waiting => {
                if self.machine.phase() == Phase::Searching {
                    self.emit(ClientEvent::WaitingForPartner);
                }
            }
            TransportEvent::Matched {
                partner_id,
                partner_identity,
                initiator,
            } => {
                self.step(SessionEvent::Matched {
                    partner_id,
                    partner_identity,
                    initiator,
                })
                .await;
            }
            TransportEvent::Signal(signal) => {
                self.step(SessionEvent::SignalReceived(signal)).await;
            }
            TransportEvent::Chat { text } => {
                if self.machine.phase().has_partner() {
                    let message = ChatMessage::received(text);
                    self.chat.push(message.clone());
                    self.emit(ClientEvent::ChatReceived { message });
                } else {
                    debug!("dropping chat without a session");
                }
            }
            TransportEvent::Typing { typing } => {
                if self.machine.phase().has_partner() {
                    self.emit(ClientEvent::PartnerTyping { typing });
                }
            }
            TransportEvent::PartnerLeft => {
                let had_partner = self.machine.phase().has_partner();
                self.step(SessionEvent::PartnerLeft).await;
                if had_partner {
                    self.emit(ClientEvent::PartnerLeft);
                }
            }
        }
    }

    async fn handle_peer_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::LocalCandidate(candidate) => {
                self.step(SessionEvent::LocalCandidate(candidate)).await;
            }
            PeerEvent::IceState(state) => {
                if state.is_down() && self.machine.phase().has_partner() {
                    self.emit(ClientEvent::ConnectionFailed {
                        reason: format!("ice connection {}", state.as_str()),
                    });
                }
                self.step(SessionEvent::IceState(state)).await;
            }
        }
    }

    /// Drive one event (and any follow-ups it produces) through the
    /// machine, executing commands and flushing outbound signals after
    /// every dispatch.
    async fn step(&mut self, event: SessionEvent) {
        let mut queue = VecDeque::new();
        queue.push_back(event);

        while let Some(event) = queue.pop_front() {
            let before = self.machine.phase();

            #[cfg(feature = "diagnostics")]
            let watched_signal = match &event {
                SessionEvent::SignalReceived(signal) => {
                    self.tally.record_received(signal);
                    Some((
                        self.machine.session().pending_candidates(),
                        self.machine.session().queued_outbound(),
                    ))
                }
                _ => None,
            };

            let commands = self.machine.dispatch(event);

            #[cfg(feature = "diagnostics")]
            if let Some((pending, queued)) = watched_signal {
                let session = self.machine.session();
                if commands.is_empty()
                    && session.pending_candidates() == pending
                    && session.queued_outbound() == queued
                {
                    self.tally.record_ignored();
                }
            }

            let followups = self.run_commands(commands).await;
            queue.extend(followups);
            self.flush_outbound().await;
            self.observe_transition(before);
        }

        *self.shared.phase.write() = self.machine.phase();
    }

    /// Execute machine commands; failures that doom the negotiation come
    /// back as follow-up events instead of panics or lost state.
    async fn run_commands(&mut self, commands: Vec<Command>) -> Vec<SessionEvent> {
        let mut followups = Vec::new();
        for command in commands {
            match command {
                Command::FindPartner => {
                    if let Err(error) = self.transport.find_partner(&self.interests).await {
                        warn!(error = %error, "find_partner failed");
                        self.emit_error(&error);
                    }
                }
                Command::StopSearch => {
                    if let Err(error) = self.transport.stop_search().await {
                        debug!(error = %error, "stop_search failed");
                    }
                }
                Command::CreatePeer { role } => {
                    // Replace any leftover resource before creating anew.
                    self.teardown_peer().await;
                    let (events, receiver) = mpsc::unbounded_channel();
                    match self.connector.create_peer(role, events).await {
                        Ok(handle) => {
                            self.peer = Some(handle);
                            self.peer_events = Some(receiver);
                        }
                        Err(error) => {
                            warn!(error = %error, "creating peer resource failed");
                            self.emit_error(&error);
                            followups.push(SessionEvent::IceState(IceState::Failed));
                        }
                    }
                }
                Command::CreateOffer => {
                    let produced = match self.peer.as_mut() {
                        Some(peer) => Some(peer.create_offer().await),
                        None => None,
                    };
                    match produced {
                        Some(Ok(description)) => followups.push(SessionEvent::LocalDescription {
                            kind: SdpKind::Offer,
                            description,
                        }),
                        Some(Err(error)) => {
                            warn!(error = %error, "producing offer failed");
                            self.emit_error(&error);
                            followups.push(SessionEvent::IceState(IceState::Failed));
                        }
                        None => warn!("create_offer without a peer resource"),
                    }
                }
                Command::CreateAnswer => {
                    let produced = match self.peer.as_mut() {
                        Some(peer) => Some(peer.create_answer().await),
                        None => None,
                    };
                    match produced {
                        Some(Ok(description)) => followups.push(SessionEvent::LocalDescription {
                            kind: SdpKind::Answer,
                            description,
                        }),
                        Some(Err(error)) => {
                            warn!(error = %error, "producing answer failed");
                            self.emit_error(&error);
                            followups.push(SessionEvent::IceState(IceState::Failed));
                        }
                        None => warn!("create_answer without a peer resource"),
                    }
                }
                Command::ApplyRemoteDescription { kind, description } => {
                    let applied = match self.peer.as_mut() {
                        Some(peer) => Some(peer.set_remote_description(kind, description).await),
                        None => None,
                    };
                    match applied {
                        Some(Err(error)) => {
                            // Caught and reported; the session stays up for
                            // the normal stop/next path.
                            warn!(error = %error, "applying remote description failed");
                            self.emit_error(&error);
                        }
                        Some(Ok(())) => {}
                        None => warn!("remote description without a peer resource"),
                    }
                }
                Command::ApplyCandidate(candidate) => {
                    let applied = match self.peer.as_mut() {
                        Some(peer) => Some(peer.add_ice_candidate(candidate).await),
                        None => None,
                    };
                    match applied {
                        Some(Err(error)) => {
                            warn!(error = %error, "applying candidate failed");
                            self.emit_error(&error);
                        }
                        Some(Ok(())) => {}
                        None => warn!("candidate without a peer resource"),
                    }
                }
                Command::TeardownPeer => self.teardown_peer().await,
            }
        }
        followups
    }

    /// Hand queued outbound signals to the transport in emission order
    async fn flush_outbound(&mut self) {
        for signal in self.machine.take_outbound() {
            #[cfg(feature = "diagnostics")]
            self.tally.record_sent(&signal);
            if let Err(error) = self.transport.send_signal(signal).await {
                warn!(error = %error, "send_signal failed");
                self.emit_error(&error);
            }
        }
    }

    /// Emit lifecycle events for a phase change made by the last dispatch
    fn observe_transition(&mut self, before: Phase) {
        let after = self.machine.phase();
        if before == after {
            return;
        }

        #[cfg(feature = "diagnostics")]
        self.timeline.observe_phase(after, Instant::now());

        match after {
            Phase::Connecting => {
                // New match: the previous conversation is gone.
                self.chat.clear();
                let session = self.machine.session();
                let event = ClientEvent::MatchFound {
                    session_id: session.id(),
                    partner_id: session.partner_id().unwrap_or("").to_string(),
                    partner_identity: session.partner_identity().map(str::to_string),
                    initiator: session.role() == Some(Role::Initiator),
                };
                self.emit(event);
            }
            Phase::Connected => {
                let event = ClientEvent::PeerConnected {
                    session_id: self.machine.session().id(),
                };
                self.emit(event);
            }
            Phase::Searching => self.emit(ClientEvent::SearchStarted),
            Phase::Idle | Phase::Failed | Phase::Closed => {}
        }
    }

    /// Close and drop the live peer resource; its event channel dies with
    /// it, so stale peer callbacks can never reach the machine.
    async fn teardown_peer(&mut self) {
        if let Some(mut peer) = self.peer.take() {
            peer.close().await;
        }
        self.peer_events = None;
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    fn emit_error(&self, error: &PairlinkError) {
        self.emit(ClientEvent::Error {
            error: error.to_string(),
            code: error.error_code().to_string(),
            recoverable: error.is_recoverable(),
        });
    }
}
