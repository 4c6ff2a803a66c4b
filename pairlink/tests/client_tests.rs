//! End-to-end controller tests
//!
//! These drive a running client through channel-backed fake collaborators:
//! the transport records every call and the test injects its events; the
//! peer connector hands out scripted peer resources and exposes their
//! event senders so ICE outcomes can be injected too.

use async_trait::async_trait;
use pairlink::{
    Client, ClientEvent, EventStream, IceCandidate, IceState, MatchmakingTransport, PairlinkError,
    PeerConnector, PeerEvent, PeerHandle, Phase, Role, SdpKind, SessionDescription, Signal,
    TransportEvent,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
enum TransportCall {
    FindPartner(Vec<String>),
    StopSearch,
    Signal(Signal),
    Chat(String),
    Typing(bool),
    Interests(Vec<String>),
    Report(String),
    Leave,
}

#[derive(Default)]
struct MockTransport {
    calls: Mutex<Vec<TransportCall>>,
}

impl MockTransport {
    fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    fn count(&self, matches: impl Fn(&TransportCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| matches(c)).count()
    }

    fn sent_offers(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::Signal(Signal::Offer(_))))
    }

    fn sent_answers(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::Signal(Signal::Answer(_))))
    }

    fn find_partner_calls(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::FindPartner(_)))
    }
}

#[async_trait]
impl MatchmakingTransport for MockTransport {
    async fn find_partner(&self, interests: &[String]) -> Result<(), PairlinkError> {
        self.calls
            .lock()
            .push(TransportCall::FindPartner(interests.to_vec()));
        Ok(())
    }

    async fn stop_search(&self) -> Result<(), PairlinkError> {
        self.calls.lock().push(TransportCall::StopSearch);
        Ok(())
    }

    async fn send_signal(&self, signal: Signal) -> Result<(), PairlinkError> {
        self.calls.lock().push(TransportCall::Signal(signal));
        Ok(())
    }

    async fn send_chat(&self, text: &str) -> Result<(), PairlinkError> {
        self.calls.lock().push(TransportCall::Chat(text.to_string()));
        Ok(())
    }

    async fn set_typing(&self, typing: bool) -> Result<(), PairlinkError> {
        self.calls.lock().push(TransportCall::Typing(typing));
        Ok(())
    }

    async fn update_interests(&self, interests: &[String]) -> Result<(), PairlinkError> {
        self.calls
            .lock()
            .push(TransportCall::Interests(interests.to_vec()));
        Ok(())
    }

    async fn report_partner(&self, reason: &str) -> Result<(), PairlinkError> {
        self.calls
            .lock()
            .push(TransportCall::Report(reason.to_string()));
        Ok(())
    }

    async fn leave(&self) -> Result<(), PairlinkError> {
        self.calls.lock().push(TransportCall::Leave);
        Ok(())
    }
}

struct MockConnector {
    media_ok: bool,
    ops: Arc<Mutex<Vec<String>>>,
    senders: Mutex<Vec<mpsc::UnboundedSender<PeerEvent>>>,
}

impl MockConnector {
    fn new() -> Self {
        Self {
            media_ok: true,
            ops: Arc::new(Mutex::new(Vec::new())),
            senders: Mutex::new(Vec::new()),
        }
    }

    fn without_media() -> Self {
        Self {
            media_ok: false,
            ..Self::new()
        }
    }

    fn ops(&self) -> Vec<String> {
        self.ops.lock().clone()
    }

    fn peers_created(&self) -> usize {
        self.senders.lock().len()
    }

    fn last_peer_events(&self) -> mpsc::UnboundedSender<PeerEvent> {
        self.senders.lock().last().expect("no peer created").clone()
    }
}

struct MockPeer {
    ops: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl PeerHandle for MockPeer {
    async fn create_offer(&mut self) -> Result<SessionDescription, PairlinkError> {
        self.ops.lock().push("create_offer".to_string());
        Ok(SessionDescription::new("v=0 local-offer"))
    }

    async fn create_answer(&mut self) -> Result<SessionDescription, PairlinkError> {
        self.ops.lock().push("create_answer".to_string());
        Ok(SessionDescription::new("v=0 local-answer"))
    }

    async fn set_remote_description(
        &mut self,
        kind: SdpKind,
        description: SessionDescription,
    ) -> Result<(), PairlinkError> {
        self.ops
            .lock()
            .push(format!("set_remote:{}:{}", kind.as_str(), description.sdp));
        Ok(())
    }

    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), PairlinkError> {
        self.ops.lock().push(format!("add_candidate:{}", candidate.candidate));
        Ok(())
    }

    async fn close(&mut self) {
        self.ops.lock().push("close".to_string());
    }
}

#[async_trait]
impl PeerConnector for MockConnector {
    async fn ensure_local_media(&self) -> Result<(), PairlinkError> {
        if self.media_ok {
            Ok(())
        } else {
            Err(PairlinkError::MediaUnavailable {
                reason: "camera denied".to_string(),
            })
        }
    }

    async fn create_peer(
        &self,
        role: Role,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Box<dyn PeerHandle>, PairlinkError> {
        self.ops.lock().push(format!("create_peer:{}", role.as_str()));
        self.senders.lock().push(events);
        Ok(Box::new(MockPeer {
            ops: Arc::clone(&self.ops),
        }))
    }
}

struct Harness {
    transport: Arc<MockTransport>,
    connector: Arc<MockConnector>,
    transport_tx: mpsc::UnboundedSender<TransportEvent>,
    client: Client,
    events: EventStream,
}

fn harness_with(connector: MockConnector) -> Harness {
    let (transport_tx, transport_rx) = mpsc::unbounded_channel();
    let transport = Arc::new(MockTransport::default());
    let connector = Arc::new(connector);
    let (client, events) = Client::builder(
        transport.clone() as Arc<dyn MatchmakingTransport>,
        connector.clone() as Arc<dyn PeerConnector>,
        transport_rx,
    )
    .spawn();

    Harness {
        transport,
        connector,
        transport_tx,
        client,
        events,
    }
}

fn harness() -> Harness {
    harness_with(MockConnector::new())
}

fn matched(partner: &str, initiator: bool) -> TransportEvent {
    TransportEvent::Matched {
        partner_id: partner.to_string(),
        partner_identity: Some("Silver Ghost 88".to_string()),
        initiator,
    }
}

/// Wait for the next event of the given type, skipping others.
async fn expect_event(events: &mut EventStream, event_type: &str) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = events.next().await.expect("event stream closed");
            if event.event_type() == event_type {
                return event;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {event_type}"))
}

/// Poll until a condition on the mocks becomes true.
async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

#[tokio::test]
async fn initiator_emits_exactly_one_offer_before_the_answer() -> anyhow::Result<()> {
    let mut h = harness();

    h.client.start().await?;
    expect_event(&mut h.events, "search_started").await;
    assert_eq!(h.transport.find_partner_calls(), 1);

    h.transport_tx.send(matched("p1", true))?;
    let event = expect_event(&mut h.events, "match_found").await;
    match event {
        ClientEvent::MatchFound {
            partner_id,
            initiator,
            ..
        } => {
            assert_eq!(partner_id, "p1");
            assert!(initiator);
        }
        other => panic!("unexpected event {other:?}"),
    }

    let transport = h.transport.clone();
    wait_until(move || transport.sent_offers() == 1).await;

    h.transport_tx
        .send(TransportEvent::Signal(Signal::answer("v=0 remote-answer")))?;
    let connector = h.connector.clone();
    wait_until(move || {
        connector
            .ops()
            .iter()
            .any(|op| op == "set_remote:answer:v=0 remote-answer")
    })
    .await;

    // Still exactly one offer, and no spurious answer from the initiator.
    assert_eq!(h.transport.sent_offers(), 1);
    assert_eq!(h.transport.sent_answers(), 0);
    Ok(())
}

#[tokio::test]
async fn responder_applies_buffered_candidates_in_arrival_order() -> anyhow::Result<()> {
    let mut h = harness();

    h.client.start().await?;
    h.transport_tx.send(matched("p1", false))?;
    expect_event(&mut h.events, "match_found").await;

    // Two candidates outrun the offer.
    for line in ["cand-1", "cand-2"] {
        h.transport_tx
            .send(TransportEvent::Signal(Signal::Candidate(IceCandidate::new(line))))?;
    }
    h.transport_tx
        .send(TransportEvent::Signal(Signal::offer("v=0 remote-offer")))?;

    let transport = h.transport.clone();
    wait_until(move || transport.sent_answers() == 1).await;

    let ops = h.connector.ops();
    let relevant: Vec<_> = ops
        .iter()
        .filter(|op| !op.starts_with("create_peer"))
        .cloned()
        .collect();
    assert_eq!(
        relevant,
        vec![
            "set_remote:offer:v=0 remote-offer",
            "add_candidate:cand-1",
            "add_candidate:cand-2",
            "create_answer",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn stale_signals_after_stop_touch_nothing() -> anyhow::Result<()> {
    let mut h = harness();

    h.client.start().await?;
    h.transport_tx.send(matched("p1", false))?;
    expect_event(&mut h.events, "match_found").await;

    h.client.stop()?;
    expect_event(&mut h.events, "stopped").await;
    let connector = h.connector.clone();
    wait_until(move || connector.ops().iter().any(|op| op == "close")).await;
    assert_eq!(h.client.phase(), Phase::Closed);

    let ops_before = h.connector.ops();
    h.transport_tx
        .send(TransportEvent::Signal(Signal::offer("v=0 stale")))?;
    h.transport_tx
        .send(TransportEvent::Signal(Signal::Candidate(IceCandidate::new("stale"))))?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.connector.ops(), ops_before);
    assert_eq!(h.transport.sent_answers(), 0);
    assert_eq!(h.client.phase(), Phase::Closed);
    Ok(())
}

#[tokio::test]
async fn ice_failure_while_connected_requeues_automatically() -> anyhow::Result<()> {
    let mut h = harness();

    h.client.start().await?;
    h.transport_tx.send(matched("p1", true))?;
    expect_event(&mut h.events, "match_found").await;

    let peer_events = h.connector.last_peer_events();
    peer_events.send(PeerEvent::IceState(IceState::Connected))?;
    expect_event(&mut h.events, "peer_connected").await;

    peer_events.send(PeerEvent::IceState(IceState::Failed))?;
    expect_event(&mut h.events, "connection_failed").await;
    expect_event(&mut h.events, "search_started").await;

    let transport = h.transport.clone();
    wait_until(move || transport.find_partner_calls() == 2).await;
    let client = h.client.clone();
    wait_until(move || client.phase() == Phase::Searching).await;

    // The failed peer was closed; a fresh match gets a fresh resource.
    assert!(h.connector.ops().iter().any(|op| op == "close"));
    h.transport_tx.send(matched("p2", false))?;
    expect_event(&mut h.events, "match_found").await;
    assert_eq!(h.connector.peers_created(), 2);
    Ok(())
}

#[tokio::test]
async fn chat_requires_a_partner_and_clears_on_rematch() -> anyhow::Result<()> {
    let mut h = harness();

    h.client.start().await?;
    let err = h.client.send_chat("hello?").await.unwrap_err();
    assert_eq!(err.error_code(), "NO_ACTIVE_PARTNER");
    assert_eq!(h.transport.count(|c| matches!(c, TransportCall::Chat(_))), 0);

    h.transport_tx.send(matched("p1", true))?;
    expect_event(&mut h.events, "match_found").await;

    h.client.send_chat("hello").await?;
    expect_event(&mut h.events, "chat_sent").await;
    h.transport_tx.send(TransportEvent::Chat {
        text: "hey there".to_string(),
    })?;
    expect_event(&mut h.events, "chat_received").await;

    let history = h.client.chat_history().await?;
    let texts: Vec<_> = history.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["hello", "hey there"]);

    // Skipping wipes the conversation with the old partner.
    h.client.next().await?;
    expect_event(&mut h.events, "search_started").await;
    h.transport_tx.send(matched("p2", false))?;
    expect_event(&mut h.events, "match_found").await;
    assert!(h.client.chat_history().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn report_files_and_skips_to_the_next_partner() -> anyhow::Result<()> {
    let mut h = harness();

    h.client.start().await?;
    h.transport_tx.send(matched("p1", true))?;
    expect_event(&mut h.events, "match_found").await;

    h.client.report("spam").await?;
    expect_event(&mut h.events, "search_started").await;

    assert_eq!(
        h.transport
            .count(|c| matches!(c, TransportCall::Report(reason) if reason == "spam")),
        1
    );
    assert_eq!(h.transport.find_partner_calls(), 2);
    assert!(h.connector.ops().iter().any(|op| op == "close"));
    Ok(())
}

#[tokio::test]
async fn media_failure_keeps_the_session_idle() {
    let h = harness_with(MockConnector::without_media());

    let err = h.client.start().await.unwrap_err();
    assert_eq!(err.error_code(), "MEDIA_UNAVAILABLE");
    assert!(err.is_recoverable());
    assert_eq!(h.client.phase(), Phase::Idle);
    assert_eq!(h.transport.find_partner_calls(), 0);
}

#[tokio::test]
async fn partner_leaving_closes_the_session() -> anyhow::Result<()> {
    let mut h = harness();

    h.client.start().await?;
    h.transport_tx.send(matched("p1", false))?;
    expect_event(&mut h.events, "match_found").await;

    h.transport_tx.send(TransportEvent::PartnerLeft)?;
    expect_event(&mut h.events, "partner_left").await;

    let client = h.client.clone();
    wait_until(move || client.phase() == Phase::Closed).await;
    assert!(h.connector.ops().iter().any(|op| op == "close"));

    // The user decides when to search again.
    assert_eq!(h.transport.find_partner_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn duplicate_match_does_not_replace_the_session() -> anyhow::Result<()> {
    let mut h = harness();

    h.client.start().await?;
    h.transport_tx.send(matched("p1", true))?;
    expect_event(&mut h.events, "match_found").await;

    h.transport_tx.send(matched("p2", false))?;
    h.transport_tx.send(TransportEvent::Chat {
        text: "still p1?".to_string(),
    })?;
    expect_event(&mut h.events, "chat_received").await;

    assert_eq!(h.connector.peers_created(), 1);
    assert_eq!(
        h.connector
            .ops()
            .iter()
            .filter(|op| op.starts_with("create_peer"))
            .count(),
        1
    );
    Ok(())
}

#[tokio::test]
async fn typing_sends_leading_and_trailing_edges() -> anyhow::Result<()> {
    let (transport_tx, transport_rx) = mpsc::unbounded_channel();
    let transport = Arc::new(MockTransport::default());
    let connector = Arc::new(MockConnector::new());
    let (client, mut events) = Client::builder(
        transport.clone() as Arc<dyn MatchmakingTransport>,
        connector as Arc<dyn PeerConnector>,
        transport_rx,
    )
    .typing_timeout(Duration::from_millis(50))
    .spawn();

    client.start().await?;
    transport_tx.send(matched("p1", true))?;
    expect_event(&mut events, "match_found").await;

    client.notify_typing()?;
    client.notify_typing()?;
    let probe = transport.clone();
    wait_until(move || probe.count(|c| matches!(c, TransportCall::Typing(true))) == 1).await;

    // Trailing edge fires after the timeout without further keystrokes.
    let probe = transport.clone();
    wait_until(move || probe.count(|c| matches!(c, TransportCall::Typing(false))) == 1).await;
    assert_eq!(transport.count(|c| matches!(c, TransportCall::Typing(true))), 1);
    Ok(())
}

#[tokio::test]
async fn interests_flow_to_matchmaking_requests() -> anyhow::Result<()> {
    let mut h = harness();

    h.client.set_interests(["music", "rust"])?;
    expect_event(&mut h.events, "interests_updated").await;

    h.client.start().await?;
    let transport = h.transport.clone();
    wait_until(move || transport.find_partner_calls() == 1).await;

    let calls = h.transport.calls();
    assert!(calls.contains(&TransportCall::Interests(vec![
        "music".to_string(),
        "rust".to_string()
    ])));
    assert!(calls.contains(&TransportCall::FindPartner(vec![
        "music".to_string(),
        "rust".to_string()
    ])));
    Ok(())
}

#[cfg(feature = "diagnostics")]
#[tokio::test]
async fn stats_count_signals_and_ignored_deliveries() -> anyhow::Result<()> {
    let mut h = harness();

    h.client.start().await?;
    h.transport_tx.send(matched("p1", true))?;
    expect_event(&mut h.events, "match_found").await;

    let transport = h.transport.clone();
    wait_until(move || transport.sent_offers() == 1).await;

    // One valid answer, then a duplicate that the machine ignores.
    h.transport_tx
        .send(TransportEvent::Signal(Signal::answer("v=0 remote")))?;
    h.transport_tx
        .send(TransportEvent::Signal(Signal::answer("v=0 duplicate")))?;

    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if h.client.stats().await?.signals.ignored == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        anyhow::Ok(())
    })
    .await??;

    let stats = h.client.stats().await?;
    assert_eq!(stats.signals.offers_sent, 1);
    assert_eq!(stats.signals.answers_received, 2);
    assert_eq!(stats.signals.ignored, 1);
    assert!(stats.time_to_match.is_some());
    Ok(())
}
