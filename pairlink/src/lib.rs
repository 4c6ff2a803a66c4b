//! # Pairlink - Random Pair Chat Client Core
//!
//! Pairlink is the headless core of a random-video-chat client: it owns the
//! lifecycle of one matched peer session — matchmaking, offer/answer
//! exchange, ICE candidate handling, teardown — plus the session-scoped
//! chat that rides on the same signaling channel. The embedding application
//! supplies the backend transport and the WebRTC stack behind traits and
//! renders the event stream however it likes.
//!
//! ## Key Properties
//!
//! - **One session at a time**: duplicate searches and duplicate matches
//!   are ignored, not raced
//! - **Order-safe negotiation**: early remote candidates buffer until the
//!   remote description is applied, then drain in arrival order
//! - **Teardown is final**: after stop or partner loss, stale deliveries
//!   cannot touch session state
//! - **Nothing is fatal**: unexpected signals are logged and dropped;
//!   failures are scoped to the session and recoverable
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pairlink::{Client, MatchmakingTransport, PeerConnector, TransportEvents};
//! use std::sync::Arc;
//!
//! async fn run(
//!     transport: Arc<dyn MatchmakingTransport>,
//!     connector: Arc<dyn PeerConnector>,
//!     transport_events: TransportEvents,
//! ) -> Result<(), pairlink::PairlinkError> {
//!     let (client, mut events) = Client::builder(transport, connector, transport_events)
//!         .interests(["music", "rust"])
//!         .spawn();
//!
//!     client.start().await?;
//!     while let Some(event) = events.next().await {
//!         println!("event: {:?}", event);
//!     }
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use pairlink_core::{
    Command, IceCandidate, IceState, PairlinkError, Phase, Role, SdpKind, Session,
    SessionDescription, SessionEvent, Signal, SignalingMachine, SyncConfig, SyncSchedule,
};

#[cfg(feature = "diagnostics")]
pub use pairlink_diagnostics::{NegotiationTimeline, SessionStats, SignalCounts, SignalTally};

// Public API modules
pub mod chat;
pub mod client;
pub mod config;
pub mod event;
pub mod peer;
pub mod transport;

// Re-export main API types
pub use chat::{ChatDirection, ChatLog, ChatMessage, TypingTracker};
pub use client::{Client, ClientBuilder};
pub use config::ClientConfig;
pub use event::{ClientEvent, EventFilter, EventStream, FilteredEventStream};
pub use peer::{PeerConnector, PeerEvent, PeerHandle};
pub use transport::{MatchmakingTransport, TransportEvent, TransportEvents};
