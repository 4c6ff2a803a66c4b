//! # Pairlink Core
//!
//! Session model and signaling state machine for the pairlink client.
//! This crate holds the invariant-bearing logic of a matched peer session —
//! offer/answer exchange, ICE candidate buffering, teardown — with no I/O
//! of its own. The `pairlink` crate drives it against real collaborators.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod machine;
pub mod session;
pub mod signal;
pub mod sync;

// Re-export main types
pub use error::PairlinkError;
pub use machine::{Command, IceState, SessionEvent, SignalingMachine};
pub use session::{Phase, Role, Session};
pub use signal::{IceCandidate, SdpKind, SessionDescription, Signal};
pub use sync::{SyncConfig, SyncSchedule};
