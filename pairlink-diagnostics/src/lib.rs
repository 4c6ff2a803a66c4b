//! # Pairlink Diagnostics
//!
//! Negotiation timing and signal accounting for pairlink sessions. The
//! client feeds phase transitions and signal traffic in; applications read
//! a [`SessionStats`] snapshot back out.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod tally;
pub mod timeline;

// Re-export main types
pub use tally::{SignalCounts, SignalTally};
pub use timeline::NegotiationTimeline;

use serde::Serialize;
use std::time::Duration;

/// Snapshot of one session's negotiation metrics
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    /// Time from search start to match, if a match happened
    pub time_to_match: Option<Duration>,
    /// Time from match to established connection, if it connected
    pub time_to_connect: Option<Duration>,
    /// Signal traffic counters
    pub signals: SignalCounts,
}

impl SessionStats {
    /// Assemble a snapshot from the live trackers
    pub fn snapshot(timeline: &NegotiationTimeline, tally: &SignalTally) -> Self {
        Self {
            time_to_match: timeline.time_to_match(),
            time_to_connect: timeline.time_to_connect(),
            signals: tally.counts(),
        }
    }
}

/// Initialize logging from the `RUST_LOG` environment
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
