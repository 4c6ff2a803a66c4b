//! Signal traffic accounting

use pairlink_core::Signal;
use serde::Serialize;

/// Snapshot of signal traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SignalCounts {
    /// Offers handed to the transport
    pub offers_sent: u64,
    /// Answers handed to the transport
    pub answers_sent: u64,
    /// Candidates handed to the transport
    pub candidates_sent: u64,
    /// Offers delivered by the transport
    pub offers_received: u64,
    /// Answers delivered by the transport
    pub answers_received: u64,
    /// Candidates delivered by the transport
    pub candidates_received: u64,
    /// Delivered signals ignored as out-of-order or unexpected
    pub ignored: u64,
}

/// Running tally of signal traffic for the current client
#[derive(Debug, Default)]
pub struct SignalTally {
    counts: SignalCounts,
}

impl SignalTally {
    /// Create an empty tally
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a signal handed to the transport
    pub fn record_sent(&mut self, signal: &Signal) {
        match signal {
            Signal::Offer(_) => self.counts.offers_sent += 1,
            Signal::Answer(_) => self.counts.answers_sent += 1,
            Signal::Candidate(_) => self.counts.candidates_sent += 1,
        }
    }

    /// Record a signal delivered by the transport
    pub fn record_received(&mut self, signal: &Signal) {
        match signal {
            Signal::Offer(_) => self.counts.offers_received += 1,
            Signal::Answer(_) => self.counts.answers_received += 1,
            Signal::Candidate(_) => self.counts.candidates_received += 1,
        }
    }

    /// Record a delivered signal the state machine ignored
    pub fn record_ignored(&mut self) {
        self.counts.ignored += 1;
    }

    /// Current counter snapshot
    pub fn counts(&self) -> SignalCounts {
        self.counts
    }
}
