//! Per-session negotiation timeline

use pairlink_core::Phase;
use std::time::{Duration, Instant};

/// Records when a session entered each negotiation milestone.
///
/// Entering `Searching` starts a fresh timeline, so a requeue after a
/// failure measures the new attempt, not the old one.
#[derive(Debug, Default)]
pub struct NegotiationTimeline {
    search_started: Option<Instant>,
    matched_at: Option<Instant>,
    connected_at: Option<Instant>,
}

impl NegotiationTimeline {
    /// Create an empty timeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a phase transition observed at `now`
    pub fn observe_phase(&mut self, phase: Phase, now: Instant) {
        match phase {
            Phase::Searching => {
                self.search_started = Some(now);
                self.matched_at = None;
                self.connected_at = None;
            }
            Phase::Connecting => self.matched_at = Some(now),
            Phase::Connected => self.connected_at = Some(now),
            Phase::Idle | Phase::Failed | Phase::Closed => {}
        }
    }

    /// Time from search start to match
    pub fn time_to_match(&self) -> Option<Duration> {
        Some(self.matched_at?.duration_since(self.search_started?))
    }

    /// Time from match to established connection
    pub fn time_to_connect(&self) -> Option<Duration> {
        Some(self.connected_at?.duration_since(self.matched_at?))
    }

    /// Time from search start to established connection
    pub fn search_to_connect(&self) -> Option<Duration> {
        Some(self.connected_at?.duration_since(self.search_started?))
    }
}
