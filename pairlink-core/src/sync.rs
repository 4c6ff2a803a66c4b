//! Adaptive sync scheduling for polling transports
//!
//! The original client polled its sync endpoint on a fixed 1.5 s timer no
//! matter what the session was doing. Transports that poll should instead
//! ask a [`SyncSchedule`] how long to wait: negotiation phases poll fast,
//! quiet phases back off, and jitter keeps a fleet of clients from
//! synchronizing their rounds.

use crate::session::Phase;
use rand::Rng;
use std::time::Duration;

/// Tuning for the adaptive sync schedule
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Interval while searching for a partner
    pub base_interval: Duration,
    /// Fastest interval, used while negotiation traffic is expected
    pub min_interval: Duration,
    /// Slowest interval reached after repeated empty rounds
    pub max_interval: Duration,
    /// Multiplier applied for each consecutive empty round
    pub backoff_factor: f64,
    /// Fraction of the interval randomized in each direction (0.0 disables)
    pub jitter: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            // The fixed cadence of the original polling client.
            base_interval: Duration::from_millis(1500),
            min_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(10),
            backoff_factor: 1.5,
            jitter: 0.1,
        }
    }
}

impl SyncConfig {
    /// Aggressive schedule for flaky networks: poll faster, back off less
    pub fn responsive() -> Self {
        Self {
            base_interval: Duration::from_millis(750),
            min_interval: Duration::from_millis(250),
            max_interval: Duration::from_secs(4),
            backoff_factor: 1.25,
            jitter: 0.1,
        }
    }

    /// Conservative schedule for metered connections
    pub fn relaxed() -> Self {
        Self {
            base_interval: Duration::from_secs(3),
            min_interval: Duration::from_millis(1000),
            max_interval: Duration::from_secs(30),
            backoff_factor: 2.0,
            jitter: 0.2,
        }
    }
}

/// Chooses how long a polling transport should wait before its next round.
///
/// The schedule is advisory: push transports never consult it, and the
/// state machine does not depend on it.
#[derive(Debug)]
pub struct SyncSchedule {
    config: SyncConfig,
    empty_rounds: u32,
}

impl SyncSchedule {
    /// Create a schedule with the given tuning
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            empty_rounds: 0,
        }
    }

    /// Record a round that carried signals, messages, or a match
    pub fn record_activity(&mut self) {
        self.empty_rounds = 0;
    }

    /// Record a round that returned nothing
    pub fn record_empty(&mut self) {
        self.empty_rounds = self.empty_rounds.saturating_add(1);
    }

    /// Consecutive empty rounds since the last activity
    pub fn empty_rounds(&self) -> u32 {
        self.empty_rounds
    }

    /// Interval to wait before the next round, given the session phase
    pub fn next_interval(&self, phase: Phase) -> Duration {
        let base = match phase {
            // Trickle candidates are in flight; stay hot and skip backoff.
            Phase::Connecting => return self.jittered(self.config.min_interval),
            Phase::Searching => self.config.base_interval,
            Phase::Connected => self.config.base_interval,
            Phase::Idle | Phase::Closed | Phase::Failed => self.config.max_interval,
        };

        let factor = self.config.backoff_factor.max(1.0).powi(self.empty_rounds as i32);
        let backed_off = base.mul_f64(factor).min(self.config.max_interval);
        self.jittered(backed_off.max(self.config.min_interval))
    }

    fn jittered(&self, interval: Duration) -> Duration {
        if self.config.jitter <= 0.0 {
            return interval;
        }
        let jitter = self.config.jitter.min(1.0);
        let scale = 1.0 - jitter + rand::thread_rng().gen_range(0.0..(2.0 * jitter));
        interval.mul_f64(scale)
    }
}

impl Default for SyncSchedule {
    fn default() -> Self {
        Self::new(SyncConfig::default())
    }
}
