//! Configuration types and defaults

use pairlink_core::SyncConfig;
use std::time::Duration;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Re-enter the search automatically after a negotiation failure
    pub requeue_on_failure: bool,
    /// Interest tags sent with matchmaking requests
    pub interests: Vec<String>,
    /// Schedule advice handed to polling transports
    pub sync: SyncConfig,
    /// Silence after the last keystroke before the typing indicator clears
    pub typing_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            requeue_on_failure: true,
            interests: Vec::new(),
            sync: SyncConfig::default(),
            typing_timeout: Duration::from_secs(2),
        }
    }
}
