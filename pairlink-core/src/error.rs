//! Error types for pairlink

use thiserror::Error;

/// Main error type for pairlink operations
#[derive(Error, Debug)]
pub enum PairlinkError {
    /// Local media could not be acquired; the session stays idle
    #[error("Local media unavailable: {reason}")]
    MediaUnavailable {
        /// Reason media acquisition failed
        reason: String,
    },

    /// Transport call failed
    #[error("Transport error during {operation}: {reason}")]
    Transport {
        /// Operation that was attempted
        operation: String,
        /// Reason for transport failure
        reason: String,
    },

    /// Peer resource operation failed
    #[error("Peer resource error during {operation}: {reason}")]
    Peer {
        /// Operation that was attempted
        operation: String,
        /// Reason for peer failure
        reason: String,
    },

    /// Signal could not be encoded for the wire
    #[error("Signal encoding failed: {reason}")]
    SignalEncoding {
        /// Reason for failure
        reason: String,
    },

    /// Signal payload could not be decoded
    #[error("Signal decoding failed: {reason}")]
    SignalDecoding {
        /// Reason for failure
        reason: String,
    },

    /// Operation requires an active partner
    #[error("No active partner for {operation}")]
    NoActivePartner {
        /// Operation that was attempted
        operation: String,
    },

    /// Client task has shut down
    #[error("Client is closed")]
    ClientClosed,
}

impl PairlinkError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            PairlinkError::MediaUnavailable { .. } => "MEDIA_UNAVAILABLE",
            PairlinkError::Transport { .. } => "TRANSPORT_ERROR",
            PairlinkError::Peer { .. } => "PEER_ERROR",
            PairlinkError::SignalEncoding { .. } => "SIGNAL_ENCODING_FAILED",
            PairlinkError::SignalDecoding { .. } => "SIGNAL_DECODING_FAILED",
            PairlinkError::NoActivePartner { .. } => "NO_ACTIVE_PARTNER",
            PairlinkError::ClientClosed => "CLIENT_CLOSED",
        }
    }

    /// Whether the session can continue after this error.
    ///
    /// Every error here is scoped to a single session; only a closed client
    /// is terminal for the caller.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, PairlinkError::ClientClosed)
    }
}
