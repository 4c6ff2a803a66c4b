//! Signal types exchanged between matched peers

use crate::error::PairlinkError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Which half of the offer/answer exchange a description belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    /// Description produced by the initiator
    Offer,
    /// Description produced by the responder
    Answer,
}

impl SdpKind {
    /// Get the kind as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            SdpKind::Offer => "offer",
            SdpKind::Answer => "answer",
        }
    }
}

/// A session description produced by a peer resource.
///
/// The SDP body is opaque to pairlink; it is produced and consumed by the
/// peer resource collaborator and carried unmodified by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Opaque SDP body
    pub sdp: String,
}

impl SessionDescription {
    /// Create a description from an SDP body
    pub fn new(sdp: impl Into<String>) -> Self {
        Self { sdp: sdp.into() }
    }
}

/// A network path descriptor proposed during peer negotiation.
///
/// Field names on the wire match the browser `RTCIceCandidateInit` shape the
/// backend already relays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Candidate line
    pub candidate: String,
    /// Media stream identification tag
    #[serde(rename = "sdpMid")]
    pub sdp_mid: Option<String>,
    /// Index of the media description the candidate belongs to
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
}

impl IceCandidate {
    /// Create a candidate with just a candidate line
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
        }
    }
}

/// A signal exchanged to establish a direct connection between two peers.
///
/// Immutable once created; the transport carries it opaquely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    /// Session offer from the initiator
    Offer(SessionDescription),
    /// Session answer from the responder
    Answer(SessionDescription),
    /// ICE candidate from either side
    Candidate(IceCandidate),
}

impl Signal {
    /// Build an offer signal from an SDP body
    pub fn offer(sdp: impl Into<String>) -> Self {
        Signal::Offer(SessionDescription::new(sdp))
    }

    /// Build an answer signal from an SDP body
    pub fn answer(sdp: impl Into<String>) -> Self {
        Signal::Answer(SessionDescription::new(sdp))
    }

    /// Get the signal kind as a string
    pub fn kind(&self) -> &'static str {
        match self {
            Signal::Offer(_) => "offer",
            Signal::Answer(_) => "answer",
            Signal::Candidate(_) => "candidate",
        }
    }

    /// The description kind this signal carries, if any
    pub fn description_kind(&self) -> Option<SdpKind> {
        match self {
            Signal::Offer(_) => Some(SdpKind::Offer),
            Signal::Answer(_) => Some(SdpKind::Answer),
            Signal::Candidate(_) => None,
        }
    }

    /// Encode the signal as an opaque JSON frame for the transport
    pub fn to_wire(&self) -> Result<Bytes, PairlinkError> {
        let encoded =
            serde_json::to_vec(self).map_err(|e| PairlinkError::SignalEncoding {
                reason: e.to_string(),
            })?;
        Ok(Bytes::from(encoded))
    }

    /// Decode a signal from a transport frame
    pub fn from_wire(frame: &[u8]) -> Result<Self, PairlinkError> {
        serde_json::from_slice(frame).map_err(|e| PairlinkError::SignalDecoding {
            reason: e.to_string(),
        })
    }
}
