//! Peer connection states, events and errors.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::protocol::SignalPayload;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle of one peer connection.
///
/// `Created -> Negotiating -> Connected` on success. Any state may go to
/// `Closed` on teardown, or through `Failed` to `Closed` on error or timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerState {
    Created,
    Negotiating,
    Connected,
    Failed,
    Closed,
}

impl PeerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerState::Created => "created",
            PeerState::Negotiating => "negotiating",
            PeerState::Connected => "connected",
            PeerState::Failed => "failed",
            PeerState::Closed => "closed",
        }
    }

    /// `Failed` and `Closed` accept no further signals.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PeerState::Failed | PeerState::Closed)
    }
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Audio received from a remote peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStream {
    pub id: String,
}

/// Callbacks from a negotiation primitive, as a single event type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// A local offer, answer or candidate that must reach the remote side.
    SignalEmitted(SignalPayload),
    StreamReceived(RemoteStream),
    /// Transport established.
    Connected,
    ErrorOccurred(String),
    /// The primitive closed on its own.
    Closed,
}

impl PeerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            PeerEvent::SignalEmitted(_) => "signal",
            PeerEvent::StreamReceived(_) => "stream",
            PeerEvent::Connected => "connect",
            PeerEvent::ErrorOccurred(_) => "error",
            PeerEvent::Closed => "close",
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PeerError {
    #[error("peer connection already destroyed")]
    Destroyed,
    #[error("invalid signal: {0}")]
    InvalidSignal(String),
    #[error("negotiation failed: {0}")]
    Negotiation(String),
}
