//! Types, settings, and events for the voice mesh.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use meshvoice_config::schema::{IceServerConfig, VoiceConfig};
use serde::Serialize;
use thiserror::Error;

use crate::media::{AudioConstraints, MediaDevices, MediaError};
use crate::peer::{PeerEvent, PeerState, PrimitiveFactory};
use crate::signal::{InboundSignal, SignalChannel, SignalError};
use crate::sink::AudioOutput;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Everything the coordinator's event loop reacts to, besides direct calls.
#[derive(Debug)]
pub enum MeshInput {
    /// A callback from the primitive of record `(peer_id, epoch)`.
    Peer {
        peer_id: String,
        epoch: u64,
        event: PeerEvent,
    },
    /// The negotiation timer of record `(peer_id, epoch)` expired.
    Timeout { peer_id: String, epoch: u64 },
    /// A relay message addressed to self.
    Signal(InboundSignal),
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Events emitted by the voice mesh for the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceEvent {
    SessionStarted,
    SessionStopped,
    PeerStateChanged { peer_id: String, state: PeerState },
    RemoteStreamAttached { peer_id: String },
    MuteChanged { muted: bool },
    /// Session-level failure, as a human-readable message.
    Error(String),
}

/// Snapshot of the observable session state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MeshStatus {
    pub is_active: bool,
    pub is_connecting: bool,
    pub is_muted: bool,
    pub connected_peers: usize,
    pub peers: BTreeMap<String, PeerState>,
    pub last_error: Option<String>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures that prevent a voice session from starting.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error("cannot subscribe to signaling: {0}")]
    Subscribe(SignalError),
    #[error("voice session task stopped")]
    Stopped,
}

impl SessionError {
    /// Human-readable category for the UI.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Media(e) => e.user_message(),
            SessionError::Subscribe(_) => "Failed to start voice chat".into(),
            SessionError::Stopped => "Voice chat is not running".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Consumed ids
// ---------------------------------------------------------------------------

/// Relay message ids remembered for duplicate suppression.
const CONSUMED_CAPACITY: usize = 4096;

/// Bounded set of consumed relay message ids. The oldest id is forgotten
/// first once the capacity is reached.
#[derive(Debug, Default)]
pub(crate) struct ConsumedIds {
    ids: HashSet<String>,
    order: VecDeque<String>,
}

impl ConsumedIds {
    /// Returns false if `id` was already consumed.
    pub(crate) fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        if self.order.len() == CONSUMED_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.ids.insert(id.to_string());
        self.order.push_back(id.to_string());
        true
    }

    pub(crate) fn clear(&mut self) {
        self.ids.clear();
        self.order.clear();
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Runtime settings derived from `[voice]` config.
#[derive(Debug, Clone)]
pub struct VoiceSettings {
    pub connect_timeout: Duration,
    pub trickle: bool,
    pub ice_candidate_pool_size: u32,
    pub ice_servers: Vec<IceServerConfig>,
    pub audio: AudioConstraints,
    pub playback_volume: f64,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self::from(&VoiceConfig::default())
    }
}

impl From<&VoiceConfig> for VoiceSettings {
    fn from(config: &VoiceConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            trickle: config.trickle,
            ice_candidate_pool_size: config.ice_candidate_pool_size,
            ice_servers: config.ice_servers.clone(),
            audio: AudioConstraints::from(&config.audio),
            playback_volume: config.audio.playback_volume,
        }
    }
}

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

/// External collaborators used by a coordinator.
#[derive(Clone)]
pub struct MeshBackends {
    pub channel: Arc<dyn SignalChannel>,
    pub factory: Arc<dyn PrimitiveFactory>,
    pub media: Arc<dyn MediaDevices>,
    pub output: Arc<dyn AudioOutput>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumed_ids_reject_repeats() {
        let mut consumed = ConsumedIds::default();
        assert!(consumed.insert("a"));
        assert!(!consumed.insert("a"));
        assert!(consumed.insert("b"));
        consumed.clear();
        assert!(consumed.insert("a"));
    }

    #[test]
    fn consumed_ids_forget_oldest_at_capacity() {
        let mut consumed = ConsumedIds::default();
        for i in 0..CONSUMED_CAPACITY {
            assert!(consumed.insert(&i.to_string()));
        }
        assert!(consumed.insert("overflow"));
        assert!(consumed.insert("0"));
        assert!(!consumed.insert("overflow"));
    }
}
