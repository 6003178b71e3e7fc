//! The seam to the third-party offer/answer/ICE engine.

use meshvoice_config::schema::IceServerConfig;
use tokio::sync::mpsc;

use super::types::{PeerError, PeerEvent};
use crate::media::LocalMedia;
use crate::protocol::SignalPayload;
use crate::voice::MeshInput;

/// Everything a primitive needs at creation.
#[derive(Debug, Clone)]
pub struct PrimitiveOptions {
    pub peer_id: String,
    pub local_id: String,
    pub initiator: bool,
    /// Outbound audio. Shared read-only by every peer.
    pub local_media: LocalMedia,
    pub ice_servers: Vec<IceServerConfig>,
    pub ice_candidate_pool_size: u32,
    pub trickle: bool,
}

/// Where a primitive reports its callbacks.
///
/// Events are tagged with the peer id and the record epoch so that events
/// from a destroyed primitive never reach a newer record for the same peer.
#[derive(Debug, Clone)]
pub struct PeerEventSink {
    peer_id: String,
    epoch: u64,
    tx: mpsc::UnboundedSender<MeshInput>,
}

impl PeerEventSink {
    pub fn new(
        peer_id: impl Into<String>,
        epoch: u64,
        tx: mpsc::UnboundedSender<MeshInput>,
    ) -> Self {
        Self {
            peer_id: peer_id.into(),
            epoch,
            tx,
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Queue an event for the coordinator. Returns false once the
    /// coordinator is gone.
    pub fn emit(&self, event: PeerEvent) -> bool {
        self.tx
            .send(MeshInput::Peer {
                peer_id: self.peer_id.clone(),
                epoch: self.epoch,
                event,
            })
            .is_ok()
    }
}

/// One offer/answer/ICE negotiation with a single remote peer.
///
/// Implementations report progress through the `PeerEventSink` they were
/// created with and must never block.
pub trait NegotiationPrimitive: Send + Sync {
    /// Apply a remote offer, answer or candidate.
    fn apply_signal(&mut self, payload: SignalPayload) -> Result<(), PeerError>;
    /// Tear down the transport. Idempotent.
    fn destroy(&mut self);
    fn is_destroyed(&self) -> bool;
}

/// Creates primitives. An initiator starts emitting an offer right away.
pub trait PrimitiveFactory: Send + Sync {
    fn create(
        &self,
        options: PrimitiveOptions,
        events: PeerEventSink,
    ) -> Result<Box<dyn NegotiationPrimitive>, PeerError>;
}
