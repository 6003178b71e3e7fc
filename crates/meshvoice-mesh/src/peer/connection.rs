//! The per-peer connection record and its state machine.

use std::time::Instant;

use tracing::{debug, info, warn};

use super::primitive::{NegotiationPrimitive, PeerEventSink, PrimitiveFactory, PrimitiveOptions};
use super::types::{PeerError, PeerState, RemoteStream};
use crate::protocol::SignalPayload;
use crate::sink::{AudioOutput, AudioSink, SinkError};
use crate::supervisor::ConnectionSupervisor;

/// One live connection to a remote participant.
///
/// Owned exclusively by the coordinator's peer map. Closing it (explicitly
/// or by drop) cancels the timer, destroys the primitive and removes the
/// playback sink in one step.
pub struct PeerConnection {
    peer_id: String,
    epoch: u64,
    initiator: bool,
    state: PeerState,
    primitive: Box<dyn NegotiationPrimitive>,
    supervisor: Option<ConnectionSupervisor>,
    remote_stream: Option<RemoteStream>,
    sink: Option<Box<dyn AudioSink>>,
    connected_at: Option<Instant>,
}

impl PeerConnection {
    /// Instantiate the primitive and start supervising the negotiation.
    pub fn open(
        options: PrimitiveOptions,
        factory: &dyn PrimitiveFactory,
        events: PeerEventSink,
        supervisor: ConnectionSupervisor,
    ) -> Result<Self, PeerError> {
        let peer_id = options.peer_id.clone();
        let initiator = options.initiator;
        let epoch = events.epoch();
        let primitive = factory.create(options, events)?;
        info!(peer_id = %peer_id, initiator, epoch, "Peer connection created");
        Ok(Self {
            peer_id,
            epoch,
            initiator,
            state: PeerState::Created,
            primitive,
            supervisor: Some(supervisor),
            remote_stream: None,
            sink: None,
            connected_at: None,
        })
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn initiator(&self) -> bool {
        self.initiator
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == PeerState::Connected
    }

    pub fn remote_stream(&self) -> Option<&RemoteStream> {
        self.remote_stream.as_ref()
    }

    pub fn connected_at(&self) -> Option<Instant> {
        self.connected_at
    }

    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    pub fn is_supervised(&self) -> bool {
        self.supervisor.is_some()
    }

    pub fn is_primitive_destroyed(&self) -> bool {
        self.primitive.is_destroyed()
    }

    /// `Created -> Negotiating`. Returns true if the state changed.
    pub fn mark_negotiating(&mut self) -> bool {
        if self.state != PeerState::Created {
            return false;
        }
        self.state = PeerState::Negotiating;
        debug!(peer_id = %self.peer_id, "Negotiating");
        true
    }

    /// Apply a remote signal to the primitive, in arrival order.
    pub fn apply_remote(&mut self, payload: SignalPayload) -> Result<(), PeerError> {
        if self.state.is_terminal() || self.primitive.is_destroyed() {
            return Err(PeerError::Destroyed);
        }
        debug!(peer_id = %self.peer_id, kind = payload.kind(), "Applying remote signal");
        self.mark_negotiating();
        self.primitive.apply_signal(payload)
    }

    /// Play the remote stream, replacing any sink already attached.
    pub fn attach_stream(
        &mut self,
        stream: RemoteStream,
        output: &dyn AudioOutput,
        volume: f64,
    ) -> Result<(), SinkError> {
        if self.state.is_terminal() {
            return Ok(());
        }
        if let Some(mut old) = self.sink.take() {
            debug!(peer_id = %self.peer_id, stream = %old.stream_id(), "Replacing playback sink");
            old.remove();
        }
        let sink = output.attach(&self.peer_id, &stream, volume)?;
        self.sink = Some(sink);
        self.remote_stream = Some(stream);
        Ok(())
    }

    /// Transport established. Cancels the timer. Returns true if the state
    /// changed.
    pub fn mark_connected(&mut self) -> bool {
        if self.state.is_terminal() || self.state == PeerState::Connected {
            return false;
        }
        if let Some(supervisor) = self.supervisor.take() {
            supervisor.cancel();
        }
        self.state = PeerState::Connected;
        self.connected_at = Some(Instant::now());
        info!(peer_id = %self.peer_id, "Peer connected");
        true
    }

    /// Returns true if the state changed.
    pub fn mark_failed(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = PeerState::Failed;
        warn!(peer_id = %self.peer_id, "Peer connection failed");
        true
    }

    /// Release everything held by this record. Returns false if it was
    /// already closed.
    pub fn close(&mut self) -> bool {
        if self.state == PeerState::Closed {
            return false;
        }
        if let Some(supervisor) = self.supervisor.take() {
            supervisor.cancel();
        }
        if !self.primitive.is_destroyed() {
            self.primitive.destroy();
        }
        if let Some(mut sink) = self.sink.take() {
            sink.remove();
        }
        self.remote_stream = None;
        self.state = PeerState::Closed;
        info!(peer_id = %self.peer_id, epoch = self.epoch, "Peer connection closed");
        true
    }
}

impl Drop for PeerConnection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnection")
            .field("peer_id", &self.peer_id)
            .field("epoch", &self.epoch)
            .field("initiator", &self.initiator)
            .field("state", &self.state)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}
