//! Mesh coordinator: peer map, roster reconciliation, signal routing and
//! teardown.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::types::{
    ConsumedIds, MeshBackends, MeshInput, MeshStatus, SessionError, VoiceEvent, VoiceSettings,
};
use crate::election;
use crate::media::LocalMedia;
use crate::peer::{PeerConnection, PeerEvent, PeerEventSink, PeerState, PrimitiveOptions};
use crate::protocol::{Participant, SignalMessage, SignalPayload};
use crate::signal::{AckHandle, InboundSignal, Subscription};
use crate::supervisor::ConnectionSupervisor;

// ---------------------------------------------------------------------------
// Mesh Coordinator
// ---------------------------------------------------------------------------

/// Owns the voice session of one local participant.
///
/// All state is mutated from a single event loop (`step` / `dispatch`), so
/// the peer map needs no locking. At most one `PeerConnection` exists per
/// peer id at any time.
pub struct MeshCoordinator {
    self_id: String,
    settings: VoiceSettings,
    backends: MeshBackends,
    peers: HashMap<String, PeerConnection>,
    local_media: Option<LocalMedia>,
    subscription: Option<Subscription>,
    input_tx: mpsc::UnboundedSender<MeshInput>,
    input_rx: mpsc::UnboundedReceiver<MeshInput>,
    event_tx: mpsc::Sender<VoiceEvent>,
    next_epoch: u64,
    /// Relay message ids already consumed in this session.
    consumed: ConsumedIds,
    is_connecting: bool,
    is_muted: bool,
    last_error: Option<String>,
}

impl MeshCoordinator {
    pub fn new(
        self_id: impl Into<String>,
        settings: VoiceSettings,
        backends: MeshBackends,
    ) -> (Self, mpsc::Receiver<VoiceEvent>) {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            self_id: self_id.into(),
            settings,
            backends,
            peers: HashMap::new(),
            local_media: None,
            subscription: None,
            input_tx,
            input_rx,
            event_tx,
            next_epoch: 1,
            consumed: ConsumedIds::default(),
            is_connecting: false,
            is_muted: false,
            last_error: None,
        };
        (coordinator, event_rx)
    }

    // -- Session ------------------------------------------------------------

    /// Acquire the microphone, subscribe to signals addressed to self, and
    /// connect to every voice-active participant of `roster`.
    ///
    /// Only microphone and subscription failures are returned; per-peer
    /// failures are handled locally.
    pub async fn start_voice_chat(&mut self, roster: &[Participant]) -> Result<(), SessionError> {
        let newly_started = self.local_media.is_none();

        if self.local_media.is_none() {
            self.is_connecting = true;
            self.last_error = None;
            let acquired =
                LocalMedia::acquire(self.backends.media.as_ref(), &self.settings.audio).await;
            self.is_connecting = false;
            match acquired {
                Ok(media) => self.local_media = Some(media),
                Err(e) => {
                    warn!(error = %e, "Microphone access failed");
                    return Err(self.session_failed(SessionError::Media(e)));
                }
            }
        }

        if self.subscription.is_none() {
            match self.backends.channel.subscribe(&self.self_id).await {
                Ok(subscription) => self.subscription = Some(subscription),
                Err(e) => {
                    warn!(error = %e, "Signal subscription failed");
                    if let Some(media) = self.local_media.take() {
                        media.release();
                    }
                    return Err(self.session_failed(SessionError::Subscribe(e)));
                }
            }
        }

        if newly_started {
            info!(self_id = %self.self_id, "Voice chat started");
            self.emit(VoiceEvent::SessionStarted);
        }
        self.reconcile(roster);
        Ok(())
    }

    fn session_failed(&mut self, error: SessionError) -> SessionError {
        let message = error.user_message();
        self.last_error = Some(message.clone());
        self.emit(VoiceEvent::Error(message));
        error
    }

    /// Tear the session down: stop receiving signals, close every peer,
    /// release the microphone, and purge relay traffic for self.
    pub async fn stop_voice_chat(&mut self) {
        let was_active = self.local_media.is_some();

        if let Some(mut subscription) = self.subscription.take() {
            subscription.cancel();
        }

        let peer_ids: Vec<String> = self.peers.keys().cloned().collect();
        for peer_id in peer_ids {
            self.close_peer(&peer_id);
        }

        // Late primitive callbacks and timer expiries belong to closed records.
        while self.input_rx.try_recv().is_ok() {}

        if let Some(media) = self.local_media.take() {
            media.release();
        }

        match self.backends.channel.purge_all(&self.self_id).await {
            Ok(removed) => debug!(removed, "Purged signaling traffic"),
            Err(e) => warn!(error = %e, "Failed to purge signaling traffic"),
        }

        self.consumed.clear();
        self.is_muted = false;
        self.is_connecting = false;

        if was_active {
            info!(self_id = %self.self_id, "Voice chat stopped");
            self.emit(VoiceEvent::SessionStopped);
        }
    }

    // -- Roster -------------------------------------------------------------

    /// Create a connection to every voice-active participant that has none.
    pub fn reconcile(&mut self, roster: &[Participant]) {
        for participant in roster {
            self.connect_if_wanted(participant);
        }
    }

    pub fn handle_user_joined(&mut self, participant: &Participant) {
        self.connect_if_wanted(participant);
    }

    /// A roster member toggled voice on or off.
    pub fn handle_participant_updated(&mut self, participant: &Participant) {
        if participant.id == self.self_id {
            return;
        }
        if participant.is_voice_active {
            self.connect_if_wanted(participant);
        } else if self.close_peer(&participant.id) {
            info!(peer_id = %participant.id, "Participant deactivated voice");
        }
    }

    /// Tear down the connection to a departed participant. Not an error.
    pub fn handle_user_left(&mut self, peer_id: &str) {
        if self.close_peer(peer_id) {
            info!(peer_id, "Participant left, connection removed");
        }
    }

    fn connect_if_wanted(&mut self, participant: &Participant) {
        if participant.id == self.self_id
            || !participant.is_voice_active
            || self.peers.contains_key(&participant.id)
        {
            return;
        }
        let election = election::decide(&self.self_id, &participant.id);
        info!(
            peer_id = %participant.id,
            username = %participant.username,
            initiator = election.initiator,
            "Connecting to voice-active participant"
        );
        self.create_peer(&participant.id, election.initiator);
    }

    // -- Peers --------------------------------------------------------------

    /// Create and insert a record. Returns false if none was created.
    fn create_peer(&mut self, peer_id: &str, initiator: bool) -> bool {
        if self.peers.contains_key(peer_id) {
            return false;
        }
        let Some(local_media) = self.local_media.clone() else {
            debug!(peer_id, "No local media, not creating peer");
            return false;
        };

        let epoch = self.next_epoch;
        self.next_epoch += 1;

        let options = PrimitiveOptions {
            peer_id: peer_id.to_string(),
            local_id: self.self_id.clone(),
            initiator,
            local_media,
            ice_servers: self.settings.ice_servers.clone(),
            ice_candidate_pool_size: self.settings.ice_candidate_pool_size,
            trickle: self.settings.trickle,
        };
        let events = PeerEventSink::new(peer_id, epoch, self.input_tx.clone());
        let supervisor = ConnectionSupervisor::arm(
            peer_id,
            epoch,
            self.settings.connect_timeout,
            self.input_tx.clone(),
        );

        match PeerConnection::open(options, self.backends.factory.as_ref(), events, supervisor) {
            Ok(connection) => {
                self.peers.insert(peer_id.to_string(), connection);
                self.emit_state(peer_id, PeerState::Created);
                true
            }
            Err(e) => {
                warn!(peer_id, error = %e, "Failed to create peer connection");
                self.emit_state(peer_id, PeerState::Failed);
                self.emit_state(peer_id, PeerState::Closed);
                false
            }
        }
    }

    /// Close and evict a record without reporting failure.
    fn close_peer(&mut self, peer_id: &str) -> bool {
        let Some(mut connection) = self.peers.remove(peer_id) else {
            return false;
        };
        connection.close();
        self.emit_state(peer_id, PeerState::Closed);
        true
    }

    /// `Failed -> Closed`, then evict. Never affects other peers.
    fn fail_peer(&mut self, peer_id: &str) {
        let Some(mut connection) = self.peers.remove(peer_id) else {
            return;
        };
        if connection.mark_failed() {
            self.emit_state(peer_id, PeerState::Failed);
        }
        connection.close();
        self.emit_state(peer_id, PeerState::Closed);
    }

    // -- Signals ------------------------------------------------------------

    /// Route one relay message to its peer.
    ///
    /// The message is acknowledged whatever happens to it. Only an offer
    /// may create a record for an unknown peer. Redelivered messages are
    /// only acknowledged.
    pub async fn on_remote_signal(&mut self, signal: InboundSignal) {
        let InboundSignal {
            from, payload, ack, ..
        } = signal;

        if !self.consumed.insert(ack.id()) {
            debug!(from = %from, id = ack.id(), "Duplicate signal, already consumed");
            self.ack(ack).await;
            return;
        }

        let payload = match SignalPayload::from_json(&payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(from = %from, error = %e, "Unparseable signal dropped");
                self.ack(ack).await;
                return;
            }
        };
        debug!(from = %from, kind = payload.kind(), "Received signal");

        if !self.peers.contains_key(&from) {
            if !payload.is_offer() {
                warn!(from = %from, kind = payload.kind(), "Signal for unknown peer ignored");
                self.ack(ack).await;
                return;
            }
            info!(peer_id = %from, "Incoming offer, creating peer connection");
            if !self.create_peer(&from, false) {
                self.ack(ack).await;
                return;
            }
        }

        let mut entered_negotiating = false;
        if let Some(connection) = self.peers.get_mut(&from) {
            let before = connection.state();
            if let Err(e) = connection.apply_remote(payload) {
                warn!(peer_id = %from, error = %e, "Failed to apply signal");
            }
            entered_negotiating =
                before == PeerState::Created && connection.state() == PeerState::Negotiating;
        }
        if entered_negotiating {
            self.emit_state(&from, PeerState::Negotiating);
        }

        self.ack(ack).await;
    }

    async fn ack(&self, ack: AckHandle) {
        if let Err(e) = self.backends.channel.ack(&ack).await {
            warn!(id = ack.id(), error = %e, "Failed to delete consumed signal");
        }
    }

    // -- Primitive callbacks ------------------------------------------------

    pub async fn handle_peer_event(&mut self, peer_id: &str, epoch: u64, event: PeerEvent) {
        let current = self.peers.get(peer_id).map(|c| c.epoch());
        if current != Some(epoch) {
            debug!(peer_id, epoch, kind = event.kind(), "Event for stale peer record ignored");
            return;
        }

        match event {
            PeerEvent::SignalEmitted(payload) => {
                let entered_negotiating = self
                    .peers
                    .get_mut(peer_id)
                    .is_some_and(|c| c.mark_negotiating());
                if entered_negotiating {
                    self.emit_state(peer_id, PeerState::Negotiating);
                }
                self.publish(peer_id, &payload).await;
            }
            PeerEvent::StreamReceived(stream) => {
                info!(peer_id, stream = %stream.id, "Received remote stream");
                let volume = self.settings.playback_volume;
                let attached = match self.peers.get_mut(peer_id) {
                    Some(connection) => {
                        connection.attach_stream(stream, self.backends.output.as_ref(), volume)
                    }
                    None => return,
                };
                match attached {
                    Ok(()) => self.emit(VoiceEvent::RemoteStreamAttached {
                        peer_id: peer_id.to_string(),
                    }),
                    Err(e) => warn!(peer_id, error = %e, "Failed to play remote stream"),
                }
            }
            PeerEvent::Connected => {
                let connected = self
                    .peers
                    .get_mut(peer_id)
                    .is_some_and(|c| c.mark_connected());
                if connected {
                    self.emit_state(peer_id, PeerState::Connected);
                }
            }
            PeerEvent::ErrorOccurred(message) => {
                warn!(peer_id, error = %message, "Peer error");
                self.fail_peer(peer_id);
            }
            PeerEvent::Closed => {
                info!(peer_id, "Connection closed by peer");
                self.close_peer(peer_id);
            }
        }
    }

    async fn publish(&self, peer_id: &str, payload: &SignalPayload) {
        let message = match SignalMessage::new(&self.self_id, peer_id, payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(peer_id, error = %e, "Failed to encode signal");
                return;
            }
        };
        // A lost outbound signal surfaces later as a connection timeout.
        if let Err(e) = self.backends.channel.publish(message).await {
            warn!(peer_id, kind = payload.kind(), error = %e, "Failed to send signal");
        }
    }

    /// The negotiation timer of a record expired.
    pub fn on_timeout(&mut self, peer_id: &str, epoch: u64) {
        let pending = self
            .peers
            .get(peer_id)
            .is_some_and(|c| c.epoch() == epoch && !c.is_connected());
        if !pending {
            return;
        }
        warn!(
            peer_id,
            timeout_secs = self.settings.connect_timeout.as_secs(),
            "Connection timed out"
        );
        self.fail_peer(peer_id);
    }

    // -- Event loop ---------------------------------------------------------

    /// Wait for the next primitive event, timer expiry or relay message.
    pub async fn next_input(&mut self) -> Option<MeshInput> {
        let subscription = self.subscription.as_mut();
        tokio::select! {
            biased;
            Some(input) = self.input_rx.recv() => Some(input),
            Some(signal) = next_signal(subscription) => Some(MeshInput::Signal(signal)),
            else => None,
        }
    }

    pub async fn dispatch(&mut self, input: MeshInput) {
        match input {
            MeshInput::Peer {
                peer_id,
                epoch,
                event,
            } => self.handle_peer_event(&peer_id, epoch, event).await,
            MeshInput::Timeout { peer_id, epoch } => self.on_timeout(&peer_id, epoch),
            MeshInput::Signal(signal) => self.on_remote_signal(signal).await,
        }
    }

    /// Process one input. Returns false once no input can arrive anymore.
    pub async fn step(&mut self) -> bool {
        match self.next_input().await {
            Some(input) => {
                self.dispatch(input).await;
                true
            }
            None => false,
        }
    }

    /// Process every input that is ready without waiting. Returns the
    /// number processed.
    pub async fn run_until_idle(&mut self) -> usize {
        let mut processed = 0;
        loop {
            let input = match self.input_rx.try_recv() {
                Ok(input) => input,
                Err(_) => match self.subscription.as_mut().and_then(|s| s.try_recv()) {
                    Some(signal) => MeshInput::Signal(signal),
                    None => break,
                },
            };
            self.dispatch(input).await;
            processed += 1;
        }
        processed
    }

    // -- Mute ---------------------------------------------------------------

    /// Flip the local track's enabled flag. No-op without local media.
    pub fn toggle_mute(&mut self) -> bool {
        let Some(media) = &self.local_media else {
            return self.is_muted;
        };
        let muted = !media.is_muted();
        media.set_muted(muted);
        self.is_muted = muted;
        info!(muted, "Microphone mute toggled");
        self.emit(VoiceEvent::MuteChanged { muted });
        muted
    }

    // -- Observers ----------------------------------------------------------

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    pub fn is_active(&self) -> bool {
        self.local_media.is_some()
    }

    pub fn is_connecting(&self) -> bool {
        self.is_connecting
    }

    pub fn is_muted(&self) -> bool {
        self.is_muted
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn connected_peer_count(&self) -> usize {
        self.peers.values().filter(|c| c.is_connected()).count()
    }

    pub fn peer_state(&self, peer_id: &str) -> Option<PeerState> {
        self.peers.get(peer_id).map(|c| c.state())
    }

    pub fn peer(&self, peer_id: &str) -> Option<&PeerConnection> {
        self.peers.get(peer_id)
    }

    pub fn peer_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.peers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn status(&self) -> MeshStatus {
        MeshStatus {
            is_active: self.is_active(),
            is_connecting: self.is_connecting,
            is_muted: self.is_muted,
            connected_peers: self.connected_peer_count(),
            peers: self
                .peers
                .iter()
                .map(|(id, c)| (id.clone(), c.state()))
                .collect(),
            last_error: self.last_error.clone(),
        }
    }

    // -- Events -------------------------------------------------------------

    fn emit(&self, event: VoiceEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            debug!(error = %e, "Voice event dropped");
        }
    }

    fn emit_state(&self, peer_id: &str, state: PeerState) {
        debug!(peer_id, state = %state, "Peer state changed");
        self.emit(VoiceEvent::PeerStateChanged {
            peer_id: peer_id.to_string(),
            state,
        });
    }
}

async fn next_signal(subscription: Option<&mut Subscription>) -> Option<InboundSignal> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}
