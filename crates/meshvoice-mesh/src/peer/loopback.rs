//! In-memory negotiation primitive for tests and single-process simulations.
//!
//! Performs a scripted exchange: the initiator emits an offer (and a
//! candidate when trickling), the other side answers (plus a candidate),
//! and each side reports a stream and a connection once it holds the remote
//! description and, when trickling, at least one remote candidate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::primitive::{NegotiationPrimitive, PeerEventSink, PrimitiveFactory, PrimitiveOptions};
use super::types::{PeerError, PeerEvent, RemoteStream};
use crate::protocol::{IceCandidate, SignalPayload};

/// Factory for `LoopbackPrimitive`s. Clones share counters.
#[derive(Debug, Clone, Default)]
pub struct LoopbackFactory {
    created: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
}

impl LoopbackFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Primitives created so far.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Primitives created and not yet destroyed.
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl PrimitiveFactory for LoopbackFactory {
    fn create(
        &self,
        options: PrimitiveOptions,
        events: PeerEventSink,
    ) -> Result<Box<dyn NegotiationPrimitive>, PeerError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);

        let primitive = LoopbackPrimitive {
            local_id: options.local_id,
            peer_id: options.peer_id,
            initiator: options.initiator,
            trickle: options.trickle,
            events,
            live: Arc::clone(&self.live),
            has_remote_description: false,
            has_remote_candidate: false,
            connected: false,
            destroyed: false,
        };
        if primitive.initiator {
            primitive.emit_local(SignalPayload::Offer {
                sdp: primitive.sdp("offer"),
            });
        }
        Ok(Box::new(primitive))
    }
}

struct LoopbackPrimitive {
    local_id: String,
    peer_id: String,
    initiator: bool,
    trickle: bool,
    events: PeerEventSink,
    live: Arc<AtomicUsize>,
    has_remote_description: bool,
    has_remote_candidate: bool,
    connected: bool,
    destroyed: bool,
}

impl LoopbackPrimitive {
    fn sdp(&self, kind: &str) -> String {
        format!("v=0 loopback {kind} {} -> {} m=audio", self.local_id, self.peer_id)
    }

    /// Emit a description followed, when trickling, by one host candidate.
    fn emit_local(&self, description: SignalPayload) {
        self.events.emit(PeerEvent::SignalEmitted(description));
        if self.trickle {
            self.events.emit(PeerEvent::SignalEmitted(SignalPayload::Candidate {
                candidate: IceCandidate {
                    candidate: format!(
                        "candidate:1 1 udp 2122260223 loopback.{} 9 typ host",
                        self.local_id
                    ),
                    sdp_mid: Some("0".into()),
                    sdp_m_line_index: Some(0),
                },
            }));
        }
    }

    fn maybe_connect(&mut self) {
        if self.connected || !self.has_remote_description {
            return;
        }
        if self.trickle && !self.has_remote_candidate {
            return;
        }
        self.connected = true;
        self.events.emit(PeerEvent::StreamReceived(RemoteStream {
            id: format!("{}-audio", self.peer_id),
        }));
        self.events.emit(PeerEvent::Connected);
    }
}

impl NegotiationPrimitive for LoopbackPrimitive {
    fn apply_signal(&mut self, payload: SignalPayload) -> Result<(), PeerError> {
        if self.destroyed {
            return Err(PeerError::Destroyed);
        }
        match payload {
            SignalPayload::Offer { .. } => {
                if self.initiator {
                    return Err(PeerError::Negotiation("offer received by initiator".into()));
                }
                self.has_remote_description = true;
                self.emit_local(SignalPayload::Answer {
                    sdp: self.sdp("answer"),
                });
            }
            SignalPayload::Answer { .. } => {
                if !self.initiator {
                    return Err(PeerError::Negotiation("answer received by non-initiator".into()));
                }
                self.has_remote_description = true;
            }
            SignalPayload::Candidate { candidate } => {
                if !self.has_remote_description {
                    return Err(PeerError::Negotiation(
                        "candidate received before remote description".into(),
                    ));
                }
                if candidate.candidate.is_empty() {
                    return Err(PeerError::InvalidSignal("empty candidate".into()));
                }
                self.has_remote_candidate = true;
            }
        }
        self.maybe_connect();
        Ok(())
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.live.fetch_sub(1, Ordering::SeqCst);
        self.events.emit(PeerEvent::Closed);
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::LocalMedia;
    use crate::mock::MockTrack;
    use crate::voice::MeshInput;
    use tokio::sync::mpsc;

    fn create(
        factory: &LoopbackFactory,
        local: &str,
        peer: &str,
        initiator: bool,
        trickle: bool,
    ) -> (Box<dyn NegotiationPrimitive>, mpsc::UnboundedReceiver<MeshInput>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let options = PrimitiveOptions {
            peer_id: peer.into(),
            local_id: local.into(),
            initiator,
            local_media: LocalMedia::new(Arc::new(MockTrack::new("mic"))),
            ice_servers: Vec::new(),
            ice_candidate_pool_size: 0,
            trickle,
        };
        let primitive = factory
            .create(options, PeerEventSink::new(peer, 0, tx))
            .unwrap();
        (primitive, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<MeshInput>) -> Vec<PeerEvent> {
        let mut events = Vec::new();
        while let Ok(MeshInput::Peer { event, .. }) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn signals(events: &[PeerEvent]) -> Vec<SignalPayload> {
        events
            .iter()
            .filter_map(|e| match e {
                PeerEvent::SignalEmitted(p) => Some(p.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn scripted_exchange_connects_both_sides() {
        let factory = LoopbackFactory::new();
        let (mut b, mut b_rx) = create(&factory, "b", "a", true, true);
        let (mut a, mut a_rx) = create(&factory, "a", "b", false, true);

        let from_b = signals(&drain(&mut b_rx));
        assert_eq!(from_b.len(), 2);
        for payload in from_b {
            a.apply_signal(payload).unwrap();
        }
        let a_events = drain(&mut a_rx);
        assert!(a_events.contains(&PeerEvent::Connected));

        for payload in signals(&a_events) {
            b.apply_signal(payload).unwrap();
        }
        let b_events = drain(&mut b_rx);
        assert!(matches!(b_events[0], PeerEvent::StreamReceived(_)));
        assert_eq!(b_events[1], PeerEvent::Connected);
        assert_eq!(factory.created_count(), 2);
    }

    #[test]
    fn non_trickle_connects_on_description() {
        let factory = LoopbackFactory::new();
        let (_b, mut b_rx) = create(&factory, "b", "a", true, false);
        let offer = signals(&drain(&mut b_rx));
        assert_eq!(offer.len(), 1);

        let (mut a, mut a_rx) = create(&factory, "a", "b", false, false);
        a.apply_signal(offer[0].clone()).unwrap();
        assert!(drain(&mut a_rx).contains(&PeerEvent::Connected));
    }

    #[test]
    fn early_candidate_is_rejected() {
        let factory = LoopbackFactory::new();
        let (mut a, _rx) = create(&factory, "a", "b", false, true);
        let err = a
            .apply_signal(SignalPayload::Candidate {
                candidate: IceCandidate {
                    candidate: "candidate:1".into(),
                    sdp_mid: None,
                    sdp_m_line_index: None,
                },
            })
            .unwrap_err();
        assert!(matches!(err, PeerError::Negotiation(_)));
    }

    #[test]
    fn destroy_is_idempotent_and_reports_close() {
        let factory = LoopbackFactory::new();
        let (mut a, mut rx) = create(&factory, "a", "b", false, true);
        a.destroy();
        a.destroy();
        assert!(a.is_destroyed());
        assert_eq!(factory.live_count(), 0);
        assert_eq!(drain(&mut rx), vec![PeerEvent::Closed]);
        assert_eq!(
            a.apply_signal(SignalPayload::Offer { sdp: "o".into() }),
            Err(PeerError::Destroyed)
        );
    }
}
