//! Per-peer connection records and the negotiation primitive seam.
//!
//! A `PeerConnection` wraps one `NegotiationPrimitive` (the third-party
//! offer/answer/ICE engine) and owns everything attached to it: the
//! connection timeout, the remote stream and its playback sink.

mod connection;
mod loopback;
mod primitive;
mod types;

pub use connection::PeerConnection;
pub use loopback::LoopbackFactory;
pub use primitive::{NegotiationPrimitive, PeerEventSink, PrimitiveFactory, PrimitiveOptions};
pub use types::{PeerError, PeerEvent, PeerState, RemoteStream};
