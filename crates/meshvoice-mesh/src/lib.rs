//! Full-mesh, audio-only voice chat signaling.
//!
//! Every voice-active participant of a room holds one direct peer
//! connection to every other voice-active participant. Offers, answers and
//! ICE candidates are ferried through a shared relay store until the direct
//! connection exists. This crate owns the signaling protocol and the
//! per-peer connection lifecycle; media transport itself is delegated to a
//! [`PrimitiveFactory`] implementation.

pub mod election;
pub mod media;
pub mod mock;
pub mod peer;
pub mod protocol;
pub mod relay;
pub mod signal;
pub mod sink;
pub mod supervisor;
pub mod voice;

pub use election::{decide, Election};
pub use media::{AudioConstraints, LocalMedia, LocalTrack, MediaDevices, MediaError};
pub use peer::{
    LoopbackFactory, NegotiationPrimitive, PeerConnection, PeerError, PeerEvent, PeerEventSink,
    PeerState, PrimitiveFactory, PrimitiveOptions, RemoteStream,
};
pub use protocol::{IceCandidate, Participant, SignalMessage, SignalPayload};
pub use relay::RelaySignalChannel;
pub use signal::{
    AckHandle, InboundSignal, MemorySignalChannel, SignalChannel, SignalError, SignalRecord,
    SignalStore, Subscription,
};
pub use sink::{AudioOutput, AudioSink, SinkError};
pub use supervisor::ConnectionSupervisor;
pub use voice::{
    MeshBackends, MeshCoordinator, MeshInput, MeshStatus, SessionError, VoiceEvent, VoiceSession,
    VoiceSettings,
};
