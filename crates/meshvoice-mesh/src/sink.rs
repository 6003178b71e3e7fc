//! Playback of remote audio streams.

use thiserror::Error;

use crate::peer::RemoteStream;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("playback failed: {0}")]
    Playback(String),
}

/// A playing remote stream. One per connected peer.
pub trait AudioSink: Send + Sync {
    fn stream_id(&self) -> &str;
    /// Detach the stream and remove the output. Calling twice is harmless.
    fn remove(&mut self);
}

/// Platform audio output that can play remote streams.
pub trait AudioOutput: Send + Sync {
    /// Start playing `stream` for `peer_id` at `volume` (0.0-1.0).
    fn attach(
        &self,
        peer_id: &str,
        stream: &RemoteStream,
        volume: f64,
    ) -> Result<Box<dyn AudioSink>, SinkError>;
}
