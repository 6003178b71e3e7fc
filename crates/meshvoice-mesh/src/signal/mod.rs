//! Signal channel: the relay used purely as a signaling transport.
//!
//! A channel is scoped to one room. Messages are appended addressed to a
//! recipient, delivered to that recipient's live subscription, and deleted
//! once consumed. Delivery is at-least-once; consumers must tolerate
//! duplicates.

mod memory;
mod store;
pub mod wire;

pub use memory::MemorySignalChannel;
pub use store::{SignalRecord, SignalStore};

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::protocol::SignalMessage;

/// Errors from relay operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignalError {
    #[error("not connected to the relay")]
    NotConnected,
    #[error("relay request timed out")]
    Timeout,
    #[error("relay rejected request: {0}")]
    Rejected(String),
    #[error("codec error: {0}")]
    Codec(String),
    #[error("relay channel closed")]
    Closed,
}

/// Handle used to delete a consumed message from the relay.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AckHandle {
    id: String,
}

impl AckHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// A message delivered to the local participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundSignal {
    pub from: String,
    /// Serialized payload as stored on the relay; parsing happens upstream.
    pub payload: String,
    pub created_at: u64,
    pub ack: AckHandle,
}

impl From<SignalRecord> for InboundSignal {
    fn from(record: SignalRecord) -> Self {
        Self {
            from: record.from,
            payload: record.payload,
            created_at: record.created_at,
            ack: AckHandle::new(record.id),
        }
    }
}

/// Live subscription to messages addressed to one participant.
///
/// Cancelling (or dropping) the subscription stops delivery.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<SignalRecord>,
    token: CancellationToken,
}

impl Subscription {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<SignalRecord>, token: CancellationToken) -> Self {
        Self { rx, token }
    }

    /// Wait for the next message. Returns `None` once the subscription ends.
    pub async fn recv(&mut self) -> Option<InboundSignal> {
        self.rx.recv().await.map(InboundSignal::from)
    }

    pub fn try_recv(&mut self) -> Option<InboundSignal> {
        self.rx.try_recv().ok().map(InboundSignal::from)
    }

    pub fn cancel(&mut self) {
        self.token.cancel();
        self.rx.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

/// Room-scoped signaling transport.
#[async_trait]
pub trait SignalChannel: Send + Sync {
    /// Append a message addressed to `message.to`.
    async fn publish(&self, message: SignalMessage) -> Result<(), SignalError>;

    /// Open a live subscription to messages addressed to `self_id`.
    ///
    /// Messages still stored on the relay are delivered first.
    async fn subscribe(&self, self_id: &str) -> Result<Subscription, SignalError>;

    /// Delete a consumed message. Deleting an unknown message is not an error.
    async fn ack(&self, handle: &AckHandle) -> Result<(), SignalError>;

    /// Delete every message sent by or addressed to `self_id`.
    /// Returns the number of deleted messages.
    async fn purge_all(&self, self_id: &str) -> Result<usize, SignalError>;
}

#[async_trait]
impl<T: SignalChannel + ?Sized> SignalChannel for Arc<T> {
    async fn publish(&self, message: SignalMessage) -> Result<(), SignalError> {
        (**self).publish(message).await
    }

    async fn subscribe(&self, self_id: &str) -> Result<Subscription, SignalError> {
        (**self).subscribe(self_id).await
    }

    async fn ack(&self, handle: &AckHandle) -> Result<(), SignalError> {
        (**self).ack(handle).await
    }

    async fn purge_all(&self, self_id: &str) -> Result<usize, SignalError> {
        (**self).purge_all(self_id).await
    }
}
