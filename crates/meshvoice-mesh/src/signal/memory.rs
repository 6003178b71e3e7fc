//! In-process signal channel backed by a shared `SignalStore`.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::store::SignalStore;
use super::{AckHandle, SignalChannel, SignalError, Subscription};
use crate::protocol::SignalMessage;

/// Signal channel for one room of an in-process `SignalStore`.
///
/// Several channels (one per simulated participant) can share the same store.
#[derive(Clone)]
pub struct MemorySignalChannel {
    store: SignalStore,
    room_id: String,
}

impl MemorySignalChannel {
    pub fn new(store: SignalStore, room_id: impl Into<String>) -> Self {
        Self {
            store,
            room_id: room_id.into(),
        }
    }

    pub fn store(&self) -> &SignalStore {
        &self.store
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }
}

#[async_trait]
impl SignalChannel for MemorySignalChannel {
    async fn publish(&self, message: SignalMessage) -> Result<(), SignalError> {
        self.store.append(&self.room_id, message).await;
        Ok(())
    }

    async fn subscribe(&self, self_id: &str) -> Result<Subscription, SignalError> {
        let rx = self.store.subscribe(&self.room_id, self_id).await;
        Ok(Subscription::new(rx, CancellationToken::new()))
    }

    async fn ack(&self, handle: &AckHandle) -> Result<(), SignalError> {
        self.store.delete(&self.room_id, handle.id()).await;
        Ok(())
    }

    async fn purge_all(&self, self_id: &str) -> Result<usize, SignalError> {
        Ok(self.store.purge(&self.room_id, self_id).await)
    }
}
