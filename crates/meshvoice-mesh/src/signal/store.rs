//! Signal store: room-scoped signal records plus per-recipient live subscribers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use meshvoice_common::new_id;
use tokio::sync::{mpsc, RwLock};

use crate::protocol::{now_millis, SignalMessage};

/// A stored signaling record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalRecord {
    /// Unique across relay restarts, so consumers can deduplicate on it.
    pub id: String,
    pub from: String,
    pub to: String,
    pub payload: String,
    pub created_at: u64,
}

#[derive(Default)]
struct RoomSignals {
    /// Records in append order.
    records: Vec<SignalRecord>,
    /// Live subscribers keyed by recipient id.
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<SignalRecord>>>,
}

impl RoomSignals {
    fn is_idle(&self) -> bool {
        self.records.is_empty() && self.subscribers.is_empty()
    }
}

#[derive(Default)]
struct StoreInner {
    rooms: HashMap<String, RoomSignals>,
}

/// Thread-safe signal store.
#[derive(Clone, Default)]
pub struct SignalStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl SignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record and push it to the recipient's live subscribers.
    pub async fn append(&self, room_id: &str, message: SignalMessage) -> SignalRecord {
        let mut inner = self.inner.write().await;
        let record = SignalRecord {
            id: new_id(),
            from: message.from,
            to: message.to,
            payload: message.payload,
            created_at: message.created_at,
        };

        let room = inner.rooms.entry(room_id.to_string()).or_default();
        room.records.push(record.clone());
        if let Some(subs) = room.subscribers.get_mut(&record.to) {
            subs.retain(|tx| tx.send(record.clone()).is_ok());
            if subs.is_empty() {
                room.subscribers.remove(&record.to);
            }
        }
        record
    }

    /// Register a live subscriber for `user_id`.
    ///
    /// Records already stored for the user are queued first, in append order,
    /// under the same lock, so nothing is missed between backlog and live
    /// delivery.
    pub async fn subscribe(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> mpsc::UnboundedReceiver<SignalRecord> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.write().await;
        let room = inner.rooms.entry(room_id.to_string()).or_default();
        for record in room.records.iter().filter(|r| r.to == user_id) {
            let _ = tx.send(record.clone());
        }
        room.subscribers
            .entry(user_id.to_string())
            .or_default()
            .push(tx);
        rx
    }

    /// Drop subscribers of `user_id` whose receiver has gone away.
    pub async fn prune_subscribers(&self, room_id: &str, user_id: &str) {
        let mut inner = self.inner.write().await;
        if let Some(room) = inner.rooms.get_mut(room_id) {
            if let Some(subs) = room.subscribers.get_mut(user_id) {
                subs.retain(|tx| !tx.is_closed());
                if subs.is_empty() {
                    room.subscribers.remove(user_id);
                }
            }
            if room.is_idle() {
                inner.rooms.remove(room_id);
            }
        }
    }

    /// Delete one record. Returns true if it existed.
    pub async fn delete(&self, room_id: &str, id: &str) -> bool {
        let mut inner = self.inner.write().await;
        let Some(room) = inner.rooms.get_mut(room_id) else {
            return false;
        };
        let before = room.records.len();
        room.records.retain(|r| r.id != id);
        before != room.records.len()
    }

    /// Delete every record sent by or addressed to `user_id`.
    pub async fn purge(&self, room_id: &str, user_id: &str) -> usize {
        let mut inner = self.inner.write().await;
        let Some(room) = inner.rooms.get_mut(room_id) else {
            return 0;
        };
        let before = room.records.len();
        room.records.retain(|r| r.from != user_id && r.to != user_id);
        let removed = before - room.records.len();
        if room.is_idle() {
            inner.rooms.remove(room_id);
        }
        removed
    }

    /// Delete records older than `max_age` across all rooms.
    pub async fn reap_older_than(&self, max_age: Duration) -> usize {
        let cutoff = now_millis().saturating_sub(max_age.as_millis() as u64);
        let mut inner = self.inner.write().await;
        let mut removed = 0;
        inner.rooms.retain(|room_id, room| {
            let before = room.records.len();
            room.records.retain(|r| r.created_at >= cutoff);
            let reaped = before - room.records.len();
            if reaped > 0 {
                tracing::info!(room = %room_id, reaped, "Reaping stale signals");
            }
            removed += reaped;
            for subs in room.subscribers.values_mut() {
                subs.retain(|tx| !tx.is_closed());
            }
            room.subscribers.retain(|_, subs| !subs.is_empty());
            !room.is_idle()
        });
        removed
    }

    /// Snapshot of the records currently stored for a room.
    pub async fn records(&self, room_id: &str) -> Vec<SignalRecord> {
        self.inner
            .read()
            .await
            .rooms
            .get(room_id)
            .map(|room| room.records.clone())
            .unwrap_or_default()
    }

    /// Number of stored records across all rooms.
    pub async fn count(&self) -> usize {
        self.inner
            .read()
            .await
            .rooms
            .values()
            .map(|room| room.records.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(from: &str, to: &str, payload: &str) -> SignalMessage {
        SignalMessage {
            from: from.into(),
            to: to.into(),
            payload: payload.into(),
            created_at: now_millis(),
        }
    }

    #[tokio::test]
    async fn append_assigns_unique_ids() {
        let store = SignalStore::new();
        let first = store.append("room", msg("a", "b", "1")).await;
        let second = store.append("room", msg("a", "b", "2")).await;
        assert_ne!(second.id, first.id);
        assert_eq!(store.count().await, 2);
    }

    #[tokio::test]
    async fn new_store_never_reuses_ids() {
        let before = SignalStore::new();
        let mut seen = Vec::new();
        for i in 0..16 {
            seen.push(before.append("room", msg("a", "b", &i.to_string())).await.id);
        }
        let after = SignalStore::new();
        for i in 0..16 {
            let record = after.append("room", msg("a", "b", &i.to_string())).await;
            assert!(!seen.contains(&record.id));
        }
    }

    #[tokio::test]
    async fn subscriber_receives_backlog_then_live() {
        let store = SignalStore::new();
        store.append("room", msg("a", "b", "early")).await;
        store.append("room", msg("a", "c", "other")).await;

        let mut rx = store.subscribe("room", "b").await;
        store.append("room", msg("a", "b", "late")).await;

        assert_eq!(rx.recv().await.unwrap().payload, "early");
        assert_eq!(rx.recv().await.unwrap().payload, "late");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn rooms_are_isolated() {
        let store = SignalStore::new();
        let mut rx = store.subscribe("room-1", "b").await;
        store.append("room-2", msg("a", "b", "elsewhere")).await;
        assert!(rx.try_recv().is_err());
        assert!(store.records("room-1").await.is_empty());
    }

    #[tokio::test]
    async fn delete_removes_single_record() {
        let store = SignalStore::new();
        let rec = store.append("room", msg("a", "b", "x")).await;
        store.append("room", msg("a", "b", "y")).await;

        assert!(store.delete("room", &rec.id).await);
        assert!(!store.delete("room", &rec.id).await);
        assert!(!store.delete("missing", &rec.id).await);

        let left = store.records("room").await;
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].payload, "y");
    }

    #[tokio::test]
    async fn purge_removes_from_and_to() {
        let store = SignalStore::new();
        store.append("room", msg("a", "b", "1")).await;
        store.append("room", msg("b", "a", "2")).await;
        store.append("room", msg("b", "c", "3")).await;
        store.append("room", msg("c", "b", "4")).await;

        assert_eq!(store.purge("room", "a").await, 2);
        let left: Vec<_> = store
            .records("room")
            .await
            .into_iter()
            .map(|r| r.payload)
            .collect();
        assert_eq!(left, vec!["3".to_string(), "4".to_string()]);
    }

    #[tokio::test]
    async fn closed_subscribers_are_dropped() {
        let store = SignalStore::new();
        let rx = store.subscribe("room", "b").await;
        drop(rx);
        store.append("room", msg("a", "b", "x")).await;
        // Record is still stored for a later subscriber.
        let mut rx = store.subscribe("room", "b").await;
        assert_eq!(rx.recv().await.unwrap().payload, "x");
    }

    #[tokio::test]
    async fn reap_removes_only_old_records() {
        let store = SignalStore::new();
        let mut old = msg("a", "b", "old");
        old.created_at = now_millis() - 120_000;
        store.append("room", old).await;
        store.append("room", msg("a", "b", "fresh")).await;

        assert_eq!(store.reap_older_than(Duration::from_secs(60)).await, 1);
        let left = store.records("room").await;
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].payload, "fresh");
    }
}
