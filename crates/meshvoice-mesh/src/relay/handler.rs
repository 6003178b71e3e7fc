//! Incoming relay frame handler.

use tracing::{debug, warn};

use super::types::RelayShared;
use crate::signal::wire::{ReplyStatus, ServerFrame};
use crate::signal::SignalRecord;

/// Handle a single frame received from the relay.
pub(crate) async fn handle_server_frame(frame: ServerFrame, shared: &RelayShared) {
    match &frame {
        ServerFrame::Reply {
            msg_ref,
            status,
            reason,
            ..
        } => {
            let waiter = shared.pending.lock().await.remove(msg_ref);
            match waiter {
                Some(tx) => {
                    let _ = tx.send(frame.clone());
                }
                None if *status == ReplyStatus::Error => {
                    warn!(msg_ref = %msg_ref, reason = ?reason, "Relay rejected unawaited request");
                }
                None => {
                    debug!(msg_ref = %msg_ref, "Reply for unawaited request");
                }
            }
        }
        ServerFrame::Signal {
            room,
            id,
            from,
            to,
            payload,
            created_at,
        } => {
            if *room != shared.room_id {
                debug!(room = %room, "Signal for another room ignored");
                return;
            }
            let record = SignalRecord {
                id: id.clone(),
                from: from.clone(),
                to: to.clone(),
                payload: payload.clone(),
                created_at: *created_at,
            };
            let mut subs = shared.subscriptions.write().await;
            let mut delivered = 0usize;
            subs.retain(|_, sub| {
                if sub.user != *to {
                    return true;
                }
                if sub.tx.send(record.clone()).is_ok() {
                    delivered += 1;
                    true
                } else {
                    false
                }
            });
            debug!(id = %id, from = %from, to = %to, delivered, "Signal received");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::types::ActiveSubscription;
    use tokio::sync::{mpsc, oneshot};

    fn signal_frame(room: &str, to: &str) -> ServerFrame {
        ServerFrame::Signal {
            room: room.into(),
            id: "r5".into(),
            from: "a".into(),
            to: to.into(),
            payload: "{}".into(),
            created_at: 1,
        }
    }

    #[tokio::test]
    async fn reply_resolves_pending_request() {
        let shared = RelayShared::new("room".into());
        let (tx, rx) = oneshot::channel();
        shared.pending.lock().await.insert("3".into(), tx);

        handle_server_frame(ServerFrame::ok("3"), &shared).await;

        assert_eq!(rx.await.unwrap(), ServerFrame::ok("3"));
        assert!(shared.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn signal_routes_to_matching_user() {
        let shared = RelayShared::new("room".into());
        let (b_tx, mut b_rx) = mpsc::unbounded_channel();
        let (c_tx, mut c_rx) = mpsc::unbounded_channel();
        {
            let mut subs = shared.subscriptions.write().await;
            subs.insert(1, ActiveSubscription { user: "b".into(), tx: b_tx });
            subs.insert(2, ActiveSubscription { user: "c".into(), tx: c_tx });
        }

        handle_server_frame(signal_frame("room", "b"), &shared).await;

        assert_eq!(b_rx.recv().await.unwrap().id, "r5");
        assert!(c_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn signal_for_other_room_is_dropped() {
        let shared = RelayShared::new("room".into());
        let (tx, mut rx) = mpsc::unbounded_channel();
        shared
            .subscriptions
            .write()
            .await
            .insert(1, ActiveSubscription { user: "b".into(), tx });

        handle_server_frame(signal_frame("elsewhere", "b"), &shared).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_subscription_is_pruned() {
        let shared = RelayShared::new("room".into());
        let (tx, rx) = mpsc::unbounded_channel();
        shared
            .subscriptions
            .write()
            .await
            .insert(1, ActiveSubscription { user: "b".into(), tx });
        drop(rx);

        handle_server_frame(signal_frame("room", "b"), &shared).await;
        assert!(shared.subscriptions.read().await.is_empty());
    }
}
