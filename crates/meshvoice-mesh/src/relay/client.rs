//! Public handle for the relay-backed signal channel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use meshvoice_config::schema::RelayConfig;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::connection::connection_loop;
use super::types::{next_ref, ActiveSubscription, RelayCommand, RelayShared};
use crate::protocol::SignalMessage;
use crate::signal::wire::{ClientFrame, ReplyStatus, ServerFrame};
use crate::signal::{AckHandle, SignalChannel, SignalError, Subscription};

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Signal channel for one room of a remote relay server.
///
/// All requests are forwarded to a background connection task and wait for
/// the relay's reply. Dropping the handle stops the connection.
pub struct RelaySignalChannel {
    command_tx: mpsc::Sender<RelayCommand>,
    shared: Arc<RelayShared>,
    request_timeout: Duration,
}

impl RelaySignalChannel {
    /// Create a channel for `room_id` and start the background connection.
    pub fn connect(config: RelayConfig, room_id: impl Into<String>) -> Self {
        let (command_tx, command_rx) = mpsc::channel(64);
        let shared = Arc::new(RelayShared::new(room_id.into()));
        let request_timeout = Duration::from_secs(config.request_timeout_secs);

        tokio::spawn(connection_loop(config, Arc::clone(&shared), command_rx));

        Self {
            command_tx,
            shared,
            request_timeout,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.shared.room_id
    }

    /// Check if connected.
    pub async fn is_connected(&self) -> bool {
        *self.shared.connected.read().await
    }

    /// Disconnect from the relay. Pending requests fail.
    pub fn disconnect(&self) {
        self.shared.shutdown.cancel();
    }

    /// Send a frame and wait for the matching reply.
    async fn request(&self, frame: ClientFrame) -> Result<ServerFrame, SignalError> {
        if self.shared.shutdown.is_cancelled() {
            return Err(SignalError::Closed);
        }
        let msg_ref = frame.msg_ref().to_string();
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().await.insert(msg_ref.clone(), tx);

        if self.command_tx.send(RelayCommand::Send(frame)).await.is_err() {
            self.shared.pending.lock().await.remove(&msg_ref);
            return Err(SignalError::Closed);
        }

        let reply = match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(SignalError::NotConnected),
            Err(_) => {
                self.shared.pending.lock().await.remove(&msg_ref);
                return Err(SignalError::Timeout);
            }
        };

        match reply {
            ServerFrame::Reply {
                status: ReplyStatus::Ok,
                ..
            } => Ok(reply),
            ServerFrame::Reply { reason, .. } => Err(SignalError::Rejected(
                reason.unwrap_or_else(|| "unknown error".to_string()),
            )),
            other => Err(SignalError::Codec(format!("unexpected reply {other:?}"))),
        }
    }
}

impl Drop for RelaySignalChannel {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

#[async_trait]
impl SignalChannel for RelaySignalChannel {
    async fn publish(&self, message: SignalMessage) -> Result<(), SignalError> {
        self.request(ClientFrame::Publish {
            msg_ref: next_ref(),
            room: self.shared.room_id.clone(),
            from: message.from,
            to: message.to,
            payload: message.payload,
            created_at: message.created_at,
        })
        .await
        .map(|_| ())
    }

    async fn subscribe(&self, self_id: &str) -> Result<Subscription, SignalError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let sub_id = self.shared.next_subscription_id();

        // Register before asking the relay so backlog frames are not lost.
        self.shared.subscriptions.write().await.insert(
            sub_id,
            ActiveSubscription {
                user: self_id.to_string(),
                tx,
            },
        );

        let subscribed = self
            .request(ClientFrame::Subscribe {
                msg_ref: next_ref(),
                room: self.shared.room_id.clone(),
                user: self_id.to_string(),
            })
            .await;
        if let Err(e) = subscribed {
            self.shared.subscriptions.write().await.remove(&sub_id);
            return Err(e);
        }

        let token = CancellationToken::new();
        tokio::spawn(unsubscribe_on_cancel(
            Arc::clone(&self.shared),
            self.command_tx.clone(),
            sub_id,
            token.clone(),
        ));

        debug!(user = %self_id, room = %self.shared.room_id, "Subscribed to relay signals");
        Ok(Subscription::new(rx, token))
    }

    async fn ack(&self, handle: &AckHandle) -> Result<(), SignalError> {
        self.request(ClientFrame::Delete {
            msg_ref: next_ref(),
            room: self.shared.room_id.clone(),
            id: handle.id().to_string(),
        })
        .await
        .map(|_| ())
    }

    async fn purge_all(&self, self_id: &str) -> Result<usize, SignalError> {
        let reply = self
            .request(ClientFrame::Purge {
                msg_ref: next_ref(),
                room: self.shared.room_id.clone(),
                user: self_id.to_string(),
            })
            .await?;
        match reply {
            ServerFrame::Reply { removed, .. } => Ok(removed.unwrap_or(0)),
            _ => Ok(0),
        }
    }
}

/// Drop the local subscription once its token is cancelled, and tell the
/// relay when no other local subscription remains for that user.
async fn unsubscribe_on_cancel(
    shared: Arc<RelayShared>,
    command_tx: mpsc::Sender<RelayCommand>,
    sub_id: u64,
    token: CancellationToken,
) {
    tokio::select! {
        _ = token.cancelled() => {}
        _ = shared.shutdown.cancelled() => return,
    }

    let removed = shared.subscriptions.write().await.remove(&sub_id);
    let Some(sub) = removed else {
        return;
    };
    let still_subscribed = shared
        .subscriptions
        .read()
        .await
        .values()
        .any(|s| s.user == sub.user);
    if !still_subscribed {
        let _ = command_tx
            .send(RelayCommand::Send(ClientFrame::Unsubscribe {
                msg_ref: next_ref(),
                room: shared.room_id.clone(),
                user: sub.user,
            }))
            .await;
    }
}
