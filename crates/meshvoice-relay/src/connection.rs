//! Per-connection handler: answer client frames against the shared store
//! and forward live signals for every subscription the client holds.

use std::collections::HashMap;
use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use meshvoice_common::new_id;
use meshvoice_mesh::signal::wire::{ClientFrame, ReplyStatus, ServerFrame};
use meshvoice_mesh::{SignalMessage, SignalRecord, SignalStore};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// Subscriptions held by one connection, keyed by `(room, user)`.
type Subscriptions = HashMap<(String, String), JoinHandle<()>>;

/// Handle a single WebSocket connection.
pub async fn handle_connection(
    ws: WebSocketStream<TcpStream>,
    addr: SocketAddr,
    store: SignalStore,
) {
    let conn_id = new_id();
    let (mut sink, mut stream) = ws.split();

    // Signal frames from every forwarder of this connection.
    let (out_tx, mut out_rx) = mpsc::channel::<String>(256);
    let mut subscriptions = Subscriptions::new();

    tracing::info!(peer = %addr, conn = %conn_id, "Client connected");

    loop {
        tokio::select! {
            Some(json) = out_rx.recv() => {
                if sink.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let reply =
                            handle_frame(&text, &store, &out_tx, &mut subscriptions, &conn_id)
                                .await;
                        if send_frame(&mut sink, &reply).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(peer = %addr, error = %e, "WS error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    // Cleanup.
    let held = subscriptions.len();
    for ((room, user), handle) in subscriptions.drain() {
        drop_subscription(&store, &room, &user, handle).await;
    }
    tracing::info!(peer = %addr, conn = %conn_id, subscriptions = held, "Client disconnected");
}

/// Apply one client frame and build the reply.
async fn handle_frame(
    text: &str,
    store: &SignalStore,
    out_tx: &mpsc::Sender<String>,
    subscriptions: &mut Subscriptions,
    conn_id: &str,
) -> ServerFrame {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(conn = %conn_id, error = %e, "Invalid client frame");
            return ServerFrame::error("", format!("invalid frame: {e}"));
        }
    };

    match frame {
        ClientFrame::Subscribe { msg_ref, room, user } => {
            if room.is_empty() || user.is_empty() {
                return ServerFrame::error(&msg_ref, "room and user are required");
            }
            let key = (room, user);
            if !subscriptions.contains_key(&key) {
                let records = store.subscribe(&key.0, &key.1).await;
                let handle = tokio::spawn(forward_signals(key.0.clone(), records, out_tx.clone()));
                tracing::debug!(conn = %conn_id, room = %key.0, user = %key.1, "Subscribed");
                subscriptions.insert(key, handle);
            }
            ServerFrame::ok(&msg_ref)
        }
        ClientFrame::Unsubscribe { msg_ref, room, user } => {
            if let Some(handle) = subscriptions.remove(&(room.clone(), user.clone())) {
                drop_subscription(store, &room, &user, handle).await;
                tracing::debug!(conn = %conn_id, room = %room, user = %user, "Unsubscribed");
            }
            ServerFrame::ok(&msg_ref)
        }
        ClientFrame::Publish {
            msg_ref,
            room,
            from,
            to,
            payload,
            created_at,
        } => {
            if room.is_empty() || from.is_empty() || to.is_empty() {
                return ServerFrame::error(&msg_ref, "room, from and to are required");
            }
            let record = store
                .append(
                    &room,
                    SignalMessage {
                        from,
                        to,
                        payload,
                        created_at,
                    },
                )
                .await;
            tracing::debug!(room = %room, id = %record.id, to = %record.to, "Signal stored");
            ServerFrame::Reply {
                msg_ref,
                status: ReplyStatus::Ok,
                id: Some(record.id),
                removed: None,
                reason: None,
            }
        }
        ClientFrame::Delete { msg_ref, room, id } => {
            // Deleting an already removed record is not an error: consumers
            // may ack a redelivered signal twice.
            let existed = store.delete(&room, &id).await;
            tracing::debug!(room = %room, id = %id, existed, "Signal deleted");
            ServerFrame::ok(&msg_ref)
        }
        ClientFrame::Purge { msg_ref, room, user } => {
            let removed = store.purge(&room, &user).await;
            tracing::info!(room = %room, user = %user, removed, "Purged signals");
            ServerFrame::Reply {
                msg_ref,
                status: ReplyStatus::Ok,
                id: None,
                removed: Some(removed),
                reason: None,
            }
        }
    }
}

/// Push records of one subscription to the connection as `signal` frames.
async fn forward_signals(
    room: String,
    mut records: mpsc::UnboundedReceiver<SignalRecord>,
    out_tx: mpsc::Sender<String>,
) {
    while let Some(record) = records.recv().await {
        let json = match serde_json::to_string(&ServerFrame::signal(&room, &record)) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(room = %room, id = %record.id, error = %e, "Cannot encode signal");
                continue;
            }
        };
        if out_tx.send(json).await.is_err() {
            break;
        }
    }
}

/// Stop a forwarder and remove its closed receiver from the store.
async fn drop_subscription(store: &SignalStore, room: &str, user: &str, handle: JoinHandle<()>) {
    handle.abort();
    let _ = handle.await;
    store.prune_subscribers(room, user).await;
}

/// Send a ServerFrame as a JSON text frame.
async fn send_frame(
    sink: &mut futures_util::stream::SplitSink<WebSocketStream<TcpStream>, Message>,
    frame: &ServerFrame,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let json = match serde_json::to_string(frame) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(error = %e, "Cannot encode reply");
            return Ok(());
        }
    };
    sink.send(Message::Text(json.into())).await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use meshvoice_config::schema::RelayConfig;
    use meshvoice_mesh::{RelaySignalChannel, SignalChannel, SignalError, SignalMessage};
    use tokio::net::TcpListener;
    use tokio_tungstenite::connect_async;

    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    async fn start_relay() -> (SocketAddr, SignalStore) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let store = SignalStore::new();
        tokio::spawn(crate::serve(listener, store.clone()));
        (addr, store)
    }

    fn relay_config(addr: SocketAddr) -> RelayConfig {
        RelayConfig {
            url: format!("ws://{addr}/ws"),
            request_timeout_secs: 5,
            ..RelayConfig::default()
        }
    }

    fn message(from: &str, to: &str, payload: &str) -> SignalMessage {
        SignalMessage {
            from: from.into(),
            to: to.into(),
            payload: payload.into(),
            created_at: 1,
        }
    }

    async fn raw_request(addr: SocketAddr, text: &str) -> ServerFrame {
        let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
        ws.send(Message::Text(text.to_string().into())).await.unwrap();
        loop {
            let frame = tokio::time::timeout(WAIT, ws.next()).await.unwrap();
            if let Some(Ok(Message::Text(reply))) = frame {
                return serde_json::from_str(&reply).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn relay_channel_publish_deliver_ack() {
        let (addr, store) = start_relay().await;
        let alice = RelaySignalChannel::connect(relay_config(addr), "room");
        let bob = RelaySignalChannel::connect(relay_config(addr), "room");

        let mut sub = bob.subscribe("bob").await.unwrap();
        alice.publish(message("alice", "bob", "hello")).await.unwrap();

        let signal = tokio::time::timeout(WAIT, sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(signal.from, "alice");
        assert_eq!(signal.payload, "hello");
        assert_eq!(store.count().await, 1);

        bob.ack(&signal.ack).await.unwrap();
        assert_eq!(store.count().await, 0);

        // A second ack of the same record still succeeds.
        bob.ack(&signal.ack).await.unwrap();
    }

    #[tokio::test]
    async fn backlog_is_delivered_on_subscribe() {
        let (addr, store) = start_relay().await;
        store.append("room", message("alice", "bob", "early")).await;
        store.append("other", message("alice", "bob", "elsewhere")).await;

        let bob = RelaySignalChannel::connect(relay_config(addr), "room");
        let mut sub = bob.subscribe("bob").await.unwrap();

        let signal = tokio::time::timeout(WAIT, sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(signal.payload, "early");
        assert!(tokio::time::timeout(Duration::from_millis(200), sub.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn purge_reports_removed_count() {
        let (addr, store) = start_relay().await;
        store.append("room", message("alice", "bob", "1")).await;
        store.append("room", message("bob", "alice", "2")).await;
        store.append("room", message("bob", "carol", "3")).await;

        let alice = RelaySignalChannel::connect(relay_config(addr), "room");
        assert_eq!(alice.purge_all("alice").await.unwrap(), 2);
        assert_eq!(store.records("room").await.len(), 1);
    }

    #[tokio::test]
    async fn publish_without_recipient_is_rejected() {
        let (addr, _store) = start_relay().await;
        let reply = raw_request(
            addr,
            r#"{"type":"publish","ref":"4","room":"room","from":"a","to":"","payload":"{}","created_at":1}"#,
        )
        .await;
        match reply {
            ServerFrame::Reply {
                msg_ref, status, ..
            } => {
                assert_eq!(msg_ref, "4");
                assert_eq!(status, ReplyStatus::Error);
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_json_gets_error_reply() {
        let (addr, _store) = start_relay().await;
        match raw_request(addr, "not json").await {
            ServerFrame::Reply {
                msg_ref,
                status,
                reason,
                ..
            } => {
                assert_eq!(msg_ref, "");
                assert_eq!(status, ReplyStatus::Error);
                assert!(reason.unwrap().starts_with("invalid frame"));
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[tokio::test]
    async fn publish_reply_carries_record_id() {
        let (addr, store) = start_relay().await;
        let reply = raw_request(
            addr,
            r#"{"type":"publish","ref":"1","room":"room","from":"a","to":"b","payload":"{}","created_at":1}"#,
        )
        .await;
        let records = store.records("room").await;
        assert_eq!(records.len(), 1);
        match reply {
            ServerFrame::Reply { id, status, .. } => {
                assert_eq!(status, ReplyStatus::Ok);
                assert_eq!(id, Some(records[0].id.clone()));
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    /// Relay whose open connections all drop when the returned task is
    /// aborted.
    fn spawn_relay(listener: TcpListener, store: SignalStore) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut connections = tokio::task::JoinSet::new();
            loop {
                let Ok((stream, addr)) = listener.accept().await else {
                    continue;
                };
                let store = store.clone();
                connections.spawn(async move {
                    if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                        handle_connection(ws, addr, store).await;
                    }
                });
            }
        })
    }

    async fn wait_connected(channel: &RelaySignalChannel, connected: bool) {
        tokio::time::timeout(WAIT, async {
            while channel.is_connected().await != connected {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn subscription_survives_relay_restart() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let store = SignalStore::new();
        let relay = spawn_relay(listener, store.clone());

        let config = RelayConfig {
            reconnect_delay_secs: 1,
            ..relay_config(addr)
        };
        let alice = RelaySignalChannel::connect(config.clone(), "room");
        let bob = RelaySignalChannel::connect(config, "room");
        let mut sub = bob.subscribe("bob").await.unwrap();

        alice.publish(message("alice", "bob", "before")).await.unwrap();
        let first = tokio::time::timeout(WAIT, sub.recv()).await.unwrap().unwrap();
        assert_eq!(first.payload, "before");

        relay.abort();
        let _ = relay.await;
        wait_connected(&bob, false).await;
        let relay = spawn_relay(TcpListener::bind(addr).await.unwrap(), store.clone());

        // The un-acked record is redelivered under its original id.
        let again = tokio::time::timeout(WAIT, sub.recv()).await.unwrap().unwrap();
        assert_eq!(again.payload, "before");
        assert_eq!(again.ack, first.ack);

        alice.publish(message("alice", "bob", "after")).await.unwrap();
        let next = tokio::time::timeout(WAIT, sub.recv()).await.unwrap().unwrap();
        assert_eq!(next.payload, "after");

        bob.ack(&first.ack).await.unwrap();
        bob.ack(&next.ack).await.unwrap();
        assert_eq!(store.count().await, 0);
        relay.abort();
    }

    #[tokio::test]
    async fn dropped_connection_fails_inflight_request() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Reads one request, then hangs up without replying.
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                if let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await {
                    let _ = ws.next().await;
                }
            }
        });

        let channel = RelaySignalChannel::connect(relay_config(addr), "room");
        let result = channel.publish(message("alice", "bob", "lost")).await;
        assert_eq!(result, Err(SignalError::NotConnected));
    }
}
