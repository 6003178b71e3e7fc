//! Background WebSocket connection loop with auto-reconnect.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use meshvoice_config::schema::RelayConfig;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use super::handler::handle_server_frame;
use super::types::{next_ref, RelayCommand, RelayShared};
use crate::signal::wire::{ClientFrame, ServerFrame};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

// ---------------------------------------------------------------------------
// Connection Loop
// ---------------------------------------------------------------------------

/// Background task managing the WebSocket connection with auto-reconnect.
///
/// Runs until `shared.shutdown` is cancelled.
pub(crate) async fn connection_loop(
    config: RelayConfig,
    shared: Arc<RelayShared>,
    command_rx: mpsc::Receiver<RelayCommand>,
) {
    let command_rx = Arc::new(Mutex::new(command_rx));
    let mut backoff = Backoff::new(config.reconnect_delay_secs, config.max_reconnect_delay_secs);

    loop {
        info!(url = %config.url, room = %shared.room_id, "Connecting to signaling relay");

        let attempt = tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            attempt = tokio::time::timeout(
                CONNECT_TIMEOUT,
                tokio_tungstenite::connect_async(config.url.as_str()),
            ) => attempt,
        };

        match attempt {
            Ok(Ok((ws_stream, _))) => {
                backoff.reset();
                *shared.connected.write().await = true;
                info!(room = %shared.room_id, "Connected to signaling relay");

                let (ws_write, ws_read) = ws_stream.split();
                let ws_write = Arc::new(Mutex::new(ws_write));

                // Re-subscribe users that were subscribed before the drop.
                for user in shared.subscribed_users().await {
                    let frame = ClientFrame::Subscribe {
                        msg_ref: next_ref(),
                        room: shared.room_id.clone(),
                        user,
                    };
                    send_frame(&ws_write, &frame).await;
                }

                let heartbeat_handle = tokio::spawn(heartbeat_task(
                    Arc::clone(&ws_write),
                    config.heartbeat_interval_secs,
                ));
                let cmd_handle = tokio::spawn(command_forwarder(
                    Arc::clone(&command_rx),
                    Arc::clone(&ws_write),
                ));

                let mut read_stream = ws_read;
                loop {
                    tokio::select! {
                        _ = shared.shutdown.cancelled() => {
                            let mut writer = ws_write.lock().await;
                            let _ = writer.send(WsMessage::Close(None)).await;
                            break;
                        }
                        msg = read_stream.next() => match msg {
                            Some(Ok(WsMessage::Text(text))) => {
                                match serde_json::from_str::<ServerFrame>(&text) {
                                    Ok(frame) => handle_server_frame(frame, &shared).await,
                                    Err(e) => debug!(
                                        error = %e,
                                        text = %text,
                                        "Unrecognized frame from relay"
                                    ),
                                }
                            }
                            Some(Ok(WsMessage::Close(_))) | None => {
                                info!("Signaling relay closed connection");
                                break;
                            }
                            Some(Err(e)) => {
                                warn!(error = %e, "WebSocket error");
                                break;
                            }
                            Some(Ok(_)) => {}
                        },
                    }
                }

                // Cleanup. Dropping the pending senders fails in-flight requests.
                heartbeat_handle.abort();
                cmd_handle.abort();
                *shared.connected.write().await = false;
                shared.pending.lock().await.clear();
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to connect to signaling relay");
            }
            Err(_elapsed) => {
                error!(
                    "WebSocket connection timed out after {}s",
                    CONNECT_TIMEOUT.as_secs()
                );
            }
        }

        if shared.shutdown.is_cancelled() {
            break;
        }

        // Exponential backoff reconnect.
        let delay = backoff.next_delay();
        info!(delay, "Reconnecting in {} seconds", delay);
        tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_secs(delay)) => {}
        }
    }

    *shared.connected.write().await = false;
    info!(room = %shared.room_id, "Signaling relay connection stopped");
}

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// Reconnect delay in seconds, doubling per failed attempt up to `max`.
#[derive(Debug)]
struct Backoff {
    base: u64,
    max: u64,
    current: u64,
}

impl Backoff {
    fn new(base: u64, max: u64) -> Self {
        let base = base.max(1);
        Self {
            base,
            max: max.max(base),
            current: base,
        }
    }

    fn reset(&mut self) {
        self.current = self.base;
    }

    fn next_delay(&mut self) -> u64 {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }
}

async fn send_frame<S>(ws_write: &Arc<Mutex<S>>, frame: &ClientFrame) -> bool
where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    match serde_json::to_string(frame) {
        Ok(json) => {
            let mut writer = ws_write.lock().await;
            writer.send(WsMessage::Text(json.into())).await.is_ok()
        }
        Err(e) => {
            warn!(error = %e, "Failed to encode relay frame");
            true
        }
    }
}

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

async fn heartbeat_task<S>(ws_write: Arc<Mutex<S>>, interval_secs: u64)
where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    // The first tick completes immediately.
    interval.tick().await;
    loop {
        interval.tick().await;
        let mut writer = ws_write.lock().await;
        if writer.send(WsMessage::Ping(Default::default())).await.is_err() {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Command Forwarder
// ---------------------------------------------------------------------------

async fn command_forwarder<S>(
    cmd_rx: Arc<Mutex<mpsc::Receiver<RelayCommand>>>,
    cmd_write: Arc<Mutex<S>>,
) where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    let mut rx = cmd_rx.lock().await;
    while let Some(cmd) = rx.recv().await {
        match cmd {
            RelayCommand::Send(frame) => {
                if !send_frame(&cmd_write, &frame).await {
                    warn!(msg_ref = %frame.msg_ref(), "Failed to write frame to relay");
                    break;
                }
            }
        }
    }
}
