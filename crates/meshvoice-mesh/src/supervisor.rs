//! Per-peer negotiation timeout.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::voice::MeshInput;

/// Timer that reports `MeshInput::Timeout` for one peer record once the
/// bound elapses.
///
/// Cancelling consumes the supervisor, so it can be cancelled at most once.
/// Dropping it also stops the timer.
#[derive(Debug)]
pub struct ConnectionSupervisor {
    peer_id: String,
    epoch: u64,
    handle: Option<JoinHandle<()>>,
}

impl ConnectionSupervisor {
    pub fn arm(
        peer_id: &str,
        epoch: u64,
        bound: Duration,
        tx: mpsc::UnboundedSender<MeshInput>,
    ) -> Self {
        let timeout_peer = peer_id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(bound).await;
            let _ = tx.send(MeshInput::Timeout {
                peer_id: timeout_peer,
                epoch,
            });
        });
        debug!(peer_id, epoch, bound_secs = bound.as_secs(), "Connection timer armed");
        Self {
            peer_id: peer_id.to_string(),
            epoch,
            handle: Some(handle),
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// True once the timer fired or was aborted.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    pub fn cancel(mut self) {
        self.abort();
        debug!(peer_id = %self.peer_id, epoch = self.epoch, "Connection timer cancelled");
    }

    fn abort(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_after_bound() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let supervisor = ConnectionSupervisor::arm("b", 3, Duration::from_secs(30), tx);

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        match rx.recv().await {
            Some(MeshInput::Timeout { peer_id, epoch }) => {
                assert_eq!(peer_id, "b");
                assert_eq!(epoch, 3);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(supervisor.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let supervisor = ConnectionSupervisor::arm("b", 1, Duration::from_secs(30), tx);
        supervisor.cancel();

        tokio::time::sleep(Duration::from_secs(60)).await;
        // The aborted task dropped its sender.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_timer_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        drop(ConnectionSupervisor::arm("b", 1, Duration::from_secs(5), tx));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.recv().await.is_none());
    }
}
