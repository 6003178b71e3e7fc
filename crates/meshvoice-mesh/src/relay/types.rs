//! Shared state and command types for the relay client.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::signal::wire::{ClientFrame, ServerFrame};
use crate::signal::SignalRecord;

// ---------------------------------------------------------------------------
// Ref Counter
// ---------------------------------------------------------------------------

/// Monotonically increasing ref counter for client frames.
static REF_COUNTER: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_ref() -> String {
    REF_COUNTER.fetch_add(1, Ordering::Relaxed).to_string()
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Commands sent from the channel handle to the connection task.
#[derive(Debug)]
pub(crate) enum RelayCommand {
    Send(ClientFrame),
}

// ---------------------------------------------------------------------------
// Shared State
// ---------------------------------------------------------------------------

/// A local subscription that must survive reconnects.
pub(crate) struct ActiveSubscription {
    pub(crate) user: String,
    pub(crate) tx: mpsc::UnboundedSender<SignalRecord>,
}

/// State shared between the channel handle and the connection task.
pub(crate) struct RelayShared {
    pub(crate) room_id: String,
    pub(crate) connected: RwLock<bool>,
    /// Requests waiting for a reply, keyed by `ref`.
    pub(crate) pending: Mutex<HashMap<String, oneshot::Sender<ServerFrame>>>,
    pub(crate) subscriptions: RwLock<HashMap<u64, ActiveSubscription>>,
    next_subscription: AtomicU64,
    /// Cancelled when the channel is disconnected or dropped.
    pub(crate) shutdown: CancellationToken,
}

impl RelayShared {
    pub(crate) fn new(room_id: String) -> Self {
        Self {
            room_id,
            connected: RwLock::new(false),
            pending: Mutex::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            next_subscription: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        }
    }

    pub(crate) fn next_subscription_id(&self) -> u64 {
        self.next_subscription.fetch_add(1, Ordering::Relaxed)
    }

    /// Distinct users with at least one live local subscription.
    pub(crate) async fn subscribed_users(&self) -> Vec<String> {
        let subs = self.subscriptions.read().await;
        let mut users: Vec<String> = subs.values().map(|s| s.user.clone()).collect();
        users.sort();
        users.dedup();
        users
    }
}
