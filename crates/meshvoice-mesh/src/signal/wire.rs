//! Relay wire protocol shared by `RelaySignalChannel` and the relay server.
//!
//! Every frame is a JSON text frame tagged on `type`. Client requests carry
//! a `ref` that the relay echoes back in its `reply`.

use serde::{Deserialize, Serialize};

use super::store::SignalRecord;

/// Requests sent by a client to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe {
        #[serde(rename = "ref")]
        msg_ref: String,
        room: String,
        user: String,
    },
    Unsubscribe {
        #[serde(rename = "ref")]
        msg_ref: String,
        room: String,
        user: String,
    },
    Publish {
        #[serde(rename = "ref")]
        msg_ref: String,
        room: String,
        from: String,
        to: String,
        payload: String,
        created_at: u64,
    },
    Delete {
        #[serde(rename = "ref")]
        msg_ref: String,
        room: String,
        id: String,
    },
    Purge {
        #[serde(rename = "ref")]
        msg_ref: String,
        room: String,
        user: String,
    },
}

impl ClientFrame {
    pub fn msg_ref(&self) -> &str {
        match self {
            ClientFrame::Subscribe { msg_ref, .. }
            | ClientFrame::Unsubscribe { msg_ref, .. }
            | ClientFrame::Publish { msg_ref, .. }
            | ClientFrame::Delete { msg_ref, .. }
            | ClientFrame::Purge { msg_ref, .. } => msg_ref,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Ok,
    Error,
}

/// Frames sent by the relay to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Reply {
        #[serde(rename = "ref")]
        msg_ref: String,
        status: ReplyStatus,
        /// Id of the appended record (publish only).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// Number of deleted records (purge only).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        removed: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Signal {
        room: String,
        id: String,
        from: String,
        to: String,
        payload: String,
        created_at: u64,
    },
}

impl ServerFrame {
    pub fn ok(msg_ref: &str) -> Self {
        ServerFrame::Reply {
            msg_ref: msg_ref.to_string(),
            status: ReplyStatus::Ok,
            id: None,
            removed: None,
            reason: None,
        }
    }

    pub fn error(msg_ref: &str, reason: impl Into<String>) -> Self {
        ServerFrame::Reply {
            msg_ref: msg_ref.to_string(),
            status: ReplyStatus::Error,
            id: None,
            removed: None,
            reason: Some(reason.into()),
        }
    }

    pub fn signal(room: &str, record: &SignalRecord) -> Self {
        ServerFrame::Signal {
            room: room.to_string(),
            id: record.id.clone(),
            from: record.from.clone(),
            to: record.to.clone(),
            payload: record.payload.clone(),
            created_at: record.created_at,
        }
    }
}
