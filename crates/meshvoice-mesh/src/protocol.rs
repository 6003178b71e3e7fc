//! Protocol types for the voice mesh.
//!
//! `SignalPayload` is the negotiation payload produced and consumed by the
//! peer-connection primitive. It rides inside a `SignalMessage` record as an
//! opaque JSON string, so the relay never has to understand it.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

/// A room member as seen by the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub is_voice_active: bool,
}

impl Participant {
    pub fn new(id: impl Into<String>, username: impl Into<String>, is_voice_active: bool) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            is_voice_active,
        }
    }
}

// ---------------------------------------------------------------------------
// Negotiation payloads
// ---------------------------------------------------------------------------

/// A trickled ICE candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u32>,
}

/// Negotiation payload exchanged between two peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalPayload {
    /// SDP offer from the initiating side.
    Offer { sdp: String },
    /// SDP answer in response to an offer.
    Answer { sdp: String },
    /// ICE candidate for connectivity checks.
    Candidate { candidate: IceCandidate },
}

impl SignalPayload {
    /// Only an offer may bootstrap a new peer connection.
    pub fn is_offer(&self) -> bool {
        matches!(self, SignalPayload::Offer { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SignalPayload::Offer { .. } => "offer",
            SignalPayload::Answer { .. } => "answer",
            SignalPayload::Candidate { .. } => "candidate",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

// ---------------------------------------------------------------------------
// Relay records
// ---------------------------------------------------------------------------

/// A signaling record as appended to the room's signal collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalMessage {
    pub from: String,
    pub to: String,
    /// Serialized `SignalPayload`. Opaque to the relay.
    pub payload: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
}

impl SignalMessage {
    pub fn new(from: &str, to: &str, payload: &SignalPayload) -> Result<Self, serde_json::Error> {
        Ok(Self {
            from: from.to_string(),
            to: to.to_string(),
            payload: payload.to_json()?,
            created_at: now_millis(),
        })
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offer_wire_format() {
        let offer = SignalPayload::Offer {
            sdp: "v=0".into(),
        };
        let json = offer.to_json().unwrap();
        assert_eq!(json, r#"{"type":"offer","sdp":"v=0"}"#);
        assert!(offer.is_offer());
    }

    #[test]
    fn candidate_wire_format() {
        let json = r#"{"type":"candidate","candidate":{"candidate":"candidate:1 1 udp 1 10.0.0.1 5000 typ host","sdpMid":"0","sdpMLineIndex":0}}"#;
        let payload = SignalPayload::from_json(json).unwrap();
        match &payload {
            SignalPayload::Candidate { candidate } => {
                assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
                assert_eq!(candidate.sdp_m_line_index, Some(0));
            }
            other => panic!("expected candidate, got {other:?}"),
        }
        assert!(!payload.is_offer());
        assert_eq!(payload.kind(), "candidate");
    }

    #[test]
    fn unknown_payload_type_is_rejected() {
        assert!(SignalPayload::from_json(r#"{"type":"renegotiate"}"#).is_err());
        assert!(SignalPayload::from_json("not json").is_err());
    }

    #[test]
    fn participant_uses_camel_case() {
        let json = r#"{"id":"lq1","username":"ana","isVoiceActive":true}"#;
        let p: Participant = serde_json::from_str(json).unwrap();
        assert_eq!(p, Participant::new("lq1", "ana", true));
    }

    #[test]
    fn participant_voice_flag_defaults_to_false() {
        let p: Participant = serde_json::from_str(r#"{"id":"x","username":"y"}"#).unwrap();
        assert!(!p.is_voice_active);
    }

    #[test]
    fn signal_message_embeds_serialized_payload() {
        let payload = SignalPayload::Answer { sdp: "ans".into() };
        let msg = SignalMessage::new("b", "a", &payload).unwrap();
        assert_eq!(msg.from, "b");
        assert_eq!(msg.to, "a");
        assert_eq!(SignalPayload::from_json(&msg.payload).unwrap(), payload);
        assert!(msg.created_at > 0);

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"createdAt\""));
    }
}
