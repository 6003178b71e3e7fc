//! Voice mesh configuration types.

use serde::{Deserialize, Serialize};

/// Microphone capture and playback settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    /// Volume applied to every remote playback sink (0.0-1.0).
    pub playback_volume: f64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            playback_volume: 1.0,
        }
    }
}

/// A STUN or TURN server handed to the negotiation primitive.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl std::fmt::Debug for IceServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IceServerConfig")
            .field("urls", &self.urls)
            .field("username", &self.username)
            .field(
                "credential",
                &self.credential.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl IceServerConfig {
    pub fn stun(url: &str) -> Self {
        Self {
            urls: vec![url.to_string()],
            username: None,
            credential: None,
        }
    }

    pub fn turn(url: &str, username: &str, credential: &str) -> Self {
        Self {
            urls: vec![url.to_string()],
            username: Some(username.to_string()),
            credential: Some(credential.to_string()),
        }
    }
}

/// Voice mesh configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Seconds a peer connection may spend negotiating before it is torn down.
    pub connect_timeout_secs: u32,
    /// Send ICE candidates as individual signals instead of waiting for gathering.
    pub trickle: bool,
    pub ice_candidate_pool_size: u32,
    pub audio: AudioConfig,
    pub ice_servers: Vec<IceServerConfig>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            trickle: true,
            ice_candidate_pool_size: 10,
            audio: AudioConfig::default(),
            ice_servers: vec![IceServerConfig {
                urls: vec![
                    "stun:stun.l.google.com:19302".into(),
                    "stun:stun1.l.google.com:19302".into(),
                ],
                username: None,
                credential: None,
            }],
        }
    }
}

impl VoiceConfig {
    pub fn connect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(u64::from(self.connect_timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ice_server_debug_redacts_credential() {
        let server = IceServerConfig::turn("turn:relay.example:3478", "alice", "hunter2");
        let debug = format!("{server:?}");
        assert!(debug.contains("alice"));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn stun_server_has_no_credentials() {
        let server = IceServerConfig::stun("stun:stun.example:19302");
        assert!(server.username.is_none());
        assert!(server.credential.is_none());
        let json = serde_json::to_string(&server).unwrap();
        assert!(!json.contains("username"));
    }

    #[test]
    fn connect_timeout_matches_seconds() {
        let config = VoiceConfig::default();
        assert_eq!(config.connect_timeout(), std::time::Duration::from_secs(30));
    }
}
