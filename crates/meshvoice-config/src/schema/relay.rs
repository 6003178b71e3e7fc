use serde::{Deserialize, Serialize};

/// Configuration for the signaling relay, shared by clients and the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// WebSocket URL of the relay server.
    pub url: String,
    /// Seconds to wait for the relay to answer a request.
    pub request_timeout_secs: u64,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Reconnect base delay in seconds.
    pub reconnect_delay_secs: u64,
    /// Maximum reconnect delay in seconds.
    pub max_reconnect_delay_secs: u64,
    /// Port the relay server listens on.
    pub listen_port: u16,
    /// Seconds an unconsumed signal record is kept by the relay server.
    pub record_ttl_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8787/ws".into(),
            request_timeout_secs: 10,
            heartbeat_interval_secs: 25,
            reconnect_delay_secs: 1,
            max_reconnect_delay_secs: 30,
            listen_port: 8787,
            record_ttl_secs: 600,
        }
    }
}
