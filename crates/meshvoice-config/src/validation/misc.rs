//! Validation for the voice, ICE server and relay sections.

use crate::schema::MeshvoiceConfig;

use std::fmt::Display;

const ICE_SCHEMES: [&str; 4] = ["stun:", "stuns:", "turn:", "turns:"];

/// Validate voice constraints.
pub(crate) fn validate_voice(errors: &mut Vec<String>, config: &MeshvoiceConfig) {
    check_range(
        errors,
        "voice.connect_timeout_secs",
        u64::from(config.voice.connect_timeout_secs),
        1,
        300,
    );
    check_range(
        errors,
        "voice.ice_candidate_pool_size",
        u64::from(config.voice.ice_candidate_pool_size),
        0,
        64,
    );
    check_range(
        errors,
        "voice.audio.playback_volume",
        config.voice.audio.playback_volume,
        0.0,
        1.0,
    );
}

/// Every ICE server needs at least one STUN/TURN url, and TURN servers
/// need both a username and a credential.
pub(crate) fn validate_ice_servers(errors: &mut Vec<String>, config: &MeshvoiceConfig) {
    for (i, server) in config.voice.ice_servers.iter().enumerate() {
        if server.urls.is_empty() {
            errors.push(format!("voice.ice_servers[{i}] has no urls"));
            continue;
        }
        for url in &server.urls {
            if !ICE_SCHEMES.iter().any(|scheme| url.starts_with(scheme)) {
                errors.push(format!(
                    "voice.ice_servers[{i}] url '{url}' must start with stun:, stuns:, turn: or turns:"
                ));
            }
        }
        let is_turn = server.urls.iter().any(|u| u.starts_with("turn"));
        if is_turn && (server.username.is_none() || server.credential.is_none()) {
            errors.push(format!(
                "voice.ice_servers[{i}] is a TURN server and needs username and credential"
            ));
        }
    }
}

/// Validate relay constraints.
pub(crate) fn validate_relay(errors: &mut Vec<String>, config: &MeshvoiceConfig) {
    let relay = &config.relay;
    if !(relay.url.starts_with("ws://") || relay.url.starts_with("wss://")) {
        errors.push(format!("relay.url '{}' must be a ws:// or wss:// url", relay.url));
    }
    check_range(errors, "relay.request_timeout_secs", relay.request_timeout_secs, 1, 120);
    check_range(
        errors,
        "relay.heartbeat_interval_secs",
        relay.heartbeat_interval_secs,
        5,
        300,
    );
    check_range(
        errors,
        "relay.reconnect_delay_secs",
        relay.reconnect_delay_secs,
        1,
        relay.max_reconnect_delay_secs.max(1),
    );
    check_range(errors, "relay.record_ttl_secs", relay.record_ttl_secs, 10, 86_400);
    if relay.listen_port == 0 {
        errors.push("relay.listen_port must not be 0".into());
    }
}

/// Push an error if `value` is outside `[min, max]`.
fn check_range<T: PartialOrd + Display>(
    errors: &mut Vec<String>,
    name: &str,
    value: T,
    min: T,
    max: T,
) {
    if value < min || value > max {
        errors.push(format!("{name} = {value} is out of range [{min}, {max}]"));
    }
}
