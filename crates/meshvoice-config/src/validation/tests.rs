//! Tests for the full validation pipeline.

use super::*;
use crate::schema::*;

#[test]
fn default_config_validates() {
    let config = MeshvoiceConfig::default();
    assert!(validate(&config).is_ok());
}

#[test]
fn catches_zero_connect_timeout() {
    let mut config = MeshvoiceConfig::default();
    config.voice.connect_timeout_secs = 0;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("voice.connect_timeout_secs"));
}

#[test]
fn catches_playback_volume_out_of_range() {
    let mut config = MeshvoiceConfig::default();
    config.voice.audio.playback_volume = 1.5;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("voice.audio.playback_volume"));
}

#[test]
fn catches_ice_server_without_urls() {
    let mut config = MeshvoiceConfig::default();
    config.voice.ice_servers.push(IceServerConfig {
        urls: vec![],
        username: None,
        credential: None,
    });
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("voice.ice_servers[1] has no urls"));
}

#[test]
fn catches_bad_ice_scheme() {
    let mut config = MeshvoiceConfig::default();
    config.voice.ice_servers = vec![IceServerConfig::stun("http://stun.example")];
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("must start with stun:"));
}

#[test]
fn catches_turn_without_credentials() {
    let mut config = MeshvoiceConfig::default();
    config.voice.ice_servers.push(IceServerConfig::stun("turn:turn.example:3478"));
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("needs username and credential"));
}

#[test]
fn accepts_turn_with_credentials() {
    let mut config = MeshvoiceConfig::default();
    config.voice.ice_servers.push(IceServerConfig::turn(
        "turn:turn.example:3478?transport=tcp",
        "testuser",
        "testpass123",
    ));
    assert!(validate(&config).is_ok());
}

#[test]
fn catches_non_websocket_relay_url() {
    let mut config = MeshvoiceConfig::default();
    config.relay.url = "http://relay.example".into();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("relay.url"));
}

#[test]
fn collects_multiple_errors() {
    let mut config = MeshvoiceConfig::default();
    config.voice.connect_timeout_secs = 0;
    config.relay.request_timeout_secs = 0;
    config.relay.listen_port = 0;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("voice.connect_timeout_secs"));
    assert!(err.contains("relay.request_timeout_secs"));
    assert!(err.contains("relay.listen_port"));
    assert_eq!(err.matches("; ").count(), 2);
}
