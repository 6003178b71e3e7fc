//! Tests for TOML config loading, creation, and path resolution.

use super::*;
use crate::schema::LogLevel;
use std::path::Path;

#[test]
fn load_from_nonexistent_returns_file_not_found() {
    let result = load_from_path(Path::new("/tmp/nonexistent_meshvoice_config.toml"));
    let err = result.unwrap_err();
    assert!(matches!(err, meshvoice_common::ConfigError::FileNotFound(_)));
}

#[test]
fn load_valid_partial_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r##"
[voice]
connect_timeout_secs = 45

[voice.audio]
noise_suppression = false

[logging]
level = "debug"
"##,
    )
    .unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.voice.connect_timeout_secs, 45);
    assert!(!config.voice.audio.noise_suppression);
    assert_eq!(config.logging.level, LogLevel::Debug);
    // Defaults preserved
    assert!(config.voice.audio.echo_cancellation);
    assert!(config.voice.trickle);
    assert_eq!(config.relay.listen_port, 8787);
}

#[test]
fn load_ice_servers_replaces_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[[voice.ice_servers]]
urls = ["turn:turn.example.com:3478"]
username = "testuser"
credential = "testpass123"
"#,
    )
    .unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.voice.ice_servers.len(), 1);
    let server = &config.voice.ice_servers[0];
    assert_eq!(server.urls, vec!["turn:turn.example.com:3478".to_string()]);
    assert_eq!(server.username.as_deref(), Some("testuser"));
}

#[test]
fn load_invalid_toml_returns_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "this is not valid toml {{{").unwrap();

    let err = load_from_path(&path).unwrap_err();
    assert!(matches!(err, meshvoice_common::ConfigError::ParseError(_)));
}

#[test]
fn load_unknown_log_level_returns_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[logging]\nlevel = \"loud\"\n").unwrap();

    let err = load_from_path(&path).unwrap_err();
    assert!(matches!(err, meshvoice_common::ConfigError::ParseError(_)));
}

#[test]
fn load_config_with_invalid_values_returns_parsed_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[voice]
connect_timeout_secs = 0
"#,
    )
    .unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.voice.connect_timeout_secs, 0);
}

#[test]
fn create_and_load_default_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("meshvoice").join("config.toml");

    create_default_config(&path).unwrap();
    assert!(path.exists());

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.voice.connect_timeout_secs, 30);
    assert_eq!(config.relay.url, "ws://127.0.0.1:8787/ws");
}

#[test]
fn default_config_toml_is_valid() {
    let config = parse_config(&super::template::default_config_toml()).unwrap();
    assert_eq!(config.logging.level, LogLevel::Info);
    assert!(crate::validation::validate(&config).is_ok());
}

#[test]
fn create_default_config_keeps_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[voice]\nconnect_timeout_secs = 12\n").unwrap();

    create_default_config(&path).unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.voice.connect_timeout_secs, 12);
}

#[test]
fn unreadable_path_returns_io_error() {
    let dir = tempfile::tempdir().unwrap();
    // A directory exists but cannot be read as a file.
    let err = load_from_path(dir.path()).unwrap_err();
    assert!(matches!(err, meshvoice_common::ConfigError::Io { .. }));
}

#[test]
fn env_override_wins_over_config_dir() {
    use super::paths::resolve_config_path;
    use std::path::PathBuf;

    let path = resolve_config_path(
        Some("/srv/voice/relay.toml".into()),
        Some(PathBuf::from("/home/u/.config")),
    )
    .unwrap();
    assert_eq!(path, PathBuf::from("/srv/voice/relay.toml"));

    let path =
        resolve_config_path(Some("".into()), Some(PathBuf::from("/home/u/.config"))).unwrap();
    assert_eq!(path, PathBuf::from("/home/u/.config/meshvoice/config.toml"));

    assert!(resolve_config_path(None, None).is_err());
}
