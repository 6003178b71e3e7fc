//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# Meshvoice Configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[voice]
# connect_timeout_secs = 30      # 1-300, negotiation bound per peer
# trickle = true                 # send ICE candidates as they are gathered
# ice_candidate_pool_size = 10   # 0-64

[voice.audio]
# echo_cancellation = true
# noise_suppression = true
# auto_gain_control = true
# playback_volume = 1.0          # 0.0-1.0

# STUN/TURN servers. Declaring any [[voice.ice_servers]] table replaces
# the default public STUN pair.
# [[voice.ice_servers]]
# urls = ["stun:stun.l.google.com:19302", "stun:stun1.l.google.com:19302"]
#
# [[voice.ice_servers]]
# urls = ["turn:turn.example.com:3478", "turn:turn.example.com:3478?transport=tcp"]
# username = "user"
# credential = "secret"

[relay]
# url = "ws://127.0.0.1:8787/ws"
# request_timeout_secs = 10      # 1-120
# heartbeat_interval_secs = 25   # 5-300
# reconnect_delay_secs = 1
# max_reconnect_delay_secs = 30
# listen_port = 8787             # relay server only
# record_ttl_secs = 600          # relay server only, 10-86400

[logging]
# level = "info"                 # trace, debug, info, warn, error
"##
    .to_string()
}
