//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# voxmesh Configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[voice]
# audio_quality = "medium"   # low, medium, high
# noise_suppression = true
# echo_cancellation = true
# auto_gain_control = true
# start_muted = true

[retry]
# max_retries = 3                  # 0-10
# base_delay_ms = 1000             # 100-30000, retry n waits base * n
# session_not_found_delay_ms = 300 # 50-5000
# watchdog_secs = 5                # 1-60

[activity]
# sample_interval_ms = 16    # 8-250
# speaking_threshold = 0.15  # 0.0-1.0
# fft_size = 256             # power of two, 32-2048

[quality]
# poll_interval_secs = 3     # 1-60
# good_max_rtt_ms = 180
# fair_max_rtt_ms = 350

[auto_join]
# enabled = true
# initial_delay_ms = 1500
# server_trigger_delay_ms = 500

[view]
# mini_view_limit = 5        # 1-16

[signaling]
# url = "ws://127.0.0.1:3001/voice"
# connect_timeout_secs = 15
# reconnect_delay_secs = 1
# max_reconnect_delay_secs = 30
# heartbeat_interval_secs = 25

[logging]
# level = "info"             # trace, debug, info, warn, error
"##
    .to_string()
}
