//! Tests for the full validation pipeline.

use super::*;

#[test]
fn default_config_validates() {
    let config = VoxmeshConfig::default();
    assert!(validate(&config).is_ok());
}

#[test]
fn catches_excessive_retry_budget() {
    let mut config = VoxmeshConfig::default();
    config.retry.max_retries = 11;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("retry.max_retries"));
}

#[test]
fn catches_threshold_above_one() {
    let mut config = VoxmeshConfig::default();
    config.activity.speaking_threshold = 1.5;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("activity.speaking_threshold"));
}

#[test]
fn catches_non_power_of_two_fft() {
    let mut config = VoxmeshConfig::default();
    config.activity.fft_size = 300;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("power of two"));
}

#[test]
fn catches_inverted_quality_bands() {
    let mut config = VoxmeshConfig::default();
    config.quality.good_max_rtt_ms = 400;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("quality.good_max_rtt_ms"));
}

#[test]
fn catches_non_websocket_url() {
    let mut config = VoxmeshConfig::default();
    config.signaling.url = "http://example.com".into();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("signaling.url"));
}

#[test]
fn collects_multiple_errors() {
    let mut config = VoxmeshConfig::default();
    config.view.mini_view_limit = 0;
    config.retry.watchdog_secs = 0;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("view.mini_view_limit"));
    assert!(err.contains("retry.watchdog_secs"));
}
