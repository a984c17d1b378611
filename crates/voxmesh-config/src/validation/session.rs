//! Validation for retry, auto-join, view and signaling sections.

use crate::schema::VoxmeshConfig;

use super::helpers::validate_range;

pub(crate) fn validate_retry(errors: &mut Vec<String>, config: &VoxmeshConfig) {
    let retry = &config.retry;
    validate_range(errors, "retry.max_retries", retry.max_retries, 0, 10);
    validate_range(errors, "retry.base_delay_ms", retry.base_delay_ms, 100, 30_000);
    validate_range(
        errors,
        "retry.session_not_found_delay_ms",
        retry.session_not_found_delay_ms,
        50,
        5_000,
    );
    validate_range(errors, "retry.watchdog_secs", retry.watchdog_secs, 1, 60);
}

pub(crate) fn validate_auto_join(errors: &mut Vec<String>, config: &VoxmeshConfig) {
    validate_range(
        errors,
        "auto_join.initial_delay_ms",
        config.auto_join.initial_delay_ms,
        0,
        60_000,
    );
    validate_range(
        errors,
        "auto_join.server_trigger_delay_ms",
        config.auto_join.server_trigger_delay_ms,
        0,
        60_000,
    );
}

pub(crate) fn validate_view(errors: &mut Vec<String>, config: &VoxmeshConfig) {
    validate_range(
        errors,
        "view.mini_view_limit",
        config.view.mini_view_limit,
        1,
        16,
    );
}

pub(crate) fn validate_signaling(errors: &mut Vec<String>, config: &VoxmeshConfig) {
    let signaling = &config.signaling;
    if !(signaling.url.starts_with("ws://") || signaling.url.starts_with("wss://")) {
        errors.push(format!(
            "signaling.url = {:?} must start with ws:// or wss://",
            signaling.url
        ));
    }
    validate_range(
        errors,
        "signaling.connect_timeout_secs",
        signaling.connect_timeout_secs,
        1,
        120,
    );
    validate_range(
        errors,
        "signaling.reconnect_delay_secs",
        signaling.reconnect_delay_secs,
        1,
        60,
    );
    validate_range(
        errors,
        "signaling.heartbeat_interval_secs",
        signaling.heartbeat_interval_secs,
        5,
        300,
    );
    if signaling.max_reconnect_delay_secs < signaling.reconnect_delay_secs {
        errors.push(format!(
            "signaling.max_reconnect_delay_secs = {} is below reconnect_delay_secs = {}",
            signaling.max_reconnect_delay_secs, signaling.reconnect_delay_secs
        ));
    }
}
