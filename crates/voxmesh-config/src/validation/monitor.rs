//! Validation for the activity and quality monitors.

use crate::schema::VoxmeshConfig;

use super::helpers::validate_range;

pub(crate) fn validate_activity(errors: &mut Vec<String>, config: &VoxmeshConfig) {
    let activity = &config.activity;
    validate_range(
        errors,
        "activity.sample_interval_ms",
        activity.sample_interval_ms,
        8,
        250,
    );
    validate_range(
        errors,
        "activity.speaking_threshold",
        activity.speaking_threshold,
        0.0,
        1.0,
    );
    validate_range(errors, "activity.fft_size", activity.fft_size, 32, 2048);
    if !activity.fft_size.is_power_of_two() {
        errors.push(format!(
            "activity.fft_size = {} must be a power of two",
            activity.fft_size
        ));
    }
}

pub(crate) fn validate_quality(errors: &mut Vec<String>, config: &VoxmeshConfig) {
    let quality = &config.quality;
    validate_range(
        errors,
        "quality.poll_interval_secs",
        quality.poll_interval_secs,
        1,
        60,
    );
    if quality.good_max_rtt_ms >= quality.fair_max_rtt_ms {
        errors.push(format!(
            "quality.good_max_rtt_ms = {} must be below fair_max_rtt_ms = {}",
            quality.good_max_rtt_ms, quality.fair_max_rtt_ms
        ));
    }
}
