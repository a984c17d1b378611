//! Audio-activity and link-quality monitor settings.

use serde::{Deserialize, Serialize};

/// Audio-activity sampling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    /// Sampling tick, roughly one display refresh.
    pub sample_interval_ms: u64,
    /// Normalized level above which a source counts as speaking.
    pub speaking_threshold: f32,
    /// Analyser FFT size; half of it is the number of frequency bins read per tick.
    pub fft_size: u32,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 16,
            speaking_threshold: 0.15,
            fft_size: 256,
        }
    }
}

/// Transport statistics polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub poll_interval_secs: u64,
    /// Highest round-trip time still classified as good.
    pub good_max_rtt_ms: u32,
    /// Highest round-trip time still classified as fair.
    pub fair_max_rtt_ms: u32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 3,
            good_max_rtt_ms: 180,
            fair_max_rtt_ms: 350,
        }
    }
}
