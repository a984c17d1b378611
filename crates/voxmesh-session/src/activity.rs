//! Audio activity sampling and speaker ranking.

use std::cmp::Ordering;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use voxmesh_config::schema::ActivityConfig;

use crate::registry::{ParticipantView, PeerRegistry};
use crate::timer::Ticker;

/// Default level above which a source counts as speaking.
pub const SPEAKING_THRESHOLD: f32 = 0.15;

/// Normalized loudness of one source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AudioLevel {
    /// Mean bin magnitude scaled to `[0, 1]`.
    pub level: f32,
    pub speaking: bool,
}

impl AudioLevel {
    pub fn from_level(level: f32, threshold: f32) -> Self {
        Self {
            level,
            speaking: level > threshold,
        }
    }
}

/// Mean of the frequency bins, scaled from `0..=255` to `[0, 1]`.
pub fn energy_level(bins: &[u8]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum: u64 = bins.iter().map(|&b| u64::from(b)).sum();
    (sum as f32 / bins.len() as f32) / 255.0
}

/// Samples every attached audio source on a fixed cadence.
///
/// The tick loop runs only while at least one source is attached.
#[derive(Debug)]
pub(crate) struct AudioActivityMonitor {
    threshold: f32,
    interval: Duration,
    bins: Vec<u8>,
    ticker: Ticker,
}

impl AudioActivityMonitor {
    pub(crate) fn new(config: &ActivityConfig) -> Self {
        Self {
            threshold: config.speaking_threshold,
            interval: Duration::from_millis(config.sample_interval_ms),
            bins: vec![0; (config.fft_size / 2) as usize],
            ticker: Ticker::new("activity-sample"),
        }
    }

    /// Start or stop the loop to match the number of attached sources.
    pub(crate) fn sync<T, F>(&mut self, sources: usize, tx: &mpsc::UnboundedSender<T>, make: F)
    where
        T: Send + 'static,
        F: Fn(u64) -> T + Send + 'static,
    {
        if sources == 0 {
            self.ticker.stop();
        } else if !self.ticker.is_running() {
            self.ticker.start(self.interval, tx, make);
        }
    }

    pub(crate) fn stop(&mut self) {
        self.ticker.stop();
    }

    pub(crate) fn is_running(&self) -> bool {
        self.ticker.is_running()
    }

    pub(crate) fn accept_tick(&self, generation: u64) -> bool {
        self.ticker.accept(generation)
    }

    /// Measure all sources once. Returns `(user_id, level)` for every source
    /// whose speaking flag changed.
    pub(crate) fn sample(&mut self, registry: &mut PeerRegistry) -> Vec<(String, AudioLevel)> {
        let threshold = self.threshold;
        let bins = &mut self.bins;
        registry.sample_levels(|read| {
            bins.fill(0);
            read(bins.as_mut_slice());
            AudioLevel::from_level(energy_level(bins.as_slice()), threshold)
        })
    }
}

/// Total order used for every participant list.
///
/// Audible speakers first, then the host, then the local participant, then
/// louder before quieter, then by username.
pub fn compare_for_ranking(a: &ParticipantView, b: &ParticipantView) -> Ordering {
    b.is_active_speaker()
        .cmp(&a.is_active_speaker())
        .then_with(|| b.is_host.cmp(&a.is_host))
        .then_with(|| b.is_self.cmp(&a.is_self))
        .then_with(|| b.level.total_cmp(&a.level))
        .then_with(|| {
            a.username
                .to_lowercase()
                .cmp(&b.username.to_lowercase())
                .then_with(|| a.username.cmp(&b.username))
        })
}

/// Sort participants into display order.
pub fn rank_participants(views: &mut [ParticipantView]) {
    views.sort_by(compare_for_ranking);
}
