//! Link quality classification from round-trip time.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use voxmesh_config::schema::QualityConfig;

use crate::registry::PeerRegistry;
use crate::timer::Ticker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityClass {
    Good,
    Fair,
    Poor,
}

/// Latest measurement for one link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkQuality {
    pub rtt_ms: u32,
    pub class: QualityClass,
}

/// RTT boundaries (inclusive) for the good and fair classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityThresholds {
    pub good_max_ms: u32,
    pub fair_max_ms: u32,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            good_max_ms: 180,
            fair_max_ms: 350,
        }
    }
}

impl QualityThresholds {
    pub fn classify(&self, rtt_ms: u32) -> QualityClass {
        if rtt_ms <= self.good_max_ms {
            QualityClass::Good
        } else if rtt_ms <= self.fair_max_ms {
            QualityClass::Fair
        } else {
            QualityClass::Poor
        }
    }

    pub fn measure(&self, rtt: Duration) -> LinkQuality {
        let rtt_ms = u32::try_from(rtt.as_millis()).unwrap_or(u32::MAX);
        LinkQuality {
            rtt_ms,
            class: self.classify(rtt_ms),
        }
    }
}

/// Drives the periodic statistics poll and records its results.
#[derive(Debug)]
pub(crate) struct QualityMonitor {
    thresholds: QualityThresholds,
    interval: Duration,
    ticker: Ticker,
}

impl QualityMonitor {
    pub(crate) fn new(config: &QualityConfig) -> Self {
        Self {
            thresholds: QualityThresholds {
                good_max_ms: config.good_max_rtt_ms,
                fair_max_ms: config.fair_max_rtt_ms,
            },
            interval: Duration::from_secs(config.poll_interval_secs),
            ticker: Ticker::new("quality-poll"),
        }
    }

    pub(crate) fn start<T, F>(&mut self, tx: &mpsc::UnboundedSender<T>, make: F)
    where
        T: Send + 'static,
        F: Fn(u64) -> T + Send + 'static,
    {
        self.ticker.start(self.interval, tx, make);
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

    /// Store a sample for a link. A missing measurement keeps the previous
    /// value. Returns the new quality when it changed.
    pub(crate) fn record(
        &self,
        registry: &mut PeerRegistry,
        peer_id: &str,
        rtt: Option<Duration>,
    ) -> Option<LinkQuality> {
        let rtt = rtt?;
        let slot = registry.quality_mut(peer_id)?;
        let quality = self.thresholds.measure(rtt);
        if *slot == Some(quality) {
            return None;
        }
        *slot = Some(quality);
        Some(quality)
    }
}
