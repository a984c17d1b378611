//! Cancellable one-shot and periodic timers owned by the coordinator task.
//!
//! A timer never touches coordinator state itself. When it fires it posts a
//! message carrying its generation back onto the coordinator's queue, and
//! the coordinator asks the slot whether that generation is still current.
//! A fire that raced a cancel or a reschedule is therefore ignored.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// A single pending delayed action.
#[derive(Debug)]
pub(crate) struct TimerSlot {
    name: &'static str,
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl TimerSlot {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            generation: 0,
            handle: None,
        }
    }

    /// Schedule a fire after `delay`, replacing anything pending.
    pub(crate) fn schedule<T, F>(&mut self, delay: Duration, tx: &mpsc::UnboundedSender<T>, make: F)
    where
        T: Send + 'static,
        F: FnOnce(u64) -> T + Send + 'static,
    {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        let tx = tx.clone();
        tracing::debug!(timer = self.name, delay_ms = delay.as_millis() as u64, "timer scheduled");
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(make(generation));
        }));
    }

    pub(crate) fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            tracing::debug!(timer = self.name, "timer cancelled");
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.handle.is_some()
    }

    /// Consume a fire. Returns `true` only for the current pending schedule.
    pub(crate) fn fire(&mut self, generation: u64) -> bool {
        if self.handle.is_some() && generation == self.generation {
            self.handle = None;
            true
        } else {
            false
        }
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

const MIN_TICK_PERIOD: Duration = Duration::from_millis(1);

/// A periodic tick source.
#[derive(Debug)]
pub(crate) struct Ticker {
    name: &'static str,
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            generation: 0,
            handle: None,
        }
    }

    /// Start ticking every `period`. No-op when already running.
    pub(crate) fn start<T, F>(&mut self, period: Duration, tx: &mpsc::UnboundedSender<T>, make: F)
    where
        T: Send + 'static,
        F: Fn(u64) -> T + Send + 'static,
    {
        if self.handle.is_some() {
            return;
        }
        self.generation += 1;
        let generation = self.generation;
        let tx = tx.clone();
        let period = period.max(MIN_TICK_PERIOD);
        tracing::debug!(ticker = self.name, period_ms = period.as_millis() as u64, "ticker started");
        self.handle = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if tx.send(make(generation)).is_err() {
                    break;
                }
            }
        }));
    }

    pub(crate) fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            tracing::debug!(ticker = self.name, "ticker stopped");
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Whether a tick belongs to the currently running ticker.
    pub(crate) fn accept(&self, generation: u64) -> bool {
        self.handle.is_some() && generation == self.generation
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn slot_fires_once_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut slot = TimerSlot::new("test");
        slot.schedule(Duration::from_millis(300), &tx, |g| g);
        assert!(slot.is_pending());

        let start = Instant::now();
        let generation = rx.recv().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert!(slot.fire(generation));
        assert!(!slot.is_pending());
        assert!(!slot.fire(generation));
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_invalidates_earlier_generation() {
        let (tx, _rx) = mpsc::unbounded_channel::<u64>();
        let mut slot = TimerSlot::new("test");
        slot.schedule(Duration::from_millis(300), &tx, |g| g);
        let first = 1;
        slot.schedule(Duration::from_millis(300), &tx, |g| g);
        assert!(!slot.fire(first));
        assert!(slot.fire(2));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_slot_rejects_queued_fire() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut slot = TimerSlot::new("test");
        slot.schedule(Duration::from_millis(10), &tx, |g| g);
        tokio::time::sleep(Duration::from_millis(20)).await;
        slot.cancel();
        let generation = rx.recv().await.unwrap();
        assert!(!slot.fire(generation));
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_ticks_until_stopped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut ticker = Ticker::new("test");
        ticker.start(Duration::from_millis(16), &tx, |g| g);
        let g1 = rx.recv().await.unwrap();
        let g2 = rx.recv().await.unwrap();
        assert_eq!(g1, g2);
        assert!(ticker.accept(g1));

        ticker.stop();
        assert!(!ticker.is_running());
        assert!(!ticker.accept(g1));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_period_ticker_still_ticks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut ticker = Ticker::new("test");
        ticker.start(Duration::ZERO, &tx, |g| g);
        let generation = rx.recv().await.unwrap();
        assert!(ticker.accept(generation));
        ticker.stop();
    }
}
