use std::fmt;

use tokio::sync::mpsc;

use crate::protocol::InboundMessage;

type Release = Box<dyn FnOnce() + Send + Sync>;

/// Scoped stream of inbound events for one room.
///
/// Dropping the subscription runs the channel's release hook exactly once.
pub struct Subscription {
    room_id: String,
    rx: mpsc::Receiver<InboundMessage>,
    release: Option<Release>,
}

impl Subscription {
    pub fn new(
        room_id: impl Into<String>,
        rx: mpsc::Receiver<InboundMessage>,
        release: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            rx,
            release: Some(Box::new(release)),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Next inbound event, or `None` once the channel side has gone away.
    pub async fn recv(&mut self) -> Option<InboundMessage> {
        self.rx.recv().await
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("room_id", &self.room_id)
            .finish_non_exhaustive()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn drop_runs_release_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let (tx, rx) = mpsc::channel(4);
        let mut sub = Subscription::new("room-1", rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tx.send(InboundMessage::AutoJoin {
            room_id: "room-1".into(),
        })
        .await
        .unwrap();
        assert!(matches!(sub.recv().await, Some(InboundMessage::AutoJoin { .. })));
        assert_eq!(sub.room_id(), "room-1");

        drop(sub);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscription_can_live_in_a_spawned_task() {
        fn shareable<T: Send + Sync>() {}
        shareable::<Subscription>();
    }
}
