//! [`SignalingChannel`] over a plain WebSocket connection.

mod connection;
mod types;

pub use connection::CONNECTION_LOST_MESSAGE;
pub use types::WsConfig;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use voxmesh_common::SignalingError;

use self::connection::{connection_loop, LoopControl};
use self::types::{Subscriber, SubscriberSlot, WsCommand};
use super::{SignalingChannel, Subscription};
use crate::protocol::OutboundMessage;

const COMMAND_QUEUE_CAPACITY: usize = 256;
const SUBSCRIPTION_CAPACITY: usize = 64;

/// Handle to the background WebSocket connection.
///
/// All methods are non-blocking and hand work to the connection task.
pub struct WsSignalingChannel {
    command_tx: mpsc::Sender<WsCommand>,
    control: Arc<LoopControl>,
    subscriber: SubscriberSlot,
    next_token: AtomicU64,
}

impl WsSignalingChannel {
    /// Create the channel and start connecting in the background.
    pub fn connect(config: WsConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let control = Arc::new(LoopControl::new());
        let subscriber = SubscriberSlot::default();

        tokio::spawn(connection_loop(
            config,
            Arc::clone(&control),
            subscriber.clone(),
            command_rx,
        ));

        Self {
            command_tx,
            control,
            subscriber,
            next_token: AtomicU64::new(1),
        }
    }

    /// Whether the WebSocket is currently open.
    pub fn is_connected(&self) -> bool {
        self.control.connected.load(Ordering::SeqCst)
    }

    /// Close the connection and stop reconnecting.
    pub async fn disconnect(&self) {
        if self.command_tx.send(WsCommand::Disconnect).await.is_err() {
            return;
        }
        // The forwarder only runs while connected; wake the loop directly too.
        self.control.shutdown.store(true, Ordering::SeqCst);
        self.control.wake.notify_one();
    }
}

#[async_trait]
impl SignalingChannel for WsSignalingChannel {
    async fn send(&self, message: OutboundMessage) -> Result<(), SignalingError> {
        let frame = serde_json::to_string(&message)
            .map_err(|e| SignalingError::Encode(e.to_string()))?;
        self.command_tx
            .try_send(WsCommand::Send {
                room_id: message.room_id().to_string(),
                frame,
            })
            .map_err(|e| match e {
                TrySendError::Full(_) => SignalingError::SendFailed("outbound queue full".into()),
                TrySendError::Closed(_) => SignalingError::Closed,
            })
    }

    fn subscribe(&self, room_id: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.subscriber.install(Subscriber {
            token,
            room_id: room_id.to_string(),
            tx,
        });
        tracing::debug!(room = %room_id, token, "Signaling subscription opened");

        let slot = self.subscriber.clone();
        let room = room_id.to_string();
        Subscription::new(room_id, rx, move || {
            if slot.release(token) {
                tracing::debug!(room = %room, token, "Signaling subscription released");
            }
        })
    }
}

#[cfg(test)]
mod tests;
