//! Types shared by the WebSocket channel handle and its connection loop.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use voxmesh_config::schema::SignalingConfig;

use crate::protocol::InboundMessage;

/// Connection settings for [`super::WsSignalingChannel`].
#[derive(Debug, Clone)]
pub struct WsConfig {
    pub url: String,
    pub connect_timeout_secs: u64,
    pub reconnect_delay_secs: u64,
    pub max_reconnect_delay_secs: u64,
    pub heartbeat_interval_secs: u64,
}

impl From<&SignalingConfig> for WsConfig {
    fn from(config: &SignalingConfig) -> Self {
        Self {
            url: config.url.clone(),
            connect_timeout_secs: config.connect_timeout_secs,
            reconnect_delay_secs: config.reconnect_delay_secs,
            max_reconnect_delay_secs: config.max_reconnect_delay_secs,
            heartbeat_interval_secs: config.heartbeat_interval_secs,
        }
    }
}

impl WsConfig {
    /// URL with any query string stripped, for logging.
    pub fn display_url(&self) -> &str {
        self.url.split('?').next().unwrap_or("")
    }
}

/// Commands from the handle to the background connection task.
#[derive(Debug)]
pub(crate) enum WsCommand {
    /// An already-encoded text frame.
    Send { room_id: String, frame: String },
    Disconnect,
}

/// The single active subscriber.
pub(crate) struct Subscriber {
    pub(crate) token: u64,
    pub(crate) room_id: String,
    pub(crate) tx: mpsc::Sender<InboundMessage>,
}

/// Slot holding the current subscriber, shared with the connection task.
#[derive(Clone, Default)]
pub(crate) struct SubscriberSlot(Arc<Mutex<Option<Subscriber>>>);

impl SubscriberSlot {
    fn lock(&self) -> MutexGuard<'_, Option<Subscriber>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Install a subscriber, replacing (and thereby closing) any previous one.
    pub(crate) fn install(&self, subscriber: Subscriber) {
        *self.lock() = Some(subscriber);
    }

    /// Remove the subscriber if it is still the one identified by `token`.
    pub(crate) fn release(&self, token: u64) -> bool {
        let mut slot = self.lock();
        if slot.as_ref().is_some_and(|s| s.token == token) {
            *slot = None;
            true
        } else {
            false
        }
    }

    /// Sender and room of the current subscriber.
    pub(crate) fn current(&self) -> Option<(String, mpsc::Sender<InboundMessage>)> {
        self.lock()
            .as_ref()
            .map(|s| (s.room_id.clone(), s.tx.clone()))
    }
}
