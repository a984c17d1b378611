//! Background WebSocket connection loop with auto-reconnect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use super::types::{SubscriberSlot, WsCommand, WsConfig};
use crate::protocol::InboundMessage;

/// Error text delivered to the subscriber when an established connection drops.
pub const CONNECTION_LOST_MESSAGE: &str = "signaling connection lost";

/// Shared flags between the handle and the loop.
pub(crate) struct LoopControl {
    pub(crate) connected: AtomicBool,
    pub(crate) shutdown: AtomicBool,
    pub(crate) wake: Notify,
}

impl LoopControl {
    pub(crate) fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Connection Loop
// ---------------------------------------------------------------------------

/// Background task managing the WebSocket connection with auto-reconnect.
///
/// Outbound commands wait in `command_rx` while disconnected and are flushed
/// once a connection is up again.
pub(crate) async fn connection_loop(
    config: WsConfig,
    control: Arc<LoopControl>,
    subscriber: SubscriberSlot,
    command_rx: mpsc::Receiver<WsCommand>,
) {
    let command_rx = Arc::new(Mutex::new(command_rx));
    let mut reconnect_delay = config.reconnect_delay_secs;
    let connect_timeout = Duration::from_secs(config.connect_timeout_secs);

    while !control.is_shutdown() {
        info!(url = %config.display_url(), "Connecting to signaling server");

        match tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(&config.url))
            .await
        {
            Ok(Ok((ws_stream, _))) => {
                reconnect_delay = config.reconnect_delay_secs;
                control.connected.store(true, Ordering::SeqCst);
                info!("Signaling connection established");

                let (ws_write, ws_read) = ws_stream.split();
                let ws_write = Arc::new(Mutex::new(ws_write));

                let heartbeat_handle = tokio::spawn(heartbeat_task(
                    Arc::clone(&ws_write),
                    config.heartbeat_interval_secs,
                ));
                let cmd_handle = tokio::spawn(command_forwarder(
                    Arc::clone(&command_rx),
                    Arc::clone(&ws_write),
                    Arc::clone(&control),
                ));

                let mut read_stream = ws_read;
                loop {
                    let msg_result = tokio::select! {
                        next = read_stream.next() => match next {
                            Some(result) => result,
                            None => break,
                        },
                        _ = control.wake.notified() => break,
                    };
                    match msg_result {
                        Ok(WsMessage::Text(text)) => {
                            match serde_json::from_str::<InboundMessage>(&text) {
                                Ok(msg) => dispatch(&subscriber, msg).await,
                                Err(e) => {
                                    debug!(error = %e, text = %text, "Unrecognized signaling frame");
                                }
                            }
                        }
                        Ok(WsMessage::Close(_)) => {
                            info!("Signaling server closed connection");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "WebSocket error");
                            break;
                        }
                        _ => {}
                    }
                }

                heartbeat_handle.abort();
                cmd_handle.abort();
                control.connected.store(false, Ordering::SeqCst);

                if control.is_shutdown() {
                    let mut writer = ws_write.lock().await;
                    let _ = writer.send(WsMessage::Close(None)).await;
                    break;
                }

                dispatch(
                    &subscriber,
                    InboundMessage::Error {
                        message: CONNECTION_LOST_MESSAGE.to_string(),
                        code: None,
                    },
                )
                .await;
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to connect to signaling server");
            }
            Err(_elapsed) => {
                error!(
                    timeout_secs = config.connect_timeout_secs,
                    "Signaling connection timed out"
                );
            }
        }

        if control.is_shutdown() {
            break;
        }

        // Exponential backoff reconnect.
        info!(delay = reconnect_delay, "Reconnecting in {} seconds", reconnect_delay);
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(reconnect_delay)) => {}
            _ = control.wake.notified() => {}
        }
        reconnect_delay = (reconnect_delay * 2).min(config.max_reconnect_delay_secs);
    }

    info!("Signaling connection loop stopped");
}

async fn dispatch(subscriber: &SubscriberSlot, msg: InboundMessage) {
    match subscriber.current() {
        Some((room_id, tx)) => {
            debug!(room = %room_id, event = msg.name(), "Inbound signaling event");
            if tx.send(msg).await.is_err() {
                debug!(room = %room_id, "Subscriber went away");
            }
        }
        None => debug!(event = msg.name(), "Inbound event with no subscriber"),
    }
}

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

async fn heartbeat_task<S>(ws_write: Arc<Mutex<S>>, interval_secs: u64)
where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    let period = Duration::from_secs(interval_secs);
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        interval.tick().await;
        let mut writer = ws_write.lock().await;
        if writer.send(WsMessage::Ping(Default::default())).await.is_err() {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Command Forwarder
// ---------------------------------------------------------------------------

async fn command_forwarder<S>(
    cmd_rx: Arc<Mutex<mpsc::Receiver<WsCommand>>>,
    cmd_write: Arc<Mutex<S>>,
    control: Arc<LoopControl>,
) where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    let mut rx = cmd_rx.lock().await;
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WsCommand::Send { room_id, frame } => {
                let mut writer = cmd_write.lock().await;
                if writer.send(WsMessage::Text(frame.into())).await.is_err() {
                    warn!(room = %room_id, "Dropped outbound message on broken connection");
                    return;
                }
            }
            WsCommand::Disconnect => {
                control.shutdown.store(true, Ordering::SeqCst);
                control.wake.notify_one();
                return;
            }
        }
    }
}
