//! Boundary to the signaling service.
//!
//! The coordinator talks to the server through [`SignalingChannel`]. Inbound
//! events for a room arrive on a [`Subscription`], which unsubscribes when
//! dropped so every exit path of the coordinator releases it.

mod subscription;
pub mod ws;

pub use subscription::Subscription;
pub use ws::WsSignalingChannel;

use async_trait::async_trait;
use voxmesh_common::SignalingError;

use crate::protocol::OutboundMessage;

/// Message channel to the signaling server.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Queue a message for delivery.
    async fn send(&self, message: OutboundMessage) -> Result<(), SignalingError>;

    /// Start receiving inbound events for `room_id`.
    fn subscribe(&self, room_id: &str) -> Subscription;
}
