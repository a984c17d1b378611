//! The session coordinator.
//!
//! [`SessionCoordinator`] is a cheap handle to a single task that owns all
//! session state. Commands, inbound signaling, timer fires, capture results
//! and link results are all queued to that task and handled one at a time.

mod driver;
mod types;

pub use types::{
    CoordinatorSnapshot, LocalIdentity, RoomContext, SessionInfo, VoiceEvent, VoiceState,
};

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use voxmesh_common::{Notification, VoiceError};
use voxmesh_config::{validation, VoxmeshConfig};

use self::driver::Driver;
use self::types::Command;
use crate::media::{AudioCapture, TransportFactory};
use crate::protocol::SessionSettings;
use crate::registry::ParticipantView;
use crate::signaling::SignalingChannel;

const COMMAND_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 256;

/// External capabilities the coordinator drives.
#[derive(Clone)]
pub struct Collaborators {
    pub signaling: Arc<dyn SignalingChannel>,
    pub capture: Arc<dyn AudioCapture>,
    pub transports: Arc<dyn TransportFactory>,
}

/// Handle to the running coordinator task.
#[derive(Clone)]
pub struct SessionCoordinator {
    command_tx: mpsc::Sender<Command>,
}

impl SessionCoordinator {
    /// Start the coordinator task.
    /// Returns `(coordinator, event_receiver)`, or the validation error when
    /// `config` holds out-of-range values.
    pub fn spawn(
        config: VoxmeshConfig,
        identity: LocalIdentity,
        collaborators: Collaborators,
    ) -> Result<(Self, mpsc::Receiver<VoiceEvent>), VoiceError> {
        validation::validate(&config)?;
        let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);

        let (driver, inbox) = Driver::new(config, identity, collaborators, event_tx);
        tokio::spawn(driver.run(command_rx, inbox));

        Ok((Self { command_tx }, event_rx))
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, VoiceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(make(reply_tx))
            .await
            .map_err(|_| VoiceError::CoordinatorClosed)?;
        reply_rx.await.map_err(|_| VoiceError::CoordinatorClosed)
    }

    /// Tell the coordinator which room the user is in. Schedules the
    /// automatic join when enabled. Entering a different room leaves the
    /// current one first.
    pub async fn attach_room(&self, room: RoomContext) -> Result<(), VoiceError> {
        self.request(|reply| Command::AttachRoom { room, reply }).await
    }

    /// Ask the server to start a session for a room. Succeeds immediately if
    /// the local user already owns that room's session.
    pub async fn start_session(
        &self,
        room_id: impl Into<String>,
        settings: SessionSettings,
    ) -> Result<(), VoiceError> {
        let room_id = room_id.into();
        self.request(|reply| Command::StartSession {
            room_id,
            settings,
            reply,
        })
        .await?
    }

    /// Begin joining a room's session. Progress is reported through
    /// [`VoiceEvent::StateChanged`]. A no-op while connected or joining.
    pub async fn join(&self, room_id: impl Into<String>) -> Result<(), VoiceError> {
        let room_id = room_id.into();
        self.request(|reply| Command::Join { room_id, reply }).await
    }

    /// Leave the session and release every local resource.
    pub async fn leave(&self, room_id: impl Into<String>) -> Result<(), VoiceError> {
        let room_id = room_id.into();
        self.request(|reply| Command::Leave { room_id, reply }).await
    }

    /// Flip local mute. Returns the new muted flag.
    pub async fn toggle_mute(&self) -> Result<bool, VoiceError> {
        self.request(|reply| Command::ToggleMute { reply }).await
    }

    /// Flip local deafen. Returns the new deafened flag.
    pub async fn toggle_deafen(&self) -> Result<bool, VoiceError> {
        self.request(|reply| Command::ToggleDeafen { reply }).await
    }

    pub async fn state(&self) -> Result<VoiceState, VoiceError> {
        self.request(|reply| Command::State { reply }).await
    }

    /// Everyone in the session, ranked.
    pub async fn participants(&self) -> Result<Vec<ParticipantView>, VoiceError> {
        self.request(|reply| Command::Participants { mini: false, reply })
            .await
    }

    /// The first few ranked participants, for compact displays.
    pub async fn mini_view(&self) -> Result<Vec<ParticipantView>, VoiceError> {
        self.request(|reply| Command::Participants { mini: true, reply })
            .await
    }

    pub async fn session(&self) -> Result<Option<SessionInfo>, VoiceError> {
        self.request(|reply| Command::Session { reply }).await
    }

    pub async fn snapshot(&self) -> Result<CoordinatorSnapshot, VoiceError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    pub async fn link_count(&self) -> Result<usize, VoiceError> {
        Ok(self.snapshot().await?.link_count)
    }

    pub async fn is_muted(&self) -> Result<bool, VoiceError> {
        Ok(self.snapshot().await?.is_muted)
    }

    pub async fn is_deafened(&self) -> Result<bool, VoiceError> {
        Ok(self.snapshot().await?.is_deafened)
    }

    /// Take the notifications that have not expired yet.
    pub async fn drain_notifications(&self) -> Result<Vec<Notification>, VoiceError> {
        self.request(|reply| Command::DrainNotifications { reply })
            .await
    }

    /// Leave any session and stop the coordinator task.
    pub async fn shutdown(&self) -> Result<(), VoiceError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}
