//! Public types of the session coordinator.

use std::fmt;

use serde::Serialize;
use tokio::sync::oneshot;
use voxmesh_common::{Notification, SessionId, VoiceError};

use crate::protocol::SessionSettings;
use crate::quality::LinkQuality;
use crate::registry::ParticipantView;

/// Connection state of the local participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Retry budget exhausted. Only an explicit join leaves this state.
    Error,
}

impl fmt::Display for VoiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VoiceState::Disconnected => "disconnected",
            VoiceState::Connecting => "connecting",
            VoiceState::Connected => "connected",
            VoiceState::Reconnecting => "reconnecting",
            VoiceState::Error => "error",
        })
    }
}

/// Stable identity of the local user, from the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    pub user_id: String,
    pub username: String,
}

impl LocalIdentity {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
        }
    }
}

/// The room the local user currently occupies, from the lobby service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomContext {
    pub room_id: String,
    pub host_user_id: Option<String>,
}

impl RoomContext {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            host_user_id: None,
        }
    }

    pub fn with_host(mut self, host_user_id: impl Into<String>) -> Self {
        self.host_user_id = Some(host_user_id.into());
        self
    }
}

/// The current voice session as the coordinator knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    /// Set once the server has announced or confirmed the session.
    pub session_id: Option<SessionId>,
    pub room_id: String,
    pub host_user_id: Option<String>,
    pub settings: SessionSettings,
    /// Whether the local user started this session.
    pub owned: bool,
}

/// Everything the coordinator reports to the application.
#[derive(Debug, Clone)]
pub enum VoiceEvent {
    StateChanged(VoiceState),
    SessionStarted {
        session_id: SessionId,
        host_user_id: Option<String>,
    },
    ParticipantJoined {
        user_id: String,
        username: String,
    },
    ParticipantLeft {
        user_id: String,
        username: String,
    },
    MuteChanged {
        user_id: String,
        is_muted: bool,
    },
    /// Edge-triggered: sent only when the speaking flag flips.
    SpeakingChanged {
        user_id: String,
        speaking: bool,
        level: f32,
    },
    QualityChanged {
        user_id: String,
        quality: LinkQuality,
    },
    SettingsChanged(SessionSettings),
    LocalMuteChanged(bool),
    LocalDeafenChanged(bool),
    Notification(Notification),
}

impl VoiceEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            VoiceEvent::StateChanged(_) => "state-changed",
            VoiceEvent::SessionStarted { .. } => "session-started",
            VoiceEvent::ParticipantJoined { .. } => "participant-joined",
            VoiceEvent::ParticipantLeft { .. } => "participant-left",
            VoiceEvent::MuteChanged { .. } => "mute-changed",
            VoiceEvent::SpeakingChanged { .. } => "speaking-changed",
            VoiceEvent::QualityChanged { .. } => "quality-changed",
            VoiceEvent::SettingsChanged(_) => "settings-changed",
            VoiceEvent::LocalMuteChanged(_) => "local-mute-changed",
            VoiceEvent::LocalDeafenChanged(_) => "local-deafen-changed",
            VoiceEvent::Notification(_) => "notification",
        }
    }
}

/// Point-in-time view of coordinator internals, for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorSnapshot {
    pub state: VoiceState,
    pub room_id: Option<String>,
    pub active_room_id: Option<String>,
    pub session_id: Option<SessionId>,
    pub is_muted: bool,
    pub is_deafened: bool,
    pub can_transmit: bool,
    pub has_capture: bool,
    pub join_in_flight: bool,
    pub attempt_count: u32,
    pub retry_pending: bool,
    pub fast_retry_pending: bool,
    pub watchdog_pending: bool,
    pub auto_join_pending: bool,
    pub sampling: bool,
    pub quality_polling: bool,
    pub subscribed: bool,
    pub participant_count: usize,
    pub link_count: usize,
}

impl CoordinatorSnapshot {
    /// Whether any timer or periodic loop is still alive.
    pub fn has_pending_work(&self) -> bool {
        self.retry_pending
            || self.fast_retry_pending
            || self.watchdog_pending
            || self.auto_join_pending
            || self.sampling
            || self.quality_polling
    }
}

/// Requests from the handle to the coordinator task.
pub(crate) enum Command {
    AttachRoom {
        room: RoomContext,
        reply: oneshot::Sender<()>,
    },
    StartSession {
        room_id: String,
        settings: SessionSettings,
        reply: oneshot::Sender<Result<(), VoiceError>>,
    },
    Join {
        room_id: String,
        reply: oneshot::Sender<()>,
    },
    Leave {
        room_id: String,
        reply: oneshot::Sender<()>,
    },
    ToggleMute {
        reply: oneshot::Sender<bool>,
    },
    ToggleDeafen {
        reply: oneshot::Sender<bool>,
    },
    State {
        reply: oneshot::Sender<VoiceState>,
    },
    Participants {
        /// Truncate to the configured mini-view size.
        mini: bool,
        reply: oneshot::Sender<Vec<ParticipantView>>,
    },
    Session {
        reply: oneshot::Sender<Option<SessionInfo>>,
    },
    Snapshot {
        reply: oneshot::Sender<CoordinatorSnapshot>,
    },
    DrainNotifications {
        reply: oneshot::Sender<Vec<Notification>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}
