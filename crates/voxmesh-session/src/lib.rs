//! Group voice-session coordinator.
//!
//! Lets every occupant of a room talk to every other occupant over a full
//! mesh of direct peer links. The crate owns the session lifecycle, the
//! signaling protocol, per-peer link negotiation, join retries, audio
//! activity sampling with speaker ranking, mute/deafen synchronization and
//! link quality classification. Audio devices, peer transports and the
//! signaling transport are supplied by the host through the traits in
//! [`media`] and [`signaling`].
//!
//! ```rust,no_run
//! use voxmesh_session::{Collaborators, LocalIdentity, RoomContext, SessionCoordinator};
//! # async fn demo(collaborators: Collaborators) -> Result<(), voxmesh_session::VoiceError> {
//! let config = voxmesh_config::VoxmeshConfig::default();
//! let identity = LocalIdentity::new("user-1", "ana");
//! let (coordinator, mut events) = SessionCoordinator::spawn(config, identity, collaborators)?;
//! coordinator.attach_room(RoomContext::new("room-1").with_host("user-2")).await?;
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod activity;
pub mod coordinator;
mod links;
pub mod media;
pub mod protocol;
pub mod quality;
pub mod reconnect;
pub mod registry;
pub mod signaling;
mod timer;

#[cfg(test)]
pub(crate) mod testing;

pub use activity::{compare_for_ranking, energy_level, rank_participants, AudioLevel};
pub use coordinator::{
    Collaborators, CoordinatorSnapshot, LocalIdentity, RoomContext, SessionCoordinator,
    SessionInfo, VoiceEvent, VoiceState,
};
pub use links::PeerLink;
pub use quality::{LinkQuality, QualityClass, QualityThresholds};
pub use reconnect::{FailureKind, ReconnectionPolicy, RetryDecision, RetryState};
pub use registry::{Participant, ParticipantView, SELF_ID};
pub use signaling::{SignalingChannel, Subscription, WsSignalingChannel};
pub use voxmesh_common::{CaptureError, LinkError, SignalingError, VoiceError};
