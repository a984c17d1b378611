//! Capability traits for the media collaborators.
//!
//! The coordinator never touches audio devices or network transports
//! directly. Capture acquisition, peer transports and remote playback are
//! supplied by the host application through these traits; the coordinator
//! only drives them and reacts to what they report.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use voxmesh_common::{CaptureError, LinkError};

use crate::links::{LinkNotice, LinkOutcome};
use crate::protocol::{IceCandidate, SessionSettings};

/// Processing flags requested from the capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl From<&SessionSettings> for CaptureConstraints {
    fn from(settings: &SessionSettings) -> Self {
        Self {
            echo_cancellation: settings.echo_cancellation,
            noise_suppression: settings.noise_suppression,
            auto_gain_control: settings.auto_gain_control,
        }
    }
}

/// The local outgoing audio track.
///
/// One track is shared by every peer link, so enabling or disabling it
/// affects all links at once.
pub trait CaptureTrack: Send + Sync {
    fn set_enabled(&self, enabled: bool);
    fn is_enabled(&self) -> bool;
    /// Release the underlying device. Further reads yield silence.
    fn stop(&self);
    /// Fill `bins` with frequency-domain magnitudes of the current frame.
    fn read_frequency_data(&self, bins: &mut [u8]);
}

/// Acquires the local capture track.
#[async_trait]
pub trait AudioCapture: Send + Sync {
    async fn acquire(
        &self,
        constraints: CaptureConstraints,
    ) -> Result<Arc<dyn CaptureTrack>, CaptureError>;
}

/// Inbound audio from one remote peer.
pub trait RemoteAudio: Send + Sync {
    fn read_frequency_data(&self, bins: &mut [u8]);
    fn set_playback_muted(&self, muted: bool);
}

/// Things a transport reports on its own initiative.
pub enum TransportEvent {
    /// A local connectivity candidate to forward to the peer.
    LocalCandidate(IceCandidate),
    /// The peer's audio arrived and is ready for playback.
    RemoteAudio(Arc<dyn RemoteAudio>),
    /// The link is unusable.
    Failed(LinkError),
}

impl fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportEvent::LocalCandidate(c) => f.debug_tuple("LocalCandidate").field(c).finish(),
            TransportEvent::RemoteAudio(_) => f.write_str("RemoteAudio(..)"),
            TransportEvent::Failed(e) => f.debug_tuple("Failed").field(e).finish(),
        }
    }
}

/// Sink handed to each transport for reporting [`TransportEvent`]s.
///
/// Events are tagged with the link generation they belong to, so anything a
/// torn-down transport emits late is ignored.
#[derive(Clone)]
pub struct TransportEvents {
    peer_id: String,
    generation: u64,
    tx: mpsc::UnboundedSender<LinkNotice>,
}

impl TransportEvents {
    pub(crate) fn new(
        peer_id: String,
        generation: u64,
        tx: mpsc::UnboundedSender<LinkNotice>,
    ) -> Self {
        Self {
            peer_id,
            generation,
            tx,
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Report an event. Returns `false` once the coordinator is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(LinkNotice {
                peer_id: self.peer_id.clone(),
                generation: self.generation,
                outcome: LinkOutcome::Transport(event),
            })
            .is_ok()
    }
}

/// One negotiated media link to a remote peer.
///
/// Operations are invoked one at a time, in the order the coordinator
/// received the corresponding signaling messages.
#[async_trait]
pub trait PeerTransport: Send {
    async fn attach_local_track(&mut self, track: Arc<dyn CaptureTrack>) -> Result<(), LinkError>;
    /// Produce an offer description (offering side).
    async fn create_offer(&mut self) -> Result<String, LinkError>;
    /// Apply a remote offer and produce the answer description.
    async fn accept_offer(&mut self, sdp: String) -> Result<String, LinkError>;
    async fn accept_answer(&mut self, sdp: String) -> Result<(), LinkError>;
    async fn add_remote_candidate(&mut self, candidate: IceCandidate) -> Result<(), LinkError>;
    /// Current round-trip time, or `None` when no measurement is available.
    async fn round_trip_time(&mut self) -> Result<Option<Duration>, LinkError>;
    async fn close(&mut self);
}

/// Creates transports for new peer links.
pub trait TransportFactory: Send + Sync {
    fn create(&self, peer_id: &str, events: TransportEvents) -> Box<dyn PeerTransport>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxmesh_config::schema::VoiceConfig;

    #[test]
    fn constraints_follow_session_settings() {
        let mut settings = SessionSettings::from(&VoiceConfig::default());
        settings.echo_cancellation = false;
        let constraints = CaptureConstraints::from(&settings);
        assert!(!constraints.echo_cancellation);
        assert!(constraints.noise_suppression);
        assert!(constraints.auto_gain_control);
    }

    #[test]
    fn transport_events_are_tagged_with_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let events = TransportEvents::new("peer-a".into(), 7, tx);
        assert!(events.emit(TransportEvent::Failed(LinkError::Closed)));

        let notice = rx.try_recv().unwrap();
        assert_eq!(notice.peer_id, "peer-a");
        assert_eq!(notice.generation, 7);
        assert!(matches!(
            notice.outcome,
            LinkOutcome::Transport(TransportEvent::Failed(LinkError::Closed))
        ));

        drop(rx);
        assert!(!events.emit(TransportEvent::Failed(LinkError::Closed)));
    }
}
