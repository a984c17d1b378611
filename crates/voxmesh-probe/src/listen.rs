//! Collaborators for a host with no audio devices.
//!
//! The probe never transmits: capture is always refused, which puts the
//! coordinator in listen-only mode, and links are refused before any media
//! is negotiated. Session state, roster and settings still flow normally.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use voxmesh_common::{CaptureError, LinkError};
use voxmesh_session::media::{
    AudioCapture, CaptureConstraints, CaptureTrack, PeerTransport, TransportEvents,
    TransportFactory,
};
use voxmesh_session::protocol::IceCandidate;

const NO_MEDIA: &str = "probe has no media engine";

pub struct NoMicrophone;

#[async_trait]
impl AudioCapture for NoMicrophone {
    async fn acquire(
        &self,
        _constraints: CaptureConstraints,
    ) -> Result<Arc<dyn CaptureTrack>, CaptureError> {
        Err(CaptureError::PermissionDenied)
    }
}

pub struct SignalingOnly;

impl TransportFactory for SignalingOnly {
    fn create(&self, peer_id: &str, _events: TransportEvents) -> Box<dyn PeerTransport> {
        tracing::debug!(peer_id = %peer_id, "Refusing media link");
        Box::new(RefusedLink)
    }
}

struct RefusedLink;

#[async_trait]
impl PeerTransport for RefusedLink {
    async fn attach_local_track(&mut self, _track: Arc<dyn CaptureTrack>) -> Result<(), LinkError> {
        Ok(())
    }

    async fn create_offer(&mut self) -> Result<String, LinkError> {
        Err(LinkError::Negotiation(NO_MEDIA.into()))
    }

    async fn accept_offer(&mut self, _sdp: String) -> Result<String, LinkError> {
        Err(LinkError::Negotiation(NO_MEDIA.into()))
    }

    async fn accept_answer(&mut self, _sdp: String) -> Result<(), LinkError> {
        Err(LinkError::Negotiation(NO_MEDIA.into()))
    }

    async fn add_remote_candidate(&mut self, _candidate: IceCandidate) -> Result<(), LinkError> {
        Ok(())
    }

    async fn round_trip_time(&mut self) -> Result<Option<Duration>, LinkError> {
        Ok(None)
    }

    async fn close(&mut self) {}
}
