//! One peer link and the task that drives its transport.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};
use voxmesh_common::LinkError;

use crate::media::{CaptureTrack, PeerTransport, TransportEvent, TransportEvents, TransportFactory};
use crate::protocol::IceCandidate;

/// Work queued for a link's transport, applied strictly in order.
pub(crate) enum LinkOp {
    AttachLocal(Arc<dyn CaptureTrack>),
    CreateOffer,
    AcceptOffer(String),
    AcceptAnswer(String),
    AddCandidate(IceCandidate),
    PollStats,
}

impl fmt::Debug for LinkOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LinkOp::AttachLocal(_) => "AttachLocal",
            LinkOp::CreateOffer => "CreateOffer",
            LinkOp::AcceptOffer(_) => "AcceptOffer",
            LinkOp::AcceptAnswer(_) => "AcceptAnswer",
            LinkOp::AddCandidate(_) => "AddCandidate",
            LinkOp::PollStats => "PollStats",
        })
    }
}

/// Result of a link operation or an unsolicited transport event.
#[derive(Debug)]
pub(crate) enum LinkOutcome {
    OfferReady(String),
    AnswerReady(String),
    Rtt(Option<Duration>),
    Failed(LinkError),
    Transport(TransportEvent),
}

/// Message from a link task back to the coordinator.
#[derive(Debug)]
pub(crate) struct LinkNotice {
    pub(crate) peer_id: String,
    pub(crate) generation: u64,
    pub(crate) outcome: LinkOutcome,
}

/// Handle to a running link. Dropping it closes the transport.
pub struct PeerLink {
    peer_id: String,
    generation: u64,
    ops: mpsc::UnboundedSender<LinkOp>,
    closed: Arc<AtomicBool>,
}

impl PeerLink {
    pub(crate) fn spawn(
        peer_id: &str,
        generation: u64,
        factory: &dyn TransportFactory,
        notices: mpsc::UnboundedSender<LinkNotice>,
    ) -> Self {
        let events = TransportEvents::new(peer_id.to_string(), generation, notices.clone());
        let transport = factory.create(peer_id, events);
        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(run_link(
            peer_id.to_string(),
            generation,
            transport,
            ops_rx,
            notices,
            Arc::clone(&closed),
        ));
        debug!(peer = %peer_id, generation, "peer link created");

        Self {
            peer_id: peer_id.to_string(),
            generation,
            ops: ops_tx,
            closed,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue an operation. Returns `false` if the link task has ended.
    pub(crate) fn send(&self, op: LinkOp) -> bool {
        self.ops.send(op).is_ok()
    }

    pub(crate) fn close(self) {
        debug!(peer = %self.peer_id, generation = self.generation, "closing peer link");
    }
}

impl fmt::Debug for PeerLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerLink")
            .field("peer_id", &self.peer_id)
            .field("generation", &self.generation)
            .finish()
    }
}

impl Drop for PeerLink {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

async fn run_link(
    peer_id: String,
    generation: u64,
    mut transport: Box<dyn PeerTransport>,
    mut ops: mpsc::UnboundedReceiver<LinkOp>,
    notices: mpsc::UnboundedSender<LinkNotice>,
    closed: Arc<AtomicBool>,
) {
    while let Some(op) = ops.recv().await {
        if closed.load(Ordering::SeqCst) {
            break;
        }
        debug!(peer = %peer_id, generation, op = ?op, "link op");

        let outcome = match op {
            LinkOp::AttachLocal(track) => transport
                .attach_local_track(track)
                .await
                .err()
                .map(LinkOutcome::Failed),
            LinkOp::CreateOffer => Some(match transport.create_offer().await {
                Ok(sdp) => LinkOutcome::OfferReady(sdp),
                Err(e) => LinkOutcome::Failed(e),
            }),
            LinkOp::AcceptOffer(sdp) => Some(match transport.accept_offer(sdp).await {
                Ok(answer) => LinkOutcome::AnswerReady(answer),
                Err(e) => LinkOutcome::Failed(e),
            }),
            LinkOp::AcceptAnswer(sdp) => transport
                .accept_answer(sdp)
                .await
                .err()
                .map(LinkOutcome::Failed),
            LinkOp::AddCandidate(candidate) => {
                if let Err(e) = transport.add_remote_candidate(candidate).await {
                    warn!(peer = %peer_id, error = %e, "remote candidate rejected");
                }
                None
            }
            LinkOp::PollStats => Some(LinkOutcome::Rtt(match transport.round_trip_time().await {
                Ok(rtt) => rtt,
                Err(e) => {
                    debug!(peer = %peer_id, error = %e, "stats unavailable");
                    None
                }
            })),
        };

        if let Some(outcome) = outcome {
            let failed = matches!(outcome, LinkOutcome::Failed(_));
            let notice = LinkNotice {
                peer_id: peer_id.clone(),
                generation,
                outcome,
            };
            if notices.send(notice).is_err() || failed {
                break;
            }
        }
    }

    transport.close().await;
    debug!(peer = %peer_id, generation, "peer link closed");
}
