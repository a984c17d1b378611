//! Peer link lifecycle: creation, negotiation routing and teardown.
//!
//! Links live inside the [`PeerRegistry`]; this manager only decides when
//! to create them and which queued operation a signaling message becomes.

mod link;

pub use link::PeerLink;
pub(crate) use link::{LinkNotice, LinkOp, LinkOutcome};

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::media::TransportFactory;
use crate::protocol::IceCandidate;
use crate::registry::PeerRegistry;

/// How an inbound offer was routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OfferRoute {
    /// A new answering-side link was created. `placeholder` is set when the
    /// sender was unknown and a participant entry was created for it.
    Created { placeholder: bool },
    /// The offer renegotiates an existing link.
    Existing,
}

pub(crate) struct PeerLinkManager {
    factory: Arc<dyn TransportFactory>,
    notices: mpsc::UnboundedSender<LinkNotice>,
    next_generation: u64,
}

impl PeerLinkManager {
    pub(crate) fn new(
        factory: Arc<dyn TransportFactory>,
        notices: mpsc::UnboundedSender<LinkNotice>,
    ) -> Self {
        Self {
            factory,
            notices,
            next_generation: 0,
        }
    }

    fn spawn_link(&mut self, registry: &PeerRegistry, peer_id: &str) -> PeerLink {
        self.next_generation += 1;
        let link = PeerLink::spawn(
            peer_id,
            self.next_generation,
            self.factory.as_ref(),
            self.notices.clone(),
        );
        if let Some(track) = registry.capture() {
            link.send(LinkOp::AttachLocal(Arc::clone(track)));
        }
        link
    }

    /// Create an offering-side link to a known participant.
    ///
    /// Returns `false` when the peer is unknown or already has a link.
    pub(crate) fn initiate(&mut self, registry: &mut PeerRegistry, peer_id: &str) -> bool {
        if !registry.contains_peer(peer_id) || registry.has_link(peer_id) {
            return false;
        }
        let link = self.spawn_link(registry, peer_id);
        link.send(LinkOp::CreateOffer);
        registry.set_link(peer_id, link);
        true
    }

    /// Route an inbound offer, creating the answering side when needed.
    pub(crate) fn accept_offer(
        &mut self,
        registry: &mut PeerRegistry,
        peer_id: &str,
        sdp: String,
    ) -> OfferRoute {
        if let Some(link) = registry.link(peer_id) {
            link.send(LinkOp::AcceptOffer(sdp));
            return OfferRoute::Existing;
        }
        let placeholder = registry.ensure_placeholder(peer_id);
        let link = self.spawn_link(registry, peer_id);
        link.send(LinkOp::AcceptOffer(sdp));
        registry.set_link(peer_id, link);
        OfferRoute::Created { placeholder }
    }

    /// Apply an answer to an existing link. Unknown peers are ignored.
    pub(crate) fn accept_answer(&self, registry: &PeerRegistry, peer_id: &str, sdp: String) -> bool {
        match registry.link(peer_id) {
            Some(link) => link.send(LinkOp::AcceptAnswer(sdp)),
            None => {
                debug!(peer = %peer_id, "answer for unknown peer dropped");
                false
            }
        }
    }

    /// Apply a remote candidate to an existing link. Unknown peers are ignored.
    pub(crate) fn add_candidate(
        &self,
        registry: &PeerRegistry,
        peer_id: &str,
        candidate: IceCandidate,
    ) -> bool {
        match registry.link(peer_id) {
            Some(link) => link.send(LinkOp::AddCandidate(candidate)),
            None => {
                debug!(peer = %peer_id, "candidate for unknown peer dropped");
                false
            }
        }
    }

    /// Close one link and clear its level and quality entries.
    pub(crate) fn teardown(&self, registry: &mut PeerRegistry, peer_id: &str) -> bool {
        match registry.take_link(peer_id) {
            Some(link) => {
                link.close();
                true
            }
            None => false,
        }
    }

    /// Ask every link for a statistics sample.
    pub(crate) fn poll_stats(&self, registry: &PeerRegistry) -> usize {
        registry
            .links()
            .filter(|link| link.send(LinkOp::PollStats))
            .count()
    }
}
