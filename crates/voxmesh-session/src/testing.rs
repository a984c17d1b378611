//! Scripted collaborators for coordinator tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use voxmesh_common::{CaptureError, LinkError, SignalingError};

use crate::media::{
    AudioCapture, CaptureConstraints, CaptureTrack, PeerTransport, RemoteAudio, TransportEvent,
    TransportEvents, TransportFactory,
};
use crate::protocol::{IceCandidate, InboundMessage, OutboundMessage};
use crate::signaling::{SignalingChannel, Subscription};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap()
}

// ---------------------------------------------------------------------------
// Signaling
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ChannelState {
    sent: Vec<(Instant, OutboundMessage)>,
    subscriber: Option<(u64, mpsc::Sender<InboundMessage>)>,
    next_token: u64,
    subscribes: usize,
    releases: usize,
    join_replies: VecDeque<InboundMessage>,
    fail_sends: bool,
}

/// Records outbound messages and answers joins from a script.
#[derive(Clone, Default)]
pub(crate) struct MockChannel(Arc<Mutex<ChannelState>>);

impl MockChannel {
    /// Queue the server's answer to the next `join`.
    pub(crate) fn reply_to_join(&self, reply: InboundMessage) {
        lock(&self.0).join_replies.push_back(reply);
    }

    /// Deliver an inbound event to the current subscriber.
    pub(crate) fn inject(&self, msg: InboundMessage) {
        let state = lock(&self.0);
        let (_, tx) = state.subscriber.as_ref().expect("no active subscription");
        tx.try_send(msg).expect("subscription buffer full");
    }

    pub(crate) fn set_fail_sends(&self, fail: bool) {
        lock(&self.0).fail_sends = fail;
    }

    pub(crate) fn sent(&self) -> Vec<OutboundMessage> {
        lock(&self.0).sent.iter().map(|(_, m)| m.clone()).collect()
    }

    pub(crate) fn count(&self, pred: impl Fn(&OutboundMessage) -> bool) -> usize {
        lock(&self.0).sent.iter().filter(|(_, m)| pred(m)).count()
    }

    /// When each `join` went out.
    pub(crate) fn join_times(&self) -> Vec<Instant> {
        lock(&self.0)
            .sent
            .iter()
            .filter(|(_, m)| matches!(m, OutboundMessage::Join { .. }))
            .map(|(at, _)| *at)
            .collect()
    }

    pub(crate) fn subscribes(&self) -> usize {
        lock(&self.0).subscribes
    }

    pub(crate) fn releases(&self) -> usize {
        lock(&self.0).releases
    }
}

#[async_trait]
impl SignalingChannel for MockChannel {
    async fn send(&self, message: OutboundMessage) -> Result<(), SignalingError> {
        let mut state = lock(&self.0);
        if state.fail_sends {
            return Err(SignalingError::SendFailed("mock channel down".into()));
        }
        let is_join = matches!(message, OutboundMessage::Join { .. });
        state.sent.push((Instant::now(), message));
        if is_join {
            if let Some(reply) = state.join_replies.pop_front() {
                if let Some((_, tx)) = &state.subscriber {
                    let _ = tx.try_send(reply);
                }
            }
        }
        Ok(())
    }

    fn subscribe(&self, room_id: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(64);
        let token = {
            let mut state = lock(&self.0);
            state.next_token += 1;
            state.subscribes += 1;
            state.subscriber = Some((state.next_token, tx));
            state.next_token
        };
        let inner = Arc::clone(&self.0);
        Subscription::new(room_id, rx, move || {
            let mut state = lock(&inner);
            state.releases += 1;
            if state.subscriber.as_ref().is_some_and(|(t, _)| *t == token) {
                state.subscriber = None;
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct MockTrack {
    enabled: AtomicBool,
    stopped: AtomicBool,
    level: AtomicU8,
}

impl MockTrack {
    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub(crate) fn set_level(&self, bin_value: u8) {
        self.level.store(bin_value, Ordering::SeqCst);
    }
}

impl CaptureTrack for MockTrack {
    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn read_frequency_data(&self, bins: &mut [u8]) {
        let value = if self.is_stopped() {
            0
        } else {
            self.level.load(Ordering::SeqCst)
        };
        bins.fill(value);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CaptureScript {
    Grant,
    Deny,
}

pub(crate) struct MockCapture {
    script: Mutex<CaptureScript>,
    delay: Mutex<Duration>,
    acquisitions: AtomicUsize,
    tracks: Mutex<Vec<Arc<MockTrack>>>,
    last_constraints: Mutex<Option<CaptureConstraints>>,
}

impl MockCapture {
    pub(crate) fn new(script: CaptureScript) -> Self {
        Self {
            script: Mutex::new(script),
            delay: Mutex::new(Duration::ZERO),
            acquisitions: AtomicUsize::new(0),
            tracks: Mutex::new(Vec::new()),
            last_constraints: Mutex::new(None),
        }
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = delay;
    }

    pub(crate) fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub(crate) fn tracks(&self) -> Vec<Arc<MockTrack>> {
        lock(&self.tracks).clone()
    }

    pub(crate) fn last_constraints(&self) -> Option<CaptureConstraints> {
        *lock(&self.last_constraints)
    }
}

#[async_trait]
impl AudioCapture for MockCapture {
    async fn acquire(
        &self,
        constraints: CaptureConstraints,
    ) -> Result<Arc<dyn CaptureTrack>, CaptureError> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_constraints) = Some(constraints);
        let delay = *lock(&self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let script = *lock(&self.script);
        match script {
            CaptureScript::Grant => {
                let track = Arc::new(MockTrack::default());
                lock(&self.tracks).push(Arc::clone(&track));
                Ok(track)
            }
            CaptureScript::Deny => Err(CaptureError::PermissionDenied),
        }
    }
}

/// Whether an attached track is the given mock track.
pub(crate) fn same_track(attached: &Arc<dyn CaptureTrack>, track: &Arc<MockTrack>) -> bool {
    Arc::as_ptr(attached) as *const () == Arc::as_ptr(track) as *const ()
}

// ---------------------------------------------------------------------------
// Transports
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct LinkRecord {
    pub(crate) attached: Vec<Arc<dyn CaptureTrack>>,
    pub(crate) offers_created: usize,
    pub(crate) offers_accepted: Vec<String>,
    pub(crate) answers_accepted: Vec<String>,
    pub(crate) candidates: Vec<IceCandidate>,
    pub(crate) closed: bool,
}

struct CreatedLink {
    peer_id: String,
    events: TransportEvents,
    record: Arc<Mutex<LinkRecord>>,
}

#[derive(Default)]
struct FactoryState {
    links: Vec<CreatedLink>,
    rtt: HashMap<String, Option<Duration>>,
    failing_offers: HashSet<String>,
}

#[derive(Clone, Default)]
pub(crate) struct MockTransportFactory(Arc<Mutex<FactoryState>>);

impl MockTransportFactory {
    pub(crate) fn created(&self) -> usize {
        lock(&self.0).links.len()
    }

    /// Records of every transport created for `peer_id`, oldest first.
    pub(crate) fn records(&self, peer_id: &str) -> Vec<Arc<Mutex<LinkRecord>>> {
        lock(&self.0)
            .links
            .iter()
            .filter(|l| l.peer_id == peer_id)
            .map(|l| Arc::clone(&l.record))
            .collect()
    }

    pub(crate) fn all_records(&self) -> Vec<Arc<Mutex<LinkRecord>>> {
        lock(&self.0)
            .links
            .iter()
            .map(|l| Arc::clone(&l.record))
            .collect()
    }

    /// Emit a transport event from the newest transport for `peer_id`.
    pub(crate) fn emit(&self, peer_id: &str, event: TransportEvent) {
        let events = lock(&self.0)
            .links
            .iter()
            .rev()
            .find(|l| l.peer_id == peer_id)
            .map(|l| l.events.clone())
            .expect("no transport for peer");
        events.emit(event);
    }

    pub(crate) fn set_rtt(&self, peer_id: &str, rtt: Option<Duration>) {
        lock(&self.0).rtt.insert(peer_id.to_string(), rtt);
    }

    pub(crate) fn fail_offers_to(&self, peer_id: &str) {
        lock(&self.0).failing_offers.insert(peer_id.to_string());
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(&self, peer_id: &str, events: TransportEvents) -> Box<dyn PeerTransport> {
        let record = Arc::new(Mutex::new(LinkRecord::default()));
        lock(&self.0).links.push(CreatedLink {
            peer_id: peer_id.to_string(),
            events,
            record: Arc::clone(&record),
        });
        Box::new(MockTransport {
            peer_id: peer_id.to_string(),
            record,
            factory: Arc::clone(&self.0),
        })
    }
}

struct MockTransport {
    peer_id: String,
    record: Arc<Mutex<LinkRecord>>,
    factory: Arc<Mutex<FactoryState>>,
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn attach_local_track(&mut self, track: Arc<dyn CaptureTrack>) -> Result<(), LinkError> {
        lock(&self.record).attached.push(track);
        Ok(())
    }

    async fn create_offer(&mut self) -> Result<String, LinkError> {
        if lock(&self.factory).failing_offers.contains(&self.peer_id) {
            return Err(LinkError::Negotiation("offer rejected".into()));
        }
        lock(&self.record).offers_created += 1;
        Ok(format!("offer-to-{}", self.peer_id))
    }

    async fn accept_offer(&mut self, sdp: String) -> Result<String, LinkError> {
        lock(&self.record).offers_accepted.push(sdp);
        Ok(format!("answer-to-{}", self.peer_id))
    }

    async fn accept_answer(&mut self, sdp: String) -> Result<(), LinkError> {
        lock(&self.record).answers_accepted.push(sdp);
        Ok(())
    }

    async fn add_remote_candidate(&mut self, candidate: IceCandidate) -> Result<(), LinkError> {
        lock(&self.record).candidates.push(candidate);
        Ok(())
    }

    async fn round_trip_time(&mut self) -> Result<Option<Duration>, LinkError> {
        Ok(lock(&self.factory)
            .rtt
            .get(&self.peer_id)
            .copied()
            .flatten())
    }

    async fn close(&mut self) {
        lock(&self.record).closed = true;
    }
}

// ---------------------------------------------------------------------------
// Remote audio
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct MockRemoteAudio {
    level: AtomicU8,
    playback_muted: AtomicBool,
}

impl MockRemoteAudio {
    pub(crate) fn with_level(bin_value: u8) -> Arc<Self> {
        let audio = Arc::new(Self::default());
        audio.set_level(bin_value);
        audio
    }

    pub(crate) fn set_level(&self, bin_value: u8) {
        self.level.store(bin_value, Ordering::SeqCst);
    }

    pub(crate) fn is_playback_muted(&self) -> bool {
        self.playback_muted.load(Ordering::SeqCst)
    }
}

impl RemoteAudio for MockRemoteAudio {
    fn read_frequency_data(&self, bins: &mut [u8]) {
        bins.fill(self.level.load(Ordering::SeqCst));
    }

    fn set_playback_muted(&self, muted: bool) {
        self.playback_muted.store(muted, Ordering::SeqCst);
    }
}
