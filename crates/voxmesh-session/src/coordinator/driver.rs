//! The coordinator task and its event handlers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};
use voxmesh_common::{
    CaptureError, LinkError, Notification, NotificationQueue, SessionId, VoiceError,
};
use voxmesh_config::VoxmeshConfig;

use super::types::{
    Command, CoordinatorSnapshot, LocalIdentity, RoomContext, SessionInfo, VoiceEvent, VoiceState,
};
use super::Collaborators;
use crate::activity::{rank_participants, AudioActivityMonitor};
use crate::links::{LinkNotice, LinkOp, LinkOutcome, OfferRoute, PeerLinkManager};
use crate::media::{AudioCapture, CaptureConstraints, CaptureTrack, TransportEvent};
use crate::protocol::{InboundMessage, OutboundMessage, SessionSettings, VoiceSignal};
use crate::quality::QualityMonitor;
use crate::reconnect::{FailureKind, ReconnectionPolicy, RetryDecision};
use crate::registry::{ParticipantView, PeerRegistry, Upsert};
use crate::signaling::{SignalingChannel, Subscription};
use crate::timer::TimerSlot;

const NOTIFICATION_CAPACITY: usize = 16;

/// Results that spawned work and timers post back to the coordinator.
pub(crate) enum Internal {
    CaptureReady {
        epoch: u64,
        result: Result<Arc<dyn CaptureTrack>, CaptureError>,
    },
    RetryFired(u64),
    FastRetryFired(u64),
    WatchdogFired(u64),
    AutoJoinFired(u64),
    SampleTick(u64),
    StatsTick(u64),
}

/// Receiving ends of the coordinator's internal queues.
pub(crate) struct Inbox {
    internal: mpsc::UnboundedReceiver<Internal>,
    notices: mpsc::UnboundedReceiver<LinkNotice>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinOrigin {
    Explicit,
    AutoJoin,
    Retry,
    Watchdog,
}

impl JoinOrigin {
    fn is_retry(self) -> bool {
        matches!(self, JoinOrigin::Retry | JoinOrigin::Watchdog)
    }
}

pub(crate) struct Driver {
    config: VoxmeshConfig,
    identity: LocalIdentity,
    channel: Arc<dyn SignalingChannel>,
    capture: Arc<dyn AudioCapture>,
    events: mpsc::Sender<VoiceEvent>,
    internal: mpsc::UnboundedSender<Internal>,

    state: VoiceState,
    /// Room the user occupies according to the lobby.
    room: Option<RoomContext>,
    /// Room we are joined to or joining.
    active_room: Option<String>,
    session_id: Option<SessionId>,
    self_peer_id: Option<String>,
    settings: SessionSettings,
    owned_session: Option<String>,
    subscription: Option<Subscription>,

    registry: PeerRegistry,
    links: PeerLinkManager,
    policy: ReconnectionPolicy,
    activity: AudioActivityMonitor,
    quality: QualityMonitor,

    retry_timer: TimerSlot,
    fast_retry_timer: TimerSlot,
    watchdog: TimerSlot,
    auto_join_timer: TimerSlot,

    join_epoch: u64,
    join_in_flight: bool,
    muted: bool,
    deafened: bool,
    auto_join_attempted: bool,
    watchdog_spent: bool,
    notifications: NotificationQueue,
    /// Latest state change that did not fit in the event queue.
    undelivered_state: Option<VoiceState>,
}

impl Driver {
    pub(crate) fn new(
        config: VoxmeshConfig,
        identity: LocalIdentity,
        collaborators: Collaborators,
        events: mpsc::Sender<VoiceEvent>,
    ) -> (Self, Inbox) {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let muted = config.voice.start_muted;

        let driver = Self {
            registry: PeerRegistry::new(&identity.user_id, &identity.username, muted),
            links: PeerLinkManager::new(collaborators.transports, notice_tx),
            policy: ReconnectionPolicy::new(&config.retry),
            activity: AudioActivityMonitor::new(&config.activity),
            quality: QualityMonitor::new(&config.quality),
            settings: SessionSettings::from(&config.voice),
            channel: collaborators.signaling,
            capture: collaborators.capture,
            events,
            internal: internal_tx,
            state: VoiceState::Disconnected,
            room: None,
            active_room: None,
            session_id: None,
            self_peer_id: None,
            owned_session: None,
            subscription: None,
            retry_timer: TimerSlot::new("retry"),
            fast_retry_timer: TimerSlot::new("fast-retry"),
            watchdog: TimerSlot::new("watchdog"),
            auto_join_timer: TimerSlot::new("auto-join"),
            join_epoch: 0,
            join_in_flight: false,
            muted,
            deafened: false,
            auto_join_attempted: false,
            watchdog_spent: false,
            notifications: NotificationQueue::new(NOTIFICATION_CAPACITY),
            undelivered_state: None,
            config,
            identity,
        };
        let inbox = Inbox {
            internal: internal_rx,
            notices: notice_rx,
        };
        (driver, inbox)
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::Receiver<Command>, mut inbox: Inbox) {
        info!(user_id = %self.identity.user_id, "Voice coordinator started");
        loop {
            self.flush_state();
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        self.shutdown().await;
                        break;
                    };
                    if !self.handle_command(command).await {
                        break;
                    }
                }
                inbound = next_inbound(&mut self.subscription) => match inbound {
                    Some(msg) => self.handle_inbound(msg).await,
                    None => self.on_subscription_closed(),
                },
                Some(internal) = inbox.internal.recv() => self.handle_internal(internal).await,
                Some(notice) = inbox.notices.recv() => self.handle_link_notice(notice).await,
            }
        }
        info!("Voice coordinator stopped");
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::AttachRoom { room, reply } => {
                self.attach_room(room).await;
                let _ = reply.send(());
            }
            Command::StartSession {
                room_id,
                settings,
                reply,
            } => {
                let result = self.start_session(room_id, settings).await;
                let _ = reply.send(result);
            }
            Command::Join { room_id, reply } => {
                self.begin_join(room_id, JoinOrigin::Explicit).await;
                let _ = reply.send(());
            }
            Command::Leave { room_id, reply } => {
                self.leave(&room_id).await;
                let _ = reply.send(());
            }
            Command::ToggleMute { reply } => {
                let muted = self.toggle_mute().await;
                let _ = reply.send(muted);
            }
            Command::ToggleDeafen { reply } => {
                let deafened = self.toggle_deafen().await;
                let _ = reply.send(deafened);
            }
            Command::State { reply } => {
                let _ = reply.send(self.state);
            }
            Command::Participants { mini, reply } => {
                let _ = reply.send(self.ranked_participants(mini));
            }
            Command::Session { reply } => {
                let _ = reply.send(self.session_info());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::DrainNotifications { reply } => {
                let _ = reply.send(self.notifications.drain_visible());
            }
            Command::Shutdown { reply } => {
                self.shutdown().await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    async fn attach_room(&mut self, room: RoomContext) {
        if let Some(active) = self.active_room.clone() {
            if active != room.room_id {
                info!(from = %active, to = %room.room_id, "Switching rooms");
                self.leave(&active).await;
            }
        }

        self.install_room(room);

        if self.config.auto_join.enabled
            && !self.auto_join_attempted
            && !self.join_in_flight
            && self.state != VoiceState::Connected
        {
            self.auto_join_attempted = true;
            let delay = Duration::from_millis(self.config.auto_join.initial_delay_ms);
            self.auto_join_timer
                .schedule(delay, &self.internal, Internal::AutoJoinFired);
        }
        if self.state == VoiceState::Disconnected {
            self.arm_watchdog();
        }
    }

    /// Make `room` the attached context. Per-room bookkeeping resets when the room changes.
    fn install_room(&mut self, room: RoomContext) {
        let same_room = self
            .room
            .as_ref()
            .is_some_and(|r| r.room_id == room.room_id);
        if !same_room {
            self.subscription = None;
            self.auto_join_attempted = false;
            self.watchdog_spent = false;
        }
        debug!(room = %room.room_id, host = ?room.host_user_id, "Room attached");
        let room_id = room.room_id.clone();
        self.room = Some(room);
        self.ensure_subscription(&room_id);
    }

    async fn start_session(
        &mut self,
        room_id: String,
        settings: SessionSettings,
    ) -> Result<(), VoiceError> {
        if self.owned_session.as_deref() == Some(room_id.as_str()) {
            debug!(room = %room_id, "Session already owned, start skipped");
            return Ok(());
        }

        if let Some(active) = self.active_room.clone() {
            if active != room_id {
                self.leave(&active).await;
            }
        }
        let room = match self.room.clone() {
            Some(mut room) if room.room_id == room_id => {
                room.host_user_id
                    .get_or_insert_with(|| self.identity.user_id.clone());
                room
            }
            _ => RoomContext::new(room_id.clone()).with_host(self.identity.user_id.clone()),
        };
        self.install_room(room);
        if self.state == VoiceState::Disconnected {
            self.arm_watchdog();
        }

        self.channel
            .send(OutboundMessage::Start {
                room_id: room_id.clone(),
                settings: settings.clone(),
            })
            .await?;

        info!(room = %room_id, quality = ?settings.audio_quality, "Voice session start requested");
        self.owned_session = Some(room_id);
        if self.settings != settings {
            self.settings = settings;
            self.emit(VoiceEvent::SettingsChanged(self.settings.clone()));
        }
        Ok(())
    }

    async fn begin_join(&mut self, room_id: String, origin: JoinOrigin) {
        if self.active_room.as_deref() == Some(room_id.as_str())
            && (self.join_in_flight || self.state == VoiceState::Connected)
        {
            debug!(room = %room_id, origin = ?origin, "Join already in progress");
            return;
        }

        if let Some(active) = self.active_room.clone() {
            if active != room_id {
                info!(from = %active, to = %room_id, "Switching rooms");
                self.leave(&active).await;
            }
        }
        if !self.room.as_ref().is_some_and(|r| r.room_id == room_id) {
            self.subscription = None;
            self.room = Some(RoomContext::new(room_id.clone()));
        }
        self.ensure_subscription(&room_id);

        self.cancel_timers();
        if origin == JoinOrigin::Explicit {
            self.policy.on_success();
        }
        self.active_room = Some(room_id.clone());
        self.join_in_flight = true;
        self.join_epoch += 1;
        info!(room = %room_id, origin = ?origin, attempt = self.policy.attempt_count(), "Joining voice session");
        self.set_state(if origin.is_retry() {
            VoiceState::Reconnecting
        } else {
            VoiceState::Connecting
        });

        if self.registry.capture().is_some() {
            self.send_join().await;
            return;
        }

        let capture = Arc::clone(&self.capture);
        let constraints = CaptureConstraints::from(&self.settings);
        let epoch = self.join_epoch;
        let tx = self.internal.clone();
        tokio::spawn(async move {
            let result = capture.acquire(constraints).await;
            let _ = tx.send(Internal::CaptureReady { epoch, result });
        });
    }

    async fn send_join(&mut self) {
        let Some(room_id) = self.active_room.clone() else {
            return;
        };
        if let Err(e) = self.channel.send(OutboundMessage::Join { room_id }).await {
            warn!(error = %e, "Join request not delivered");
            let decision = self.policy.on_failure(FailureKind::Generic);
            self.apply_retry(decision, e.to_string());
        }
    }

    async fn leave(&mut self, room_id: &str) {
        let is_active = self.active_room.as_deref() == Some(room_id);
        let is_attached = self.room.as_ref().is_some_and(|r| r.room_id == room_id);
        if !is_active && !is_attached {
            debug!(room = %room_id, "Leave for a room we are not in");
            return;
        }

        if is_active {
            let msg = OutboundMessage::Leave {
                room_id: room_id.to_string(),
            };
            if let Err(e) = self.channel.send(msg).await {
                warn!(room = %room_id, error = %e, "Leave not delivered, cleaning up locally");
            }
        }
        info!(room = %room_id, "Left voice session");

        self.room = None;
        self.auto_join_attempted = false;
        self.watchdog_spent = false;
        self.policy.on_success();
        self.teardown_session(true);
        self.set_state(VoiceState::Disconnected);
    }

    async fn toggle_mute(&mut self) -> bool {
        self.muted = !self.muted;
        if let Some(track) = self.registry.capture() {
            track.set_enabled(!self.muted);
        }
        self.registry.set_local_muted(self.muted);
        info!(muted = self.muted, "Local mute toggled");

        if let Some(room_id) = self.active_room.clone() {
            let msg = OutboundMessage::MuteToggle {
                room_id,
                is_muted: self.muted,
            };
            if let Err(e) = self.channel.send(msg).await {
                warn!(error = %e, "Mute state not broadcast");
            }
        }
        self.emit(VoiceEvent::LocalMuteChanged(self.muted));
        self.muted
    }

    async fn toggle_deafen(&mut self) -> bool {
        self.deafened = !self.deafened;
        for audio in self.registry.remote_audio() {
            audio.set_playback_muted(self.deafened);
        }
        info!(deafened = self.deafened, "Local deafen toggled");

        if let Some(room_id) = self.active_room.clone() {
            let msg = OutboundMessage::DeafenToggle {
                room_id,
                is_deafened: self.deafened,
            };
            if let Err(e) = self.channel.send(msg).await {
                warn!(error = %e, "Deafen state not broadcast");
            }
        }
        self.emit(VoiceEvent::LocalDeafenChanged(self.deafened));
        self.deafened
    }

    async fn shutdown(&mut self) {
        let room = self
            .active_room
            .clone()
            .or_else(|| self.room.as_ref().map(|r| r.room_id.clone()));
        if let Some(room_id) = room {
            self.leave(&room_id).await;
        }
        self.teardown_session(true);
    }

    // -----------------------------------------------------------------------
    // Inbound signaling
    // -----------------------------------------------------------------------

    async fn handle_inbound(&mut self, msg: InboundMessage) {
        debug!(event = msg.name(), "Inbound voice event");
        match msg {
            InboundMessage::VoiceStarted {
                session_id,
                host,
                settings,
            } => {
                let Some(room) = self.room.as_mut() else {
                    return;
                };
                if host.is_some() {
                    room.host_user_id = host.clone();
                }
                if host.as_deref() == Some(self.identity.user_id.as_str()) {
                    self.owned_session = Some(room.room_id.clone());
                }
                if self.self_peer_id.is_none() {
                    self.session_id = Some(session_id.clone());
                }
                info!(session = %session_id, host = ?host, "Voice session started");
                self.emit(VoiceEvent::SessionStarted {
                    session_id,
                    host_user_id: host,
                });
                if self.settings.apply(&settings) {
                    self.emit(VoiceEvent::SettingsChanged(self.settings.clone()));
                }
            }
            InboundMessage::Joined {
                session_id,
                peer_id,
                roster,
            } => self.on_joined(session_id, peer_id, roster),
            InboundMessage::Left { room_id } => {
                let Some(active) = self.active_room.clone() else {
                    return;
                };
                if room_id.as_deref().is_some_and(|r| r != active) {
                    return;
                }
                info!(room = %active, "Removed from voice session by server");
                self.teardown_session(false);
                self.set_state(VoiceState::Disconnected);
            }
            InboundMessage::ParticipantJoined {
                user_id,
                username,
                peer_id,
            } => {
                if self.active_room.is_none() || self.is_self(&user_id, &peer_id) {
                    return;
                }
                self.upsert_participant(&user_id, &username, &peer_id, None);
            }
            InboundMessage::ParticipantLeft { user_id, .. } => {
                match self.registry.remove_user(&user_id) {
                    Some((participant, link)) => {
                        if let Some(link) = link {
                            link.close();
                        }
                        info!(user_id = %participant.user_id, username = %participant.username, "Participant left");
                        self.emit(VoiceEvent::ParticipantLeft {
                            user_id: participant.user_id,
                            username: participant.username,
                        });
                        self.sync_sampling();
                    }
                    None => debug!(user_id = %user_id, "Leave for unknown participant ignored"),
                }
            }
            InboundMessage::MuteChanged { user_id, is_muted } => {
                if user_id == self.identity.user_id {
                    return;
                }
                if self.registry.set_muted(&user_id, is_muted) {
                    self.emit(VoiceEvent::MuteChanged { user_id, is_muted });
                }
            }
            InboundMessage::Signal {
                from,
                signal,
                session_id,
            } => self.on_signal(from, signal, session_id),
            InboundMessage::SettingsUpdated {
                settings,
                updated_by,
            } => {
                if self.settings.apply(&settings) {
                    info!(updated_by = ?updated_by, "Session settings updated");
                    self.emit(VoiceEvent::SettingsChanged(self.settings.clone()));
                }
            }
            InboundMessage::AutoJoin { room_id } => {
                let attached = self.room.as_ref().is_some_and(|r| r.room_id == room_id);
                if !attached
                    || !self.config.auto_join.enabled
                    || self.auto_join_attempted
                    || self.join_in_flight
                    || matches!(self.state, VoiceState::Connected | VoiceState::Error)
                {
                    debug!(room = %room_id, "Server auto-join ignored");
                    return;
                }
                self.auto_join_attempted = true;
                let delay = Duration::from_millis(self.config.auto_join.server_trigger_delay_ms);
                self.auto_join_timer
                    .schedule(delay, &self.internal, Internal::AutoJoinFired);
            }
            InboundMessage::Error { message, code } => {
                let relevant = self.join_in_flight
                    || (self.state == VoiceState::Connected && self.active_room.is_some());
                if !relevant {
                    warn!(message = %message, "Voice error outside a join ignored");
                    return;
                }
                let kind = FailureKind::classify(&message, code);
                warn!(message = %message, kind = ?kind, "Voice join failed");
                let decision = self.policy.on_failure(kind);
                self.apply_retry(decision, message);
            }
        }
    }

    fn on_joined(
        &mut self,
        session_id: SessionId,
        peer_id: String,
        roster: Vec<crate::protocol::RosterEntry>,
    ) {
        if self.active_room.is_none() {
            debug!(session = %session_id, "Joined for an inactive room ignored");
            return;
        }
        info!(session = %session_id, peer_id = %peer_id, participants = roster.len(), "Joined voice session");

        let new_session = self.session_id.as_ref() != Some(&session_id);
        self.session_id = Some(session_id.clone());
        self.self_peer_id = Some(peer_id.clone());
        self.join_in_flight = false;
        self.policy.on_success();
        self.cancel_timers();
        self.watchdog_spent = false;

        for entry in &roster {
            if self.is_self(&entry.user_id, &entry.peer_id) {
                continue;
            }
            self.upsert_participant(
                &entry.user_id,
                &entry.username,
                &entry.peer_id,
                Some(entry.is_muted),
            );
        }
        if new_session {
            self.emit(VoiceEvent::SessionStarted {
                session_id,
                host_user_id: self.room.as_ref().and_then(|r| r.host_user_id.clone()),
            });
        }
        self.set_state(VoiceState::Connected);

        for peer in self.registry.peer_ids() {
            if self.links.initiate(&mut self.registry, &peer) {
                debug!(peer_id = %peer, "Offering link");
            }
        }
    }

    fn on_signal(&mut self, from: String, signal: VoiceSignal, session_id: SessionId) {
        if self.session_id.as_ref() != Some(&session_id) {
            debug!(from = %from, session = %session_id, "Signal for stale session discarded");
            return;
        }
        if self.self_peer_id.as_deref() == Some(from.as_str()) {
            return;
        }
        debug!(from = %from, kind = signal.kind(), "Routing signal");
        match signal {
            VoiceSignal::Offer { sdp } => {
                let route = self.links.accept_offer(&mut self.registry, &from, sdp);
                if route == (OfferRoute::Created { placeholder: true }) {
                    self.emit(VoiceEvent::ParticipantJoined {
                        user_id: from.clone(),
                        username: from,
                    });
                }
            }
            VoiceSignal::Answer { sdp } => {
                self.links.accept_answer(&self.registry, &from, sdp);
            }
            VoiceSignal::Candidate(candidate) => {
                self.links.add_candidate(&self.registry, &from, candidate);
            }
        }
    }

    fn on_subscription_closed(&mut self) {
        warn!("Signaling subscription closed");
        self.subscription = None;
        if self.join_in_flight || (self.state == VoiceState::Connected && self.active_room.is_some())
        {
            let decision = self.policy.on_failure(FailureKind::Generic);
            self.apply_retry(decision, "signaling subscription closed".to_string());
        }
    }

    // -----------------------------------------------------------------------
    // Internal events
    // -----------------------------------------------------------------------

    async fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::CaptureReady { epoch, result } => self.on_capture(epoch, result).await,
            Internal::RetryFired(generation) => {
                if self.retry_timer.fire(generation) {
                    self.retry_join().await;
                }
            }
            Internal::FastRetryFired(generation) => {
                if self.fast_retry_timer.fire(generation) {
                    self.retry_join().await;
                }
            }
            Internal::WatchdogFired(generation) => {
                if !self.watchdog.fire(generation) {
                    return;
                }
                let Some(room_id) = self.room.as_ref().map(|r| r.room_id.clone()) else {
                    return;
                };
                if self.state == VoiceState::Disconnected && !self.join_in_flight {
                    warn!(room = %room_id, "Still disconnected, forcing one retry");
                    self.watchdog_spent = true;
                    self.begin_join(room_id, JoinOrigin::Watchdog).await;
                }
            }
            Internal::AutoJoinFired(generation) => {
                if !self.auto_join_timer.fire(generation) {
                    return;
                }
                let Some(room_id) = self.room.as_ref().map(|r| r.room_id.clone()) else {
                    return;
                };
                if self.join_in_flight
                    || matches!(self.state, VoiceState::Connected | VoiceState::Error)
                {
                    return;
                }
                self.begin_join(room_id, JoinOrigin::AutoJoin).await;
            }
            Internal::SampleTick(generation) => {
                if !self.activity.accept_tick(generation) {
                    return;
                }
                for (user_id, level) in self.activity.sample(&mut self.registry) {
                    self.emit(VoiceEvent::SpeakingChanged {
                        user_id,
                        speaking: level.speaking,
                        level: level.level,
                    });
                }
            }
            Internal::StatsTick(generation) => {
                if self.quality.accept_tick(generation) {
                    self.links.poll_stats(&self.registry);
                }
            }
        }
    }

    async fn on_capture(
        &mut self,
        epoch: u64,
        result: Result<Arc<dyn CaptureTrack>, CaptureError>,
    ) {
        if epoch != self.join_epoch || !self.join_in_flight {
            debug!(epoch, "Stale capture result discarded");
            if let Ok(track) = result {
                track.stop();
            }
            return;
        }

        match result {
            Ok(track) => {
                track.set_enabled(!self.muted);
                for link in self.registry.links() {
                    link.send(LinkOp::AttachLocal(Arc::clone(&track)));
                }
                self.registry.set_capture(track);
                self.sync_sampling();
                debug!(muted = self.muted, "Local capture ready");
                self.send_join().await;
            }
            Err(err) => {
                warn!(error = %err, "Local capture unavailable");
                match self.policy.on_failure(FailureKind::from(&err)) {
                    RetryDecision::ListenOnly => {
                        self.registry.set_can_transmit(false);
                        self.notify(Notification::warning(
                            "Listen-only mode",
                            "Microphone access was denied. You can hear others, but they cannot hear you.",
                        ));
                        self.send_join().await;
                        if self.join_in_flight {
                            self.set_state(VoiceState::Connected);
                        }
                    }
                    decision => self.apply_retry(decision, err.to_string()),
                }
            }
        }
    }

    async fn retry_join(&mut self) {
        match self.active_room.clone() {
            Some(room_id) => self.begin_join(room_id, JoinOrigin::Retry).await,
            None => debug!("Retry fired without an active room"),
        }
    }

    fn apply_retry(&mut self, decision: RetryDecision, reason: String) {
        self.join_in_flight = false;
        match decision {
            RetryDecision::FastRetry { delay } => {
                info!(delay_ms = delay.as_millis() as u64, "Session not ready, retrying shortly");
                self.reset_links();
                self.retry_timer.cancel();
                self.fast_retry_timer
                    .schedule(delay, &self.internal, Internal::FastRetryFired);
                self.set_state(VoiceState::Reconnecting);
            }
            RetryDecision::Backoff { delay, attempt } => {
                info!(attempt, max = self.config.retry.max_retries, delay_ms = delay.as_millis() as u64, reason = %reason, "Retrying voice join");
                self.reset_links();
                self.fast_retry_timer.cancel();
                self.retry_timer
                    .schedule(delay, &self.internal, Internal::RetryFired);
                self.set_state(VoiceState::Reconnecting);
                self.notify(Notification::info(
                    "Reconnecting to voice chat",
                    format!(
                        "Attempt {attempt} of {}: {reason}",
                        self.config.retry.max_retries
                    ),
                ));
            }
            RetryDecision::GiveUp => {
                error!(attempts = self.policy.attempt_count(), reason = %reason, "Voice join failed, giving up");
                self.teardown_session(true);
                self.set_state(VoiceState::Error);
                self.notify(Notification::error(
                    "Voice chat unavailable",
                    format!("Could not join voice chat: {reason}"),
                ));
            }
            RetryDecision::ListenOnly => {
                debug!("Listen-only decision outside capture ignored");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Link results
    // -----------------------------------------------------------------------

    async fn handle_link_notice(&mut self, notice: LinkNotice) {
        let LinkNotice {
            peer_id,
            generation,
            outcome,
        } = notice;
        if self.registry.link_generation(&peer_id) != Some(generation) {
            debug!(peer_id = %peer_id, generation, "Result from superseded link discarded");
            return;
        }

        match outcome {
            LinkOutcome::OfferReady(sdp) => {
                self.send_signal(&peer_id, VoiceSignal::Offer { sdp }).await;
            }
            LinkOutcome::AnswerReady(sdp) => {
                self.send_signal(&peer_id, VoiceSignal::Answer { sdp }).await;
            }
            LinkOutcome::Transport(TransportEvent::LocalCandidate(candidate)) => {
                self.send_signal(&peer_id, VoiceSignal::Candidate(candidate))
                    .await;
            }
            LinkOutcome::Transport(TransportEvent::RemoteAudio(audio)) => {
                audio.set_playback_muted(self.deafened);
                if self.registry.attach_remote_audio(&peer_id, audio) {
                    info!(peer_id = %peer_id, "Remote audio connected");
                    self.sync_sampling();
                }
            }
            LinkOutcome::Rtt(rtt) => {
                if let Some(quality) = self.quality.record(&mut self.registry, &peer_id, rtt) {
                    if let Some(participant) = self.registry.participant(&peer_id) {
                        let user_id = participant.user_id.clone();
                        debug!(user_id = %user_id, rtt_ms = quality.rtt_ms, class = ?quality.class, "Link quality changed");
                        self.emit(VoiceEvent::QualityChanged { user_id, quality });
                    }
                }
            }
            LinkOutcome::Failed(err) | LinkOutcome::Transport(TransportEvent::Failed(err)) => {
                self.on_link_failed(&peer_id, err);
            }
        }
    }

    fn on_link_failed(&mut self, peer_id: &str, source: LinkError) {
        let err = VoiceError::Link {
            peer_id: peer_id.to_string(),
            source,
        };
        warn!(error = %err, "Peer link torn down");
        self.links.teardown(&mut self.registry, peer_id);
        let name = self
            .registry
            .participant(peer_id)
            .map(|p| p.username.clone())
            .unwrap_or_else(|| peer_id.to_string());
        self.notify(Notification::warning(
            "Audio link lost",
            format!("Lost audio connection with {name}"),
        ));
        self.sync_sampling();
    }

    async fn send_signal(&mut self, peer_id: &str, signal: VoiceSignal) {
        let Some(room_id) = self.active_room.clone() else {
            return;
        };
        let kind = signal.kind();
        let msg = OutboundMessage::Signal {
            room_id,
            target_peer_id: peer_id.to_string(),
            signal,
        };
        if let Err(e) = self.channel.send(msg).await {
            warn!(peer_id = %peer_id, kind, error = %e, "Signal not delivered");
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn is_self(&self, user_id: &str, peer_id: &str) -> bool {
        user_id == self.identity.user_id || self.self_peer_id.as_deref() == Some(peer_id)
    }

    fn upsert_participant(
        &mut self,
        user_id: &str,
        username: &str,
        peer_id: &str,
        is_muted: Option<bool>,
    ) {
        match self.registry.upsert(user_id, username, peer_id, is_muted) {
            Upsert::Inserted => {
                info!(user_id = %user_id, username = %username, "Participant joined");
                self.emit(VoiceEvent::ParticipantJoined {
                    user_id: user_id.to_string(),
                    username: username.to_string(),
                });
            }
            Upsert::Updated => debug!(user_id = %user_id, "Participant updated"),
            Upsert::Replaced(stale_link) => {
                info!(user_id = %user_id, peer_id = %peer_id, "Participant rejoined with a new peer");
                if let Some(link) = stale_link {
                    link.close();
                }
                self.sync_sampling();
            }
        }
    }

    fn ensure_subscription(&mut self, room_id: &str) {
        if self
            .subscription
            .as_ref()
            .is_some_and(|s| s.room_id() == room_id)
        {
            return;
        }
        self.subscription = Some(self.channel.subscribe(room_id));
    }

    fn set_state(&mut self, state: VoiceState) {
        if self.state == state {
            return;
        }
        info!(from = %self.state, to = %state, "Voice state changed");
        self.state = state;

        if state == VoiceState::Connected {
            self.quality.start(&self.internal, Internal::StatsTick);
        } else {
            self.quality.stop();
        }
        if state == VoiceState::Disconnected {
            self.arm_watchdog();
        } else {
            self.watchdog.cancel();
        }
        self.emit(VoiceEvent::StateChanged(state));
    }

    fn arm_watchdog(&mut self) {
        if self.room.is_none() || self.join_in_flight || self.watchdog_spent {
            return;
        }
        let delay = Duration::from_secs(self.config.retry.watchdog_secs);
        self.watchdog
            .schedule(delay, &self.internal, Internal::WatchdogFired);
    }

    fn cancel_timers(&mut self) {
        self.retry_timer.cancel();
        self.fast_retry_timer.cancel();
        self.watchdog.cancel();
        self.auto_join_timer.cancel();
    }

    /// Drop every remote participant and link of the current session.
    fn reset_links(&mut self) {
        for (participant, link) in self.registry.clear_remote() {
            if let Some(link) = link {
                link.close();
            }
            self.emit(VoiceEvent::ParticipantLeft {
                user_id: participant.user_id,
                username: participant.username,
            });
        }
        self.session_id = None;
        self.self_peer_id = None;
        self.sync_sampling();
    }

    /// Release everything tied to the active session.
    fn teardown_session(&mut self, release_subscription: bool) {
        self.cancel_timers();
        self.join_in_flight = false;
        self.join_epoch += 1;
        self.reset_links();
        if let Some(track) = self.registry.take_capture() {
            track.stop();
        }
        self.registry.set_can_transmit(true);
        self.active_room = None;
        self.owned_session = None;
        self.quality.stop();
        self.activity.stop();
        if release_subscription && self.subscription.take().is_some() {
            debug!("Signaling subscription released");
        }
    }

    fn sync_sampling(&mut self) {
        let sources = self.registry.source_count();
        self.activity
            .sync(sources, &self.internal, Internal::SampleTick);
    }

    fn ranked_participants(&self, mini: bool) -> Vec<ParticipantView> {
        let host = self.room.as_ref().and_then(|r| r.host_user_id.as_deref());
        let mut views = self
            .registry
            .views(host, self.state == VoiceState::Connected);
        rank_participants(&mut views);
        if mini {
            views.truncate(self.config.view.mini_view_limit as usize);
        }
        views
    }

    fn session_info(&self) -> Option<SessionInfo> {
        let room = self.room.as_ref()?;
        if self.session_id.is_none() && self.active_room.is_none() && self.owned_session.is_none()
        {
            return None;
        }
        Some(SessionInfo {
            session_id: self.session_id.clone(),
            room_id: room.room_id.clone(),
            host_user_id: room.host_user_id.clone(),
            settings: self.settings.clone(),
            owned: self.owned_session.as_deref() == Some(room.room_id.as_str()),
        })
    }

    fn snapshot(&self) -> CoordinatorSnapshot {
        CoordinatorSnapshot {
            state: self.state,
            room_id: self.room.as_ref().map(|r| r.room_id.clone()),
            active_room_id: self.active_room.clone(),
            session_id: self.session_id.clone(),
            is_muted: self.muted,
            is_deafened: self.deafened,
            can_transmit: self.registry.can_transmit(),
            has_capture: self.registry.capture().is_some(),
            join_in_flight: self.join_in_flight,
            attempt_count: self.policy.attempt_count(),
            retry_pending: self.retry_timer.is_pending(),
            fast_retry_pending: self.fast_retry_timer.is_pending(),
            watchdog_pending: self.watchdog.is_pending(),
            auto_join_pending: self.auto_join_timer.is_pending(),
            sampling: self.activity.is_running(),
            quality_polling: self.quality.is_running(),
            subscribed: self.subscription.is_some(),
            participant_count: self.registry.len(),
            link_count: self.registry.link_count(),
        }
    }

    fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification.clone());
        self.emit(VoiceEvent::Notification(notification));
    }

    /// Queue an event for the host. State changes that hit a full queue are
    /// coalesced and delivered once there is room, so the last state is never lost.
    fn emit(&mut self, event: VoiceEvent) {
        self.flush_state();
        if let VoiceEvent::StateChanged(state) = event {
            if self.undelivered_state.is_some() {
                self.undelivered_state = Some(state);
                return;
            }
        }
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(VoiceEvent::StateChanged(state))) => {
                warn!(%state, "Event queue full, state change deferred");
                self.undelivered_state = Some(state);
            }
            Err(TrySendError::Full(event)) => {
                warn!(event = event.kind(), "Event queue full, event dropped");
            }
            Err(TrySendError::Closed(_)) => debug!("Event receiver gone"),
        }
    }

    fn flush_state(&mut self) {
        if let Some(state) = self.undelivered_state {
            if self.events.try_send(VoiceEvent::StateChanged(state)).is_ok() {
                self.undelivered_state = None;
            }
        }
    }
}

async fn next_inbound(subscription: &mut Option<Subscription>) -> Option<InboundMessage> {
    match subscription {
        Some(sub) => sub.recv().await,
        None => std::future::pending().await,
    }
}
