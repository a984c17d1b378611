//! Single owned store of everyone in the session.
//!
//! Remote peers are keyed by `peer_id`; each entry bundles the participant,
//! its link, its inbound audio, the latest activity level and the latest
//! link quality, so removing a peer clears all of them together. The local
//! participant is held separately with the shared capture track.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::activity::AudioLevel;
use crate::links::PeerLink;
use crate::media::{CaptureTrack, RemoteAudio};
use crate::quality::{LinkQuality, QualityClass};

/// Reserved id of the synthetic local participant entry.
pub const SELF_ID: &str = "you";

/// A remote participant as announced by the signaling server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub user_id: String,
    pub username: String,
    pub peer_id: String,
    pub is_muted: bool,
    /// Set once inbound audio from this peer is flowing.
    pub is_connected: bool,
}

/// Read-only snapshot of one participant, as handed to renderers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticipantView {
    pub user_id: String,
    pub username: String,
    pub peer_id: Option<String>,
    pub is_self: bool,
    pub is_host: bool,
    pub is_muted: bool,
    pub is_connected: bool,
    pub can_transmit: bool,
    pub level: f32,
    pub speaking: bool,
    pub rtt_ms: Option<u32>,
    pub quality: Option<QualityClass>,
}

impl ParticipantView {
    /// Audibly talking right now.
    pub fn is_active_speaker(&self) -> bool {
        self.speaking && !self.is_muted
    }
}

pub(crate) struct PeerEntry {
    pub(crate) participant: Participant,
    link: Option<PeerLink>,
    remote_audio: Option<Arc<dyn RemoteAudio>>,
    level: Option<AudioLevel>,
    quality: Option<LinkQuality>,
}

impl PeerEntry {
    fn new(participant: Participant) -> Self {
        Self {
            participant,
            link: None,
            remote_audio: None,
            level: None,
            quality: None,
        }
    }

    fn clear_media(&mut self) -> Option<PeerLink> {
        self.remote_audio = None;
        self.level = None;
        self.quality = None;
        self.participant.is_connected = false;
        self.link.take()
    }
}

struct LocalEntry {
    user_id: String,
    username: String,
    capture: Option<Arc<dyn CaptureTrack>>,
    can_transmit: bool,
    is_muted: bool,
    level: Option<AudioLevel>,
}

/// Outcome of [`PeerRegistry::upsert`].
#[derive(Debug)]
pub(crate) enum Upsert {
    Inserted,
    Updated,
    /// The user reconnected under a new peer id; the stale entry's link is
    /// returned for teardown.
    Replaced(Option<PeerLink>),
}

pub(crate) struct PeerRegistry {
    peers: HashMap<String, PeerEntry>,
    local: LocalEntry,
}

impl PeerRegistry {
    pub(crate) fn new(user_id: &str, username: &str, start_muted: bool) -> Self {
        Self {
            peers: HashMap::new(),
            local: LocalEntry {
                user_id: user_id.to_string(),
                username: username.to_string(),
                capture: None,
                can_transmit: true,
                is_muted: start_muted,
                level: None,
            },
        }
    }

    // -- remote participants --------------------------------------------

    /// Insert or update a participant. Idempotent for repeated announcements.
    pub(crate) fn upsert(
        &mut self,
        user_id: &str,
        username: &str,
        peer_id: &str,
        is_muted: Option<bool>,
    ) -> Upsert {
        if let Some(entry) = self.peers.get_mut(peer_id) {
            entry.participant.user_id = user_id.to_string();
            entry.participant.username = username.to_string();
            if let Some(muted) = is_muted {
                entry.participant.is_muted = muted;
            }
            return Upsert::Updated;
        }

        let stale = self
            .peers
            .iter()
            .find(|(_, e)| e.participant.user_id == user_id)
            .map(|(pid, _)| pid.clone());

        let participant = Participant {
            user_id: user_id.to_string(),
            username: username.to_string(),
            peer_id: peer_id.to_string(),
            is_muted: is_muted.unwrap_or(false),
            is_connected: false,
        };
        self.peers
            .insert(peer_id.to_string(), PeerEntry::new(participant));

        match stale.and_then(|pid| self.peers.remove(&pid)) {
            Some(mut old) => Upsert::Replaced(old.clear_media()),
            None => Upsert::Inserted,
        }
    }

    /// Create an entry for a signal sender we have not been told about.
    /// Returns `true` when a new entry was created.
    pub(crate) fn ensure_placeholder(&mut self, peer_id: &str) -> bool {
        if self.peers.contains_key(peer_id) {
            return false;
        }
        self.upsert(peer_id, peer_id, peer_id, None);
        true
    }

    /// Remove a participant by user id, returning its entry.
    pub(crate) fn remove_user(&mut self, user_id: &str) -> Option<(Participant, Option<PeerLink>)> {
        let peer_id = self.peer_for_user(user_id)?.to_string();
        let mut entry = self.peers.remove(&peer_id)?;
        let link = entry.clear_media();
        Some((entry.participant, link))
    }

    /// Remove every remote participant, returning their links.
    pub(crate) fn clear_remote(&mut self) -> Vec<(Participant, Option<PeerLink>)> {
        self.peers
            .drain()
            .map(|(_, mut entry)| {
                let link = entry.clear_media();
                (entry.participant, link)
            })
            .collect()
    }

    pub(crate) fn peer_for_user(&self, user_id: &str) -> Option<&str> {
        self.peers
            .values()
            .find(|e| e.participant.user_id == user_id)
            .map(|e| e.participant.peer_id.as_str())
    }

    pub(crate) fn participant(&self, peer_id: &str) -> Option<&Participant> {
        self.peers.get(peer_id).map(|e| &e.participant)
    }

    pub(crate) fn contains_peer(&self, peer_id: &str) -> bool {
        self.peers.contains_key(peer_id)
    }

    pub(crate) fn peer_ids(&self) -> Vec<String> {
        self.peers.keys().cloned().collect()
    }

    /// Update a participant's mute flag. Returns `false` for unknown users.
    pub(crate) fn set_muted(&mut self, user_id: &str, muted: bool) -> bool {
        match self
            .peers
            .values_mut()
            .find(|e| e.participant.user_id == user_id)
        {
            Some(entry) => {
                entry.participant.is_muted = muted;
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.peers.len()
    }

    // -- links ------------------------------------------------------------

    pub(crate) fn link(&self, peer_id: &str) -> Option<&PeerLink> {
        self.peers.get(peer_id).and_then(|e| e.link.as_ref())
    }

    pub(crate) fn has_link(&self, peer_id: &str) -> bool {
        self.link(peer_id).is_some()
    }

    /// Install a link for a known peer. Ignored for unknown peers.
    pub(crate) fn set_link(&mut self, peer_id: &str, link: PeerLink) {
        if let Some(entry) = self.peers.get_mut(peer_id) {
            debug_assert!(entry.link.is_none(), "peer already has a link");
            entry.link = Some(link);
        }
    }

    /// Detach a peer's link together with its audio, level and quality.
    pub(crate) fn take_link(&mut self, peer_id: &str) -> Option<PeerLink> {
        self.peers.get_mut(peer_id).and_then(PeerEntry::clear_media)
    }

    pub(crate) fn link_generation(&self, peer_id: &str) -> Option<u64> {
        self.link(peer_id).map(PeerLink::generation)
    }

    pub(crate) fn links(&self) -> impl Iterator<Item = &PeerLink> {
        self.peers.values().filter_map(|e| e.link.as_ref())
    }

    pub(crate) fn link_count(&self) -> usize {
        self.links().count()
    }

    pub(crate) fn quality_mut(&mut self, peer_id: &str) -> Option<&mut Option<LinkQuality>> {
        self.peers
            .get_mut(peer_id)
            .filter(|e| e.link.is_some())
            .map(|e| &mut e.quality)
    }

    // -- audio sources ---------------------------------------------------

    /// Attach a peer's inbound audio. Returns `false` for unknown peers.
    pub(crate) fn attach_remote_audio(&mut self, peer_id: &str, audio: Arc<dyn RemoteAudio>) -> bool {
        match self.peers.get_mut(peer_id) {
            Some(entry) => {
                entry.remote_audio = Some(audio);
                entry.participant.is_connected = true;
                true
            }
            None => false,
        }
    }

    pub(crate) fn remote_audio(&self) -> impl Iterator<Item = &Arc<dyn RemoteAudio>> {
        self.peers.values().filter_map(|e| e.remote_audio.as_ref())
    }

    pub(crate) fn capture(&self) -> Option<&Arc<dyn CaptureTrack>> {
        self.local.capture.as_ref()
    }

    pub(crate) fn set_capture(&mut self, track: Arc<dyn CaptureTrack>) {
        self.local.capture = Some(track);
        self.local.can_transmit = true;
    }

    /// Detach the capture track, returning it so the caller can stop it.
    pub(crate) fn take_capture(&mut self) -> Option<Arc<dyn CaptureTrack>> {
        self.local.level = None;
        self.local.capture.take()
    }

    /// Number of sources the activity monitor should sample.
    pub(crate) fn source_count(&self) -> usize {
        usize::from(self.local.capture.is_some()) + self.remote_audio().count()
    }

    /// Measure every attached source and store the levels.
    ///
    /// `measure` is handed a reader for one source's frequency data. Returns
    /// the user ids whose speaking flag flipped, with the new flag.
    pub(crate) fn sample_levels<F>(&mut self, mut measure: F) -> Vec<(String, AudioLevel)>
    where
        F: FnMut(&dyn Fn(&mut [u8])) -> AudioLevel,
    {
        let mut flipped = Vec::new();

        if let Some(track) = &self.local.capture {
            let read = |bins: &mut [u8]| track.read_frequency_data(bins);
            let level = measure(&read);
            if self.local.level.map(|l| l.speaking).unwrap_or(false) != level.speaking {
                flipped.push((SELF_ID.to_string(), level));
            }
            self.local.level = Some(level);
        }

        for entry in self.peers.values_mut() {
            let Some(audio) = &entry.remote_audio else {
                continue;
            };
            let read = |bins: &mut [u8]| audio.read_frequency_data(bins);
            let level = measure(&read);
            if entry.level.map(|l| l.speaking).unwrap_or(false) != level.speaking {
                flipped.push((entry.participant.user_id.clone(), level));
            }
            entry.level = Some(level);
        }

        flipped
    }

    // -- local participant -------------------------------------------------

    pub(crate) fn set_local_muted(&mut self, muted: bool) {
        self.local.is_muted = muted;
    }

    pub(crate) fn can_transmit(&self) -> bool {
        self.local.can_transmit
    }

    pub(crate) fn set_can_transmit(&mut self, can_transmit: bool) {
        self.local.can_transmit = can_transmit;
    }

    // -- views -------------------------------------------------------------

    /// Unranked views of everyone, the local entry first.
    pub(crate) fn views(&self, host_user_id: Option<&str>, local_connected: bool) -> Vec<ParticipantView> {
        let is_host = |user_id: &str| host_user_id == Some(user_id);
        let local_level = self.local.level.unwrap_or_default();

        let mut views = Vec::with_capacity(self.peers.len() + 1);
        views.push(ParticipantView {
            user_id: SELF_ID.to_string(),
            username: self.local.username.clone(),
            peer_id: None,
            is_self: true,
            is_host: is_host(&self.local.user_id),
            is_muted: self.local.is_muted,
            is_connected: local_connected,
            can_transmit: self.local.can_transmit,
            level: local_level.level,
            speaking: local_level.speaking,
            rtt_ms: None,
            quality: None,
        });

        views.extend(self.peers.values().map(|entry| {
            let p = &entry.participant;
            let level = entry.level.unwrap_or_default();
            ParticipantView {
                user_id: p.user_id.clone(),
                username: p.username.clone(),
                peer_id: Some(p.peer_id.clone()),
                is_self: false,
                is_host: is_host(&p.user_id),
                is_muted: p.is_muted,
                is_connected: p.is_connected,
                can_transmit: true,
                level: level.level,
                speaking: level.speaking,
                rtt_ms: entry.quality.map(|q| q.rtt_ms),
                quality: entry.quality.map(|q| q.class),
            }
        }));
        views
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PeerRegistry {
        PeerRegistry::new("u-self", "ana", true)
    }

    #[test]
    fn upsert_is_idempotent() {
        let mut r = registry();
        assert!(matches!(r.upsert("u-2", "bea", "p-2", None), Upsert::Inserted));
        assert!(matches!(
            r.upsert("u-2", "bea", "p-2", Some(true)),
            Upsert::Updated
        ));
        assert_eq!(r.len(), 1);
        assert!(r.participant("p-2").unwrap().is_muted);
    }

    #[test]
    fn new_peer_id_for_known_user_replaces_entry() {
        let mut r = registry();
        r.upsert("u-2", "bea", "p-2", None);
        assert!(matches!(
            r.upsert("u-2", "bea", "p-2b", None),
            Upsert::Replaced(None)
        ));
        assert_eq!(r.len(), 1);
        assert!(!r.contains_peer("p-2"));
        assert_eq!(r.peer_for_user("u-2"), Some("p-2b"));
    }

    #[test]
    fn placeholder_uses_peer_id_as_identity() {
        let mut r = registry();
        assert!(r.ensure_placeholder("p-9"));
        assert!(!r.ensure_placeholder("p-9"));
        let p = r.participant("p-9").unwrap();
        assert_eq!(p.user_id, "p-9");
        assert_eq!(p.username, "p-9");

        // The real announcement later fills in the identity in place.
        assert!(matches!(r.upsert("u-9", "ivy", "p-9", None), Upsert::Updated));
        assert_eq!(r.participant("p-9").unwrap().username, "ivy");
    }

    #[test]
    fn removing_unknown_user_is_noop() {
        let mut r = registry();
        r.upsert("u-2", "bea", "p-2", None);
        assert!(r.remove_user("u-404").is_none());
        assert_eq!(r.len(), 1);
        assert!(r.remove_user("u-2").is_some());
        assert_eq!(r.len(), 0);
    }

    #[test]
    fn set_muted_reports_unknown_users() {
        let mut r = registry();
        r.upsert("u-2", "bea", "p-2", None);
        assert!(r.set_muted("u-2", true));
        assert!(!r.set_muted("u-3", true));
    }

    #[test]
    fn views_mark_self_and_host() {
        let mut r = registry();
        r.upsert("u-2", "bea", "p-2", None);
        let views = r.views(Some("u-2"), true);
        assert_eq!(views.len(), 2);

        let me = views.iter().find(|v| v.is_self).unwrap();
        assert_eq!(me.user_id, SELF_ID);
        assert_eq!(me.username, "ana");
        assert!(me.is_muted);
        assert!(!me.is_host);

        let bea = views.iter().find(|v| v.user_id == "u-2").unwrap();
        assert!(bea.is_host);
        assert_eq!(bea.peer_id.as_deref(), Some("p-2"));
    }

    #[test]
    fn quality_slot_requires_link() {
        let mut r = registry();
        r.upsert("u-2", "bea", "p-2", None);
        assert!(r.quality_mut("p-2").is_none());
    }
}
