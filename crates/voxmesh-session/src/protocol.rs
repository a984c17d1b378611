//! Wire types for the voice signaling channel.
//!
//! Every frame is a JSON envelope `{"event": "<name>", "payload": {...}}`
//! with kebab-case event names and camelCase payload fields. Outbound and
//! inbound directions have separate enums so a client can never emit a
//! server-only event.

use serde::{Deserialize, Serialize};
use voxmesh_common::SessionId;
use voxmesh_config::schema::{AudioQuality, VoiceConfig};

/// Legacy error text the server uses when no session exists for the room yet.
pub const SESSION_NOT_FOUND_MESSAGE: &str = "No active voice chat session for this room";

// ---------------------------------------------------------------------------
// Negotiation payloads
// ---------------------------------------------------------------------------

/// A transport-level connectivity candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u32>,
}

/// Negotiation message relayed between two peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VoiceSignal {
    /// Session description offering a link.
    Offer { sdp: String },
    /// Session description accepting an offer.
    Answer { sdp: String },
    /// Connectivity candidate for an existing link.
    Candidate(IceCandidate),
}

impl VoiceSignal {
    pub fn kind(&self) -> &'static str {
        match self {
            VoiceSignal::Offer { .. } => "offer",
            VoiceSignal::Answer { .. } => "answer",
            VoiceSignal::Candidate(_) => "candidate",
        }
    }
}

// ---------------------------------------------------------------------------
// Session settings
// ---------------------------------------------------------------------------

/// Audio settings shared by everyone in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSettings {
    pub audio_quality: AudioQuality,
    pub noise_suppression: bool,
    pub echo_cancellation: bool,
    pub auto_gain_control: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&VoiceConfig::default())
    }
}

impl From<&VoiceConfig> for SessionSettings {
    fn from(config: &VoiceConfig) -> Self {
        Self {
            audio_quality: config.audio_quality,
            noise_suppression: config.noise_suppression,
            echo_cancellation: config.echo_cancellation,
            auto_gain_control: config.auto_gain_control,
        }
    }
}

/// Partial settings update; absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_quality: Option<AudioQuality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise_suppression: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo_cancellation: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_gain_control: Option<bool>,
}

impl SessionSettings {
    /// Merge a patch, returning whether anything changed.
    pub fn apply(&mut self, patch: &SettingsPatch) -> bool {
        let before = self.clone();
        if let Some(quality) = patch.audio_quality {
            self.audio_quality = quality;
        }
        if let Some(v) = patch.noise_suppression {
            self.noise_suppression = v;
        }
        if let Some(v) = patch.echo_cancellation {
            self.echo_cancellation = v;
        }
        if let Some(v) = patch.auto_gain_control {
            self.auto_gain_control = v;
        }
        *self != before
    }
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// One participant in the roster delivered with `joined`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub user_id: String,
    pub username: String,
    pub peer_id: String,
    #[serde(default)]
    pub is_muted: bool,
}

/// Machine-readable error codes carried by `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    SessionNotFound,
    #[serde(other)]
    Unknown,
}

/// Messages the client sends to the signaling server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "payload",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum OutboundMessage {
    Start {
        room_id: String,
        settings: SessionSettings,
    },
    Join {
        room_id: String,
    },
    Leave {
        room_id: String,
    },
    Signal {
        room_id: String,
        target_peer_id: String,
        signal: VoiceSignal,
    },
    MuteToggle {
        room_id: String,
        is_muted: bool,
    },
    DeafenToggle {
        room_id: String,
        is_deafened: bool,
    },
}

impl OutboundMessage {
    pub fn room_id(&self) -> &str {
        match self {
            OutboundMessage::Start { room_id, .. }
            | OutboundMessage::Join { room_id }
            | OutboundMessage::Leave { room_id }
            | OutboundMessage::Signal { room_id, .. }
            | OutboundMessage::MuteToggle { room_id, .. }
            | OutboundMessage::DeafenToggle { room_id, .. } => room_id,
        }
    }
}

/// Messages the signaling server delivers to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "payload",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum InboundMessage {
    /// A session was created for the room.
    VoiceStarted {
        session_id: SessionId,
        #[serde(default)]
        host: Option<String>,
        #[serde(default)]
        settings: SettingsPatch,
    },
    /// Our join succeeded.
    Joined {
        session_id: SessionId,
        peer_id: String,
        #[serde(default)]
        roster: Vec<RosterEntry>,
    },
    /// The server removed us from the session.
    Left {
        #[serde(default)]
        room_id: Option<String>,
    },
    ParticipantJoined {
        user_id: String,
        username: String,
        peer_id: String,
    },
    ParticipantLeft {
        user_id: String,
        #[serde(default)]
        username: Option<String>,
    },
    MuteChanged {
        user_id: String,
        is_muted: bool,
    },
    Signal {
        from: String,
        signal: VoiceSignal,
        session_id: SessionId,
    },
    SettingsUpdated {
        settings: SettingsPatch,
        #[serde(default)]
        updated_by: Option<String>,
    },
    /// The server asks the client to join the room's session.
    AutoJoin {
        room_id: String,
    },
    Error {
        message: String,
        #[serde(default)]
        code: Option<ErrorCode>,
    },
}

impl InboundMessage {
    /// Short event name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            InboundMessage::VoiceStarted { .. } => "voice-started",
            InboundMessage::Joined { .. } => "joined",
            InboundMessage::Left { .. } => "left",
            InboundMessage::ParticipantJoined { .. } => "participant-joined",
            InboundMessage::ParticipantLeft { .. } => "participant-left",
            InboundMessage::MuteChanged { .. } => "mute-changed",
            InboundMessage::Signal { .. } => "signal",
            InboundMessage::SettingsUpdated { .. } => "settings-updated",
            InboundMessage::AutoJoin { .. } => "auto-join",
            InboundMessage::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outbound_signal_uses_camel_case_payload() {
        let msg = OutboundMessage::Signal {
            room_id: "room-1".into(),
            target_peer_id: "peer-b".into(),
            signal: VoiceSignal::Offer { sdp: "v=0".into() },
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "event": "signal",
                "payload": {
                    "roomId": "room-1",
                    "targetPeerId": "peer-b",
                    "signal": { "type": "offer", "sdp": "v=0" }
                }
            })
        );
    }

    #[test]
    fn mute_toggle_event_name_is_kebab_case() {
        let msg = OutboundMessage::MuteToggle {
            room_id: "r".into(),
            is_muted: true,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["event"], "mute-toggle");
        assert_eq!(value["payload"]["isMuted"], true);
        assert_eq!(msg.room_id(), "r");
    }

    #[test]
    fn candidate_signal_flattens_fields() {
        let signal = VoiceSignal::Candidate(IceCandidate {
            candidate: "candidate:1 1 udp 2122260223 10.0.0.2 54321 typ host".into(),
            sdp_mid: Some("0".into()),
            sdp_m_line_index: Some(0),
        });
        let value = serde_json::to_value(&signal).unwrap();
        assert_eq!(value["type"], "candidate");
        assert_eq!(value["sdpMid"], "0");
        assert_eq!(value["sdpMLineIndex"], 0);
    }

    #[test]
    fn parses_joined_with_roster() {
        let raw = json!({
            "event": "joined",
            "payload": {
                "sessionId": "s-1",
                "peerId": "p-self",
                "roster": [
                    { "userId": "u-2", "username": "bea", "peerId": "p-2" },
                    { "userId": "u-3", "username": "cid", "peerId": "p-3", "isMuted": true }
                ]
            }
        });
        let msg: InboundMessage = serde_json::from_value(raw).unwrap();
        match msg {
            InboundMessage::Joined {
                session_id,
                peer_id,
                roster,
            } => {
                assert_eq!(session_id.as_str(), "s-1");
                assert_eq!(peer_id, "p-self");
                assert_eq!(roster.len(), 2);
                assert!(!roster[0].is_muted);
                assert!(roster[1].is_muted);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_error_with_and_without_code() {
        let msg: InboundMessage = serde_json::from_value(json!({
            "event": "error",
            "payload": { "message": "nope", "code": "session-not-found" }
        }))
        .unwrap();
        assert!(matches!(
            msg,
            InboundMessage::Error {
                code: Some(ErrorCode::SessionNotFound),
                ..
            }
        ));

        let msg: InboundMessage = serde_json::from_value(json!({
            "event": "error",
            "payload": { "message": "boom", "code": "something-new" }
        }))
        .unwrap();
        assert!(matches!(
            msg,
            InboundMessage::Error {
                code: Some(ErrorCode::Unknown),
                ..
            }
        ));

        let msg: InboundMessage = serde_json::from_value(json!({
            "event": "error",
            "payload": { "message": "boom" }
        }))
        .unwrap();
        assert!(matches!(msg, InboundMessage::Error { code: None, .. }));
    }

    #[test]
    fn settings_patch_merges_present_fields_only() {
        let mut settings = SessionSettings::default();
        let patch: SettingsPatch =
            serde_json::from_value(json!({ "audioQuality": "high" })).unwrap();
        assert!(settings.apply(&patch));
        assert_eq!(settings.audio_quality, AudioQuality::High);
        assert!(settings.noise_suppression);
        assert!(!settings.apply(&patch));
    }

    #[test]
    fn unknown_event_is_rejected() {
        let result = serde_json::from_value::<InboundMessage>(json!({
            "event": "made-up",
            "payload": {}
        }));
        assert!(result.is_err());
    }
}
