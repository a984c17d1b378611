//! Default session audio settings.

use serde::{Deserialize, Serialize};

/// Audio quality tier announced with a new session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AudioQuality {
    Low,
    #[default]
    Medium,
    High,
}

/// Voice settings used when starting a session and acquiring the microphone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub audio_quality: AudioQuality,
    pub noise_suppression: bool,
    pub echo_cancellation: bool,
    pub auto_gain_control: bool,
    /// Join with the outgoing track disabled.
    pub start_muted: bool,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            audio_quality: AudioQuality::Medium,
            noise_suppression: true,
            echo_cancellation: true,
            auto_gain_control: true,
            start_muted: true,
        }
    }
}
