use std::path::PathBuf;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Failure of the external signaling channel.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SignalingError {
    #[error("signaling channel closed")]
    Closed,

    #[error("signaling send failed: {0}")]
    SendFailed(String),

    #[error("signaling encode error: {0}")]
    Encode(String),
}

/// Failure of local audio capture acquisition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("capture device unavailable: {0}")]
    Unavailable(String),
}

/// Failure of a single peer transport link.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LinkError {
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    #[error("transport failed: {0}")]
    Transport(String),

    #[error("link closed")]
    Closed,
}

/// Session-level error taxonomy of the voice coordinator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum VoiceError {
    #[error("invalid voice configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error(transparent)]
    Signaling(#[from] SignalingError),

    #[error("link to {peer_id} failed: {source}")]
    Link {
        peer_id: String,
        #[source]
        source: LinkError,
    },

    #[error("voice coordinator is no longer running")]
    CoordinatorClosed,
}

#[derive(Debug, thiserror::Error)]
pub enum VoxmeshError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Voice(#[from] VoiceError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::FileNotFound(PathBuf::from("/tmp/missing.toml"));
        assert_eq!(err.to_string(), "config file not found: /tmp/missing.toml");

        let err = ConfigError::ParseError("unexpected token".into());
        assert_eq!(err.to_string(), "config parse error: unexpected token");

        let err = ConfigError::ValidationError("retry.max_retries = 99".into());
        assert_eq!(
            err.to_string(),
            "config validation error: retry.max_retries = 99"
        );
    }

    #[test]
    fn rejected_config_keeps_the_validation_detail() {
        let err: VoiceError =
            ConfigError::ValidationError("activity.sample_interval_ms = 0".into()).into();
        assert!(matches!(err, VoiceError::InvalidConfig(_)));
        assert!(err.to_string().contains("sample_interval_ms"));
    }

    #[test]
    fn link_error_names_the_peer() {
        let err = VoiceError::Link {
            peer_id: "peer-7".into(),
            source: LinkError::Negotiation("bad sdp".into()),
        };
        assert_eq!(err.to_string(), "link to peer-7 failed: negotiation failed: bad sdp");
    }

    #[test]
    fn voxmesh_error_from_signaling() {
        let err: VoxmeshError = VoiceError::from(SignalingError::Closed).into();
        assert!(matches!(err, VoxmeshError::Voice(VoiceError::Signaling(_))));
        assert_eq!(err.to_string(), "signaling channel closed");
    }

    #[test]
    fn voxmesh_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: VoxmeshError = io_err.into();
        assert!(matches!(err, VoxmeshError::Io(_)));
        assert!(err.to_string().contains("file missing"));
    }
}
