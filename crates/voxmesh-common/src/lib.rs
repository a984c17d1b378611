pub mod errors;
pub mod id;
pub mod notifications;

pub use errors::{CaptureError, ConfigError, LinkError, SignalingError, VoiceError, VoxmeshError};
pub use id::{new_id, SessionId};
pub use notifications::{Notification, NotificationLevel, NotificationQueue};

pub type Result<T> = std::result::Result<T, VoxmeshError>;
