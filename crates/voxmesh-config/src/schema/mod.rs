//! Configuration schema types for voxmesh.
//!
//! All structs use `serde(default)` so partial configs work correctly.
//! Missing fields are filled with the defaults the coordinator was tuned with.

mod monitor;
mod retry;
mod signaling;
mod system;
mod voice;

pub use monitor::*;
pub use retry::*;
pub use signaling::*;
pub use system::*;
pub use voice::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration for voxmesh.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VoxmeshConfig {
    pub voice: VoiceConfig,
    pub retry: RetryConfig,
    pub activity: ActivityConfig,
    pub quality: QualityConfig,
    pub auto_join: AutoJoinConfig,
    pub view: ViewConfig,
    pub signaling: SignalingConfig,
    pub logging: LoggingConfig,
}
