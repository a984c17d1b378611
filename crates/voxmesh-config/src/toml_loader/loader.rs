use crate::schema::VoxmeshConfig;
use crate::validation;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info, warn};
use voxmesh_common::ConfigError;

use super::paths::{create_default_config, default_config_path};

/// Parse a config file. Missing keys take their serde defaults.
///
/// Out-of-range values are only logged here; callers that must reject them
/// run [`validation::validate`] themselves.
pub fn load_from_path(path: &Path) -> Result<VoxmeshConfig, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ConfigError::FileNotFound(path.to_path_buf()))
        }
        Err(e) => {
            return Err(ConfigError::ParseError(format!(
                "failed to read {}: {e}",
                path.display()
            )))
        }
    };

    let config = parse(&raw)?;
    if let Err(e) = validation::validate(&config) {
        warn!(path = %path.display(), error = %e, "config has out-of-range values");
    }
    debug!(path = %path.display(), "config loaded");
    Ok(config)
}

/// Load from the default location, writing the commented template on first run.
pub fn load_default() -> Result<VoxmeshConfig, ConfigError> {
    let path = default_config_path()?;
    match load_from_path(&path) {
        Err(ConfigError::FileNotFound(_)) => {
            info!(path = %path.display(), "no config yet; using defaults");
            create_default_config(&path)?;
            Ok(VoxmeshConfig::default())
        }
        other => other,
    }
}

fn parse(raw: &str) -> Result<VoxmeshConfig, ConfigError> {
    toml::from_str(raw).map_err(|e| ConfigError::ParseError(format!("invalid TOML: {e}")))
}
