//! Where the config file lives and how a fresh one is written.

use std::path::{Path, PathBuf};
use tracing::info;
use voxmesh_common::ConfigError;

use super::template::default_config_toml;

/// Environment variable that points at an explicit config file.
pub const CONFIG_PATH_ENV: &str = "VOXMESH_CONFIG";

const APP_DIR: &str = "voxmesh";
const FILE_NAME: &str = "config.toml";

/// Resolve the config file path.
///
/// `VOXMESH_CONFIG` wins when set and non-empty; otherwise the file sits in
/// the platform config directory under `voxmesh/`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    if let Some(explicit) = std::env::var_os(CONFIG_PATH_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(explicit));
    }
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR).join(FILE_NAME))
        .ok_or_else(|| ConfigError::ParseError("no platform config directory".into()))
}

/// Write the commented default template to `path`, creating parent
/// directories. An existing file is left untouched.
pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
    if path.exists() {
        return Ok(());
    }
    let io_error = |what: &str, target: &Path, e: std::io::Error| {
        ConfigError::ParseError(format!("{what} {}: {e}", target.display()))
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| io_error("cannot create config directory", parent, e))?;
    }
    std::fs::write(path, default_config_toml())
        .map_err(|e| io_error("cannot write default config", path, e))?;

    info!(path = %path.display(), "Wrote default voxmesh config");
    Ok(())
}
