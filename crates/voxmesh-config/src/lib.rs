//! voxmesh configuration system.
//!
//! Provides TOML-based configuration for the voice coordinator with full
//! validation. All config sections use sensible defaults so partial configs
//! work out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use voxmesh_config::{load_config, config_to_json};
//!
//! let config = load_config().expect("failed to load config");
//! let json = config_to_json(&config);
//! println!("{json}");
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{VoxmeshConfig, CONFIG_SCHEMA_VERSION};

use voxmesh_common::ConfigError;

/// Convenience function to load config from the platform default path.
///
/// Loads `config.toml` from the OS config directory, creates a default
/// if none exists, and validates the result.
pub fn load_config() -> Result<VoxmeshConfig, ConfigError> {
    let config = toml_loader::load_default()?;
    validation::validate(&config)?;
    Ok(config)
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &VoxmeshConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_to_json_contains_all_sections() {
        let config = VoxmeshConfig::default();
        let json = config_to_json(&config);
        assert!(json.contains("\"voice\""));
        assert!(json.contains("\"retry\""));
        assert!(json.contains("\"activity\""));
        assert!(json.contains("\"quality\""));
        assert!(json.contains("\"auto_join\""));
        assert!(json.contains("\"view\""));
        assert!(json.contains("\"signaling\""));
        assert!(json.contains("\"logging\""));
    }

    #[test]
    fn config_schema_version_is_1() {
        assert_eq!(CONFIG_SCHEMA_VERSION, 1);
    }

    #[test]
    fn default_config_round_trips_through_json() {
        let config = VoxmeshConfig::default();
        let json = config_to_json(&config);
        let parsed: VoxmeshConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.retry.max_retries, 3);
        assert_eq!(parsed.quality.good_max_rtt_ms, 180);
        assert!(parsed.voice.start_muted);
    }
}
