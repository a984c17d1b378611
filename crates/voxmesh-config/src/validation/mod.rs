//! Full configuration validation.
//!
//! Validates numeric ranges and cross-field constraints. Each domain has its
//! own submodule; this orchestrator calls them all and collects errors into a
//! single `ConfigError`.

mod helpers;
mod monitor;
mod session;

#[cfg(test)]
mod tests;

use crate::schema::VoxmeshConfig;
use voxmesh_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &VoxmeshConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    session::validate_retry(&mut errors, config);
    session::validate_auto_join(&mut errors, config);
    session::validate_view(&mut errors, config);
    session::validate_signaling(&mut errors, config);
    monitor::validate_activity(&mut errors, config);
    monitor::validate_quality(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
