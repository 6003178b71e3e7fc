//! Full configuration validation.
//!
//! Validates numeric ranges and ICE server entries. Each domain has its
//! own submodule; this orchestrator calls them all and collects errors
//! into a single `ConfigError`.

mod misc;

#[cfg(test)]
mod tests;

use crate::schema::MeshvoiceConfig;
use meshvoice_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &MeshvoiceConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    misc::validate_voice(&mut errors, config);
    misc::validate_ice_servers(&mut errors, config);
    misc::validate_relay(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
