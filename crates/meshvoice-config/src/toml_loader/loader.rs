//! Reading and parsing config files.

use std::io::ErrorKind;
use std::path::Path;

use meshvoice_common::ConfigError;
use tracing::{debug, info, warn};

use super::paths::{create_default_config, default_config_path};
use crate::schema::MeshvoiceConfig;
use crate::validation;

/// Parse config TOML. Missing sections and fields take their defaults.
pub fn parse_config(content: &str) -> Result<MeshvoiceConfig, ConfigError> {
    toml::from_str(content)
        .map_err(|e| ConfigError::ParseError(format!("failed to parse TOML: {e}")))
}

/// Load config from a TOML file.
///
/// Out-of-range values are logged and kept. Callers that need a valid
/// config run `validation::validate` on the result.
pub fn load_from_path(path: &Path) -> Result<MeshvoiceConfig, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let config = parse_config(&content)?;
    if let Err(e) = validation::validate(&config) {
        warn!(path = %path.display(), error = %e, "Config has invalid values");
    }

    debug!(path = %path.display(), "Loaded config");
    Ok(config)
}

/// Load config from [`default_config_path`], writing the documented default
/// file there first when none exists.
pub fn load_default() -> Result<MeshvoiceConfig, ConfigError> {
    let path = default_config_path()?;
    match load_from_path(&path) {
        Err(ConfigError::FileNotFound(_)) => {
            info!(path = %path.display(), "No config file, using defaults");
            create_default_config(&path)?;
            Ok(MeshvoiceConfig::default())
        }
        loaded => loaded,
    }
}
