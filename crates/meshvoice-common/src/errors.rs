use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),

    #[error("config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum MeshvoiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
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

        let err = ConfigError::ValidationError("voice.connect_timeout_secs = 0".into());
        assert_eq!(
            err.to_string(),
            "config validation error: voice.connect_timeout_secs = 0"
        );
    }

    #[test]
    fn config_io_error_names_path() {
        let err = ConfigError::Io {
            path: PathBuf::from("/etc/meshvoice.toml"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "config file /etc/meshvoice.toml: denied");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn meshvoice_error_from_config() {
        let config_err = ConfigError::ParseError("bad toml".into());
        let err: MeshvoiceError = config_err.into();
        assert!(matches!(err, MeshvoiceError::Config(_)));
        assert!(err.to_string().contains("bad toml"));
    }

    #[test]
    fn meshvoice_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        let err: MeshvoiceError = io_err.into();
        assert!(matches!(err, MeshvoiceError::Io(_)));
        assert!(err.to_string().contains("port taken"));
    }
}
