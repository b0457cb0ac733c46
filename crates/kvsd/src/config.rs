//! Server configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! the `KVS_PORT` environment variable. The binary applies its own CLI
//! flags on top of the result.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use kvs_protocol::MAX_LINE_LENGTH;

/// Environment variable overriding the listening port.
pub const PORT_ENV: &str = "KVS_PORT";

/// Default listening port.
pub const DEFAULT_PORT: u16 = 9999;

/// Outbound messages buffered per session before new ones are dropped.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 500;

/// Commands buffered in front of the coordinator.
pub const DEFAULT_COMMAND_BUFFER: usize = 100;

/// Configuration for [`KeyValueServer`](crate::server::KeyValueServer).
///
/// # Example
///
/// ```rust
/// use kvsd::config::ServerConfig;
///
/// let config = ServerConfig {
///     mailbox_capacity: 50,
///     ..Default::default()
/// };
/// assert_eq!(config.port, 9999);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// TCP port to listen on. 0 picks an ephemeral port.
    pub port: u16,

    /// Capacity of each session's outbound mailbox.
    pub mailbox_capacity: usize,

    /// Capacity of the coordinator's command channel.
    pub command_buffer: usize,

    /// Longest accepted request line; longer lines are discarded.
    pub max_line_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            command_buffer: DEFAULT_COMMAND_BUFFER,
            max_line_length: MAX_LINE_LENGTH,
        }
    }
}

impl ServerConfig {
    /// Loads defaults, overlays the TOML file at `path` if given, then the
    /// `KVS_PORT` environment variable.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Ok(raw) = std::env::var(PORT_ENV) {
            config.port = parse_port(&raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML file. Missing keys take their default values.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_toml(&contents).map_err(|e| match e {
            ConfigError::Parse { error, .. } => ConfigError::Parse {
                origin: format!("config file {}", path.display()),
                error,
            },
            other => other,
        })
    }

    /// Parses TOML text.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            origin: "config".to_string(),
            error: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mailbox_capacity == 0 {
            return Err(ConfigError::Invalid("mailbox_capacity must be at least 1"));
        }
        if self.command_buffer == 0 {
            return Err(ConfigError::Invalid("command_buffer must be at least 1"));
        }
        if self.max_line_length == 0 {
            return Err(ConfigError::Invalid("max_line_length must be at least 1"));
        }
        Ok(())
    }
}

fn parse_port(raw: &str) -> Result<u16, ConfigError> {
    raw.trim().parse::<u16>().map_err(|_| ConfigError::InvalidEnv {
        var: PORT_ENV,
        value: raw.to_string(),
    })
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {error}")]
    Read { path: PathBuf, error: String },

    #[error("Failed to parse {origin}: {error}")]
    Parse { origin: String, error: String },

    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 9999);
        assert_eq!(config.mailbox_capacity, 500);
        assert_eq!(config.command_buffer, 100);
        assert_eq!(config.max_line_length, MAX_LINE_LENGTH);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = ServerConfig::from_toml("port = 7000\nmailbox_capacity = 10\n").unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.mailbox_capacity, 10);
        assert_eq!(config.command_buffer, DEFAULT_COMMAND_BUFFER);
    }

    #[test]
    fn test_from_toml_rejects_unknown_keys() {
        let err = ServerConfig::from_toml("prot = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().starts_with("Failed to parse config:"));
    }

    #[test]
    fn test_from_toml_rejects_zero_capacity() {
        let err = ServerConfig::from_toml("mailbox_capacity = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "command_buffer = 8").unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.command_buffer, 8);
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn test_from_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = ServerConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn test_parse_error_names_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = \"not a number\"").unwrap();

        let err = ServerConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config file"));
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port(" 8080 ").unwrap(), 8080);
        let err = parse_port("eighty").unwrap_err();
        assert_eq!(err.to_string(), "Invalid value for KVS_PORT: \"eighty\"");
    }
}
