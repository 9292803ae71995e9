//! Configuration error types

use thiserror::Error;

/// Errors raised while loading, validating or saving a [`super::Config`]
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    FileReadError(String),

    #[error("Failed to write configuration file: {0}")]
    FileWriteError(String),

    /// The TOML document does not match the configuration schema
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Failed to serialize configuration: {0}")]
    SerializeError(String),

    /// A single variable or field could not be parsed
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// Individually valid values that are inconsistent or out of range
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

impl ConfigError {
    /// Whether the error came from reading or writing the file itself
    pub fn is_io(&self) -> bool {
        matches!(self, ConfigError::FileReadError(_) | ConfigError::FileWriteError(_))
    }
}
