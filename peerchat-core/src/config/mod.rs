//! Configuration management for peerchat
//!
//! Three sources, each followed by validation: built-in defaults,
//! environment variables and a TOML file.

use crate::channel::{Durability, QosProfile, DEFAULT_TOPIC};
use crate::durability::ReplayPolicy;
use crate::pipeline::SelfEcho;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main configuration of a peer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Bus and worker configuration
    #[serde(default)]
    pub bus: BusConfig,

    /// QoS of the shared topic
    #[serde(default)]
    pub qos: QosProfile,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Bus configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Topic every envelope is published on
    pub topic: String,

    /// Delay between worker polls
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Upper bound of the retry delay after read failures
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,

    /// Whether senders receive their own messages
    pub self_echo: SelfEcho,

    /// Which historical chat messages late joiners receive
    pub replay: ReplayPolicy,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
            poll_interval: Duration::from_millis(300),
            max_backoff: Duration::from_secs(5),
            self_echo: SelfEcho::default(),
            replay: ReplayPolicy::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Variables follow the pattern `PEERCHAT_<SECTION>_<KEY>`, e.g.
    /// `PEERCHAT_BUS_TOPIC=chat`. The poll interval is read from
    /// `PEERCHAT_POLL_INTERVAL` in (fractional) seconds, falling back to
    /// the legacy `TIME_SLEEP` variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Bus config
        if let Some(secs) = lookup("PEERCHAT_POLL_INTERVAL").or_else(|| lookup("TIME_SLEEP")) {
            config.bus.poll_interval = parse_seconds(&secs)?;
        }
        if let Some(secs) = lookup("PEERCHAT_BUS_MAX_BACKOFF") {
            config.bus.max_backoff = parse_seconds(&secs)?;
        }
        if let Some(topic) = lookup("PEERCHAT_BUS_TOPIC") {
            config.bus.topic = topic;
        }
        if let Some(mode) = lookup("PEERCHAT_BUS_SELF_ECHO") {
            config.bus.self_echo = mode.parse().map_err(ConfigError::InvalidValue)?;
        }
        if let Some(policy) = lookup("PEERCHAT_BUS_REPLAY") {
            config.bus.replay = policy.parse().map_err(ConfigError::InvalidValue)?;
        }

        // QoS config
        if let Some(max) = lookup("PEERCHAT_QOS_MAX_SAMPLES_PER_KEY") {
            config.qos.resource_limits.max_samples_per_key = max.trim().parse().map_err(|e| {
                ConfigError::InvalidValue(format!("Invalid max samples per key: {}", e))
            })?;
        }
        if let Some(max) = lookup("PEERCHAT_QOS_MAX_KEYS") {
            config.qos.resource_limits.max_keys = max
                .trim()
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid max keys: {}", e)))?;
        }
        if let Some(kind) = lookup("PEERCHAT_QOS_DURABILITY") {
            config.qos.durability = kind.parse::<Durability>().map_err(ConfigError::InvalidValue)?;
        }

        // Logging config
        if let Some(level) = lookup("PEERCHAT_LOG_LEVEL") {
            config.logging.level = level.trim().to_lowercase();
        }
        if let Some(json) = lookup("PEERCHAT_LOG_JSON") {
            config.logging.json_format = json
                .trim()
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid JSON flag: {}", e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError(e.to_string()))?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate bus config
        if self.bus.topic.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "topic must not be empty".to_string(),
            ));
        }

        if self.bus.poll_interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "poll_interval must be greater than 0".to_string(),
            ));
        }

        if self.bus.max_backoff < self.bus.poll_interval {
            return Err(ConfigError::ValidationFailed(
                "max_backoff must not be shorter than poll_interval".to_string(),
            ));
        }

        // Validate QoS config
        let limits = &self.qos.resource_limits;
        if limits.max_samples_per_key == 0 || limits.max_keys == 0 {
            return Err(ConfigError::ValidationFailed(
                "resource limits must be greater than 0".to_string(),
            ));
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::FileWriteError(e.to_string()))?;

        Ok(())
    }
}

fn parse_seconds(raw: &str) -> Result<Duration, ConfigError> {
    let secs: f64 = raw
        .trim()
        .parse()
        .map_err(|e| ConfigError::InvalidValue(format!("Invalid seconds value {:?}: {}", raw, e)))?;
    Duration::try_from_secs_f64(secs)
        .map_err(|e| ConfigError::InvalidValue(format!("Invalid seconds value {:?}: {}", raw, e)))
}
