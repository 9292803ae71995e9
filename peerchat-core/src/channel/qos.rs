//! Delivery guarantees requested from the transport

use serde::{Deserialize, Serialize};

/// Whether samples must reach every matched subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reliability {
    #[default]
    Reliable,
    BestEffort,
}

/// Whether samples outlive their publication for late joiners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
    /// Only live traffic reaches a subscriber
    Volatile,
    /// Retained history is replayed to every new subscriber first
    #[default]
    TransientLocal,
}

impl std::str::FromStr for Durability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "volatile" => Ok(Durability::Volatile),
            "transient_local" | "transient-local" => Ok(Durability::TransientLocal),
            other => Err(format!("unknown durability kind: {}", other)),
        }
    }
}

/// How many samples are kept per key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum History {
    /// Keep everything up to the resource limits
    #[default]
    KeepAll,
    /// Keep the most recent `n` samples
    KeepLast(usize),
}

/// Hard caps on retained state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    pub max_samples_per_key: usize,
    pub max_keys: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_samples_per_key: 100,
            max_keys: 4096,
        }
    }
}

/// Full QoS profile of the shared topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QosProfile {
    #[serde(default)]
    pub reliability: Reliability,
    #[serde(default)]
    pub durability: Durability,
    #[serde(default)]
    pub history: History,
    #[serde(default)]
    pub resource_limits: ResourceLimits,
}

impl QosProfile {
    /// Samples retained per key once history and limits are combined
    pub fn retained_depth(&self) -> usize {
        if self.durability == Durability::Volatile {
            return 0;
        }
        match self.history {
            History::KeepAll => self.resource_limits.max_samples_per_key,
            History::KeepLast(n) => n.min(self.resource_limits.max_samples_per_key),
        }
    }

    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    pub fn with_history(mut self, history: History) -> Self {
        self.history = history;
        self
    }

    pub fn with_resource_limits(mut self, max_samples_per_key: usize, max_keys: usize) -> Self {
        self.resource_limits = ResourceLimits {
            max_samples_per_key,
            max_keys,
        };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile() {
        let qos = QosProfile::default();
        assert_eq!(qos.reliability, Reliability::Reliable);
        assert_eq!(qos.durability, Durability::TransientLocal);
        assert_eq!(qos.history, History::KeepAll);
        assert_eq!(qos.retained_depth(), 100);
    }

    #[test]
    fn test_retained_depth() {
        let qos = QosProfile::default().with_history(History::KeepLast(10));
        assert_eq!(qos.retained_depth(), 10);

        let qos = qos.with_resource_limits(5, 16);
        assert_eq!(qos.retained_depth(), 5);

        let qos = qos.with_durability(Durability::Volatile);
        assert_eq!(qos.retained_depth(), 0);
    }

    #[test]
    fn test_durability_from_str() {
        assert_eq!("volatile".parse::<Durability>(), Ok(Durability::Volatile));
        assert_eq!("Transient_Local".parse::<Durability>(), Ok(Durability::TransientLocal));
        assert!("persistent".parse::<Durability>().is_err());
    }

    #[test]
    fn test_partial_resource_limits_keep_defaults() {
        let qos: QosProfile = toml::from_str("[resource_limits]\nmax_keys = 8\n").unwrap();
        assert_eq!(qos.resource_limits.max_keys, 8);
        assert_eq!(qos.resource_limits.max_samples_per_key, 100);
        assert_eq!(qos.durability, Durability::TransientLocal);
    }
}
