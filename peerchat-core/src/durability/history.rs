/*
    history.rs - Bounded per-key retention

    For every distinct (kind, sender, group) key the cache keeps the most
    recent `depth` samples, evicting the oldest first. New keys beyond
    `max_keys` are refused. Replay hands the retained samples back in
    publish order so a late joiner sees announcements before the messages
    that depend on them.
*/

use crate::channel::{QosProfile, Sample, TransportError};
use crate::model::HistoryKey;
use std::collections::{HashMap, VecDeque};

/// Retained samples of one topic
#[derive(Debug, Default)]
pub struct HistoryCache {
    depth: usize,
    max_keys: usize,
    keys: HashMap<HistoryKey, VecDeque<Sample>>,
}

impl HistoryCache {
    pub fn new(depth: usize, max_keys: usize) -> Self {
        Self {
            depth,
            max_keys,
            keys: HashMap::new(),
        }
    }

    pub fn from_qos(qos: &QosProfile) -> Self {
        Self::new(qos.retained_depth(), qos.resource_limits.max_keys)
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Check that a sample under `key` may be published
    pub fn admit(&self, key: &HistoryKey) -> Result<(), TransportError> {
        if self.depth == 0 || self.keys.contains_key(key) {
            return Ok(());
        }
        if self.keys.len() >= self.max_keys {
            return Err(TransportError::ResourceLimitExceeded(format!(
                "max_keys ({}) reached, cannot retain {} key",
                self.max_keys, key.kind
            )));
        }
        Ok(())
    }

    /// Store a sample, evicting the oldest one of its key when full
    pub fn retain(&mut self, sample: Sample) -> Result<(), TransportError> {
        if self.depth == 0 {
            return Ok(());
        }
        self.admit(&sample.key)?;

        let depth = self.depth;
        let entries = self.keys.entry(sample.key).or_default();
        entries.push_back(sample);
        while entries.len() > depth {
            entries.pop_front();
        }
        Ok(())
    }

    /// All retained samples in publish order
    pub fn replay(&self) -> Vec<Sample> {
        let mut samples: Vec<Sample> = self.keys.values().flatten().cloned().collect();
        samples.sort_by_key(|s| s.seq);
        samples
    }

    pub fn samples_for(&self, key: &HistoryKey) -> usize {
        self.keys.get(key).map(VecDeque::len).unwrap_or(0)
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn len(&self) -> usize {
        self.keys.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
