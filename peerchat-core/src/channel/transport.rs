//! Transport seam
//!
//! The distribution channel relies on a transport that delivers bytes
//! between peers reliably, in order per publisher, at least once, and that
//! replays retained per-key history to new subscribers before live traffic.
//! Discovery and retransmission live behind this trait; the channel itself
//! never retries.

use super::qos::QosProfile;
use crate::model::HistoryKey;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by a transport
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// A QoS resource limit would be exceeded
    #[error("Resource limit exceeded: {0}")]
    ResourceLimitExceeded(String),

    /// The transport or the reader has been closed
    #[error("Transport closed")]
    Closed,

    /// Transient failure, the operation may succeed if retried
    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

impl TransportError {
    /// Whether a reader should keep polling after this error
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Unavailable(_))
    }
}

/// Where a sample handed to a reader came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOrigin {
    /// Replayed from retained history when the reader was created
    History,
    /// Published after the reader was created
    Live,
}

/// One published payload as seen by a reader
#[derive(Clone)]
pub struct Sample {
    /// Publish order within the topic
    pub seq: u64,
    pub key: HistoryKey,
    pub payload: Arc<[u8]>,
    pub origin: SampleOrigin,
}

impl Sample {
    pub fn with_origin(&self, origin: SampleOrigin) -> Self {
        Self {
            origin,
            ..self.clone()
        }
    }
}

impl fmt::Debug for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sample")
            .field("seq", &self.seq)
            .field("key", &self.key)
            .field("len", &self.payload.len())
            .field("origin", &self.origin)
            .finish()
    }
}

/// Publish/subscribe transport shared by every peer of a domain
pub trait Transport: Send + Sync {
    /// Hand a payload to the transport. Returns once accepted; remote
    /// delivery may still be in flight.
    fn publish(&self, topic: &str, key: HistoryKey, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Open an independent reader on `topic`
    fn subscribe(&self, topic: &str, qos: &QosProfile) -> Box<dyn TransportReader>;
}

/// Cursor over the samples of one topic
pub trait TransportReader: Send {
    /// Everything that arrived since the previous call, in arrival order
    fn take(&mut self) -> Result<Vec<Sample>, TransportError>;

    /// Stop receiving. Later calls to `take` return `Closed`.
    fn close(&mut self);
}
