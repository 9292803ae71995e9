//! Distribution channel
//!
//! One logical publish/subscribe topic shared by every peer of a
//! deployment. It carries all three envelope kinds; receivers dispatch on
//! the envelope's `kind` tag.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────┐
//! │  ChatPeer / workers           │
//! └──────┬──────────────▲─────────┘
//!        │ publish      │ Subscription::take
//! ┌──────▼──────────────┴─────────┐
//! │  DistributionChannel (this)   │
//! │  encode / decode envelopes    │
//! └──────┬──────────────▲─────────┘
//!        │              │
//! ┌──────▼──────────────┴─────────┐
//! │  Transport (retention, QoS)   │
//! └───────────────────────────────┘
//! ```

mod memory;
mod qos;
mod transport;

pub use memory::InMemoryTransport;
pub use qos::{Durability, History, QosProfile, Reliability, ResourceLimits};
pub use transport::{Sample, SampleOrigin, Transport, TransportError, TransportReader};

use crate::error::ChatResult;
use crate::metrics as chat_metrics;
use crate::model::Envelope;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Topic used when none is configured
pub const DEFAULT_TOPIC: &str = "peerchat.envelopes";

/// The shared bus of one peer
///
/// Explicitly constructed once per peer and handed to every component that
/// publishes or subscribes. Safe for concurrent publish and for any number
/// of independent subscriptions.
pub struct DistributionChannel {
    topic: String,
    qos: QosProfile,
    transport: Arc<dyn Transport>,
}

impl DistributionChannel {
    pub fn new(topic: impl Into<String>, qos: QosProfile, transport: Arc<dyn Transport>) -> Self {
        let topic = topic.into();
        debug!(topic = %topic, ?qos, "Creating distribution channel");
        Self {
            topic,
            qos,
            transport,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn qos(&self) -> &QosProfile {
        &self.qos
    }

    /// Submit an envelope for distribution
    ///
    /// Returns as soon as the transport accepts it. Remote delivery is not
    /// awaited.
    pub fn publish(&self, envelope: &Envelope) -> ChatResult<()> {
        let payload = envelope.encode()?;
        let kind = envelope.kind();
        self.transport
            .publish(&self.topic, envelope.history_key(), payload)
            .map_err(|e| {
                warn!(topic = %self.topic, %kind, error = %e, "Publish rejected");
                e
            })?;
        chat_metrics::envelope_published(kind);
        Ok(())
    }

    /// Open an independent cursor: retained history first, then live
    /// traffic, own publications included
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            topic: self.topic.clone(),
            reader: self.transport.subscribe(&self.topic, &self.qos),
        }
    }
}

impl fmt::Debug for DistributionChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributionChannel")
            .field("topic", &self.topic)
            .field("qos", &self.qos)
            .finish()
    }
}

/// An envelope handed to a subscriber
#[derive(Debug, Clone)]
pub struct Received {
    pub envelope: Envelope,
    pub origin: SampleOrigin,
    pub seq: u64,
}

/// Polling cursor over the channel
pub struct Subscription {
    topic: String,
    reader: Box<dyn TransportReader>,
}

impl Subscription {
    /// Envelopes that arrived since the previous call
    ///
    /// Payloads that fail to decode are logged and skipped.
    pub fn take(&mut self) -> Result<Vec<Received>, TransportError> {
        let samples = self.reader.take()?;
        let mut received = Vec::with_capacity(samples.len());
        for sample in samples {
            match Envelope::decode(&sample.payload) {
                Ok(envelope) => {
                    chat_metrics::envelope_received(envelope.kind());
                    received.push(Received {
                        envelope,
                        origin: sample.origin,
                        seq: sample.seq,
                    });
                }
                Err(e) => {
                    warn!(topic = %self.topic, seq = sample.seq, error = %e, "Dropping undecodable sample");
                }
            }
        }
        Ok(received)
    }

    /// Release the underlying reader
    pub fn close(&mut self) {
        self.reader.close();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("topic", &self.topic).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChatError;
    use crate::model::{ChatMessage, EnvelopeKind, Group, GroupId, HistoryKey, UserId};

    fn channel(transport: &InMemoryTransport) -> DistributionChannel {
        DistributionChannel::new(DEFAULT_TOPIC, *transport.qos(), Arc::new(transport.clone()))
    }

    #[test]
    fn test_publish_and_subscribe_round_trip() {
        let transport = InMemoryTransport::default();
        let bus = channel(&transport);
        let mut sub = bus.subscribe();

        let group = Group::new(GroupId::generate(), "general");
        let msg = ChatMessage::new(UserId::generate(), group.id, "hello");
        bus.publish(&Envelope::GroupAnnouncement { group: group.clone() }).unwrap();
        bus.publish(&msg.clone().into()).unwrap();

        let received = sub.take().unwrap();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].envelope, Envelope::GroupAnnouncement { group });
        assert_eq!(received[1].envelope, Envelope::ChatMessage(msg));
    }

    #[test]
    fn test_two_peers_share_a_domain() {
        let transport = InMemoryTransport::default();
        let peer_a = channel(&transport);
        let peer_b = channel(&transport);
        let mut sub_b = peer_b.subscribe();

        let msg = ChatMessage::new(UserId::generate(), GroupId::generate(), "across");
        peer_a.publish(&msg.clone().into()).unwrap();

        let received = sub_b.take().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].envelope, Envelope::ChatMessage(msg));
    }

    #[test]
    fn test_undecodable_payloads_are_skipped() {
        let transport = InMemoryTransport::default();
        let bus = channel(&transport);
        let mut sub = bus.subscribe();

        let key = HistoryKey {
            kind: EnvelopeKind::ChatMessage,
            sender: None,
            group: None,
        };
        transport.publish(DEFAULT_TOPIC, key, b"garbage".to_vec()).unwrap();
        bus.publish(&ChatMessage::new(UserId::generate(), GroupId::generate(), "ok").into())
            .unwrap();

        let received = sub.take().unwrap();
        assert_eq!(received.len(), 1);
    }

    #[test]
    fn test_publish_surfaces_transport_errors() {
        let transport = InMemoryTransport::default();
        let bus = channel(&transport);
        transport.close();

        let result = bus.publish(&ChatMessage::new(UserId::generate(), GroupId::generate(), "x").into());
        assert!(matches!(result, Err(ChatError::Transport(TransportError::Closed))));
    }
}
