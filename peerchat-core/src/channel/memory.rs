//! In-process transport
//!
//! Every peer holding a clone of the same [`InMemoryTransport`] belongs to
//! one domain. Each reader owns a private queue; publishing appends the
//! sample to the topic history and to every open reader queue. Delivery is
//! lossless and ordered, so `Reliability::BestEffort` behaves like
//! `Reliable` here.
//!
//! Two fault hooks exist for exercising the at-least-once contract:
//! [`InMemoryTransport::fail_next_reads`] and
//! [`InMemoryTransport::redeliver_history`].

use super::qos::{Durability, QosProfile};
use super::transport::{Sample, SampleOrigin, Transport, TransportError, TransportReader};
use crate::durability::HistoryCache;
use crate::model::HistoryKey;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, trace};

/// Shared in-process publish/subscribe domain
#[derive(Clone)]
pub struct InMemoryTransport {
    inner: Arc<Inner>,
}

struct Inner {
    qos: QosProfile,
    topics: Mutex<HashMap<String, TopicState>>,
    closed: AtomicBool,
    failing_reads: AtomicUsize,
}

struct TopicState {
    next_seq: u64,
    history: HistoryCache,
    readers: Vec<Weak<ReaderQueue>>,
}

impl TopicState {
    fn new(qos: &QosProfile) -> Self {
        Self {
            next_seq: 0,
            history: HistoryCache::from_qos(qos),
            readers: Vec::new(),
        }
    }

    /// Push to every live reader, forgetting dropped ones
    fn fan_out(&mut self, sample: &Sample) {
        self.readers.retain(|weak| match weak.upgrade() {
            Some(queue) if queue.open.load(Ordering::Acquire) => {
                queue.push(sample.clone());
                true
            }
            _ => false,
        });
    }
}

struct ReaderQueue {
    pending: Mutex<VecDeque<Sample>>,
    open: AtomicBool,
}

impl ReaderQueue {
    fn push(&self, sample: Sample) {
        lock(&self.pending).push_back(sample);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl InMemoryTransport {
    /// Create an empty domain whose topics follow `qos`
    pub fn new(qos: QosProfile) -> Self {
        Self {
            inner: Arc::new(Inner {
                qos,
                topics: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
                failing_reads: AtomicUsize::new(0),
            }),
        }
    }

    pub fn qos(&self) -> &QosProfile {
        &self.inner.qos
    }

    /// Make the next `count` reader `take` calls fail with `Unavailable`
    pub fn fail_next_reads(&self, count: usize) {
        self.inner.failing_reads.fetch_add(count, Ordering::AcqRel);
    }

    /// Push every retained sample of `topic` to every open reader again,
    /// as a transport retransmission would
    pub fn redeliver_history(&self, topic: &str) -> usize {
        let mut topics = lock(&self.inner.topics);
        let Some(state) = topics.get_mut(topic) else {
            return 0;
        };
        let retained = state.history.replay();
        for sample in &retained {
            state.fan_out(&sample.with_origin(SampleOrigin::Live));
        }
        debug!(topic = %topic, samples = retained.len(), "Redelivered retained history");
        retained.len()
    }

    /// Number of samples currently retained for `topic`
    pub fn retained(&self, topic: &str) -> usize {
        lock(&self.inner.topics)
            .get(topic)
            .map(|s| s.history.len())
            .unwrap_or(0)
    }

    /// Number of open readers on `topic`
    pub fn reader_count(&self, topic: &str) -> usize {
        lock(&self.inner.topics)
            .get(topic)
            .map(|s| {
                s.readers
                    .iter()
                    .filter_map(Weak::upgrade)
                    .filter(|q| q.open.load(Ordering::Acquire))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Refuse further publications and detach every reader
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let mut topics = lock(&self.inner.topics);
        for state in topics.values_mut() {
            for queue in state.readers.drain(..).filter_map(|w| w.upgrade()) {
                queue.open.store(false, Ordering::Release);
            }
        }
        debug!("In-memory transport closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new(QosProfile::default())
    }
}

impl Transport for InMemoryTransport {
    fn publish(&self, topic: &str, key: HistoryKey, payload: Vec<u8>) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let mut topics = lock(&self.inner.topics);
        let state = topics
            .entry(topic.to_string())
            .or_insert_with(|| TopicState::new(&self.inner.qos));
        state.history.admit(&key)?;

        let sample = Sample {
            seq: state.next_seq,
            key,
            payload: Arc::from(payload),
            origin: SampleOrigin::Live,
        };
        state.next_seq += 1;
        state.history.retain(sample.clone())?;
        state.fan_out(&sample);

        trace!(topic = %topic, seq = sample.seq, kind = %key.kind, "Published sample");
        Ok(())
    }

    fn subscribe(&self, topic: &str, qos: &QosProfile) -> Box<dyn TransportReader> {
        let mut topics = lock(&self.inner.topics);
        let state = topics
            .entry(topic.to_string())
            .or_insert_with(|| TopicState::new(&self.inner.qos));

        let backlog: VecDeque<Sample> = match qos.durability {
            Durability::TransientLocal => state
                .history
                .replay()
                .into_iter()
                .map(|s| s.with_origin(SampleOrigin::History))
                .collect(),
            Durability::Volatile => VecDeque::new(),
        };
        debug!(topic = %topic, backlog = backlog.len(), "Opened reader");

        let queue = Arc::new(ReaderQueue {
            pending: Mutex::new(backlog),
            open: AtomicBool::new(!self.is_closed()),
        });
        state.readers.push(Arc::downgrade(&queue));

        Box::new(MemoryReader {
            queue,
            inner: Arc::clone(&self.inner),
        })
    }
}

struct MemoryReader {
    queue: Arc<ReaderQueue>,
    inner: Arc<Inner>,
}

impl TransportReader for MemoryReader {
    fn take(&mut self) -> Result<Vec<Sample>, TransportError> {
        if !self.queue.open.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let injected = self
            .inner
            .failing_reads
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(TransportError::Unavailable("injected read failure".to_string()));
        }
        Ok(lock(&self.queue.pending).drain(..).collect())
    }

    fn close(&mut self) {
        self.queue.open.store(false, Ordering::Release);
        lock(&self.queue.pending).clear();
    }
}

impl Drop for MemoryReader {
    fn drop(&mut self) {
        self.queue.open.store(false, Ordering::Release);
    }
}
