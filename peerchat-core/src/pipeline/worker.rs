//! Polling workers
//!
//! Each worker is a tokio task owning one [`Subscription`]. Between
//! iterations it waits for either the poll delay or the shutdown signal,
//! whichever comes first. Read failures never end a worker; they only
//! stretch the delay until the next attempt.

use super::filter::{evaluate, DropReason, FilterPolicy, Verdict};
use super::inbox::SharedInbox;
use crate::channel::{DistributionChannel, Received, SampleOrigin, Subscription, TransportError};
use crate::durability::{ReplayGate, ReplayPolicy};
use crate::membership::MembershipStore;
use crate::metrics as chat_metrics;
use crate::model::{Announcement, ChatMessage, UserId};
use crate::shutdown::ShutdownListener;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Delay schedule shared by every worker of a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerTiming {
    pub poll_interval: Duration,
    pub max_backoff: Duration,
}

impl WorkerTiming {
    pub fn new(poll_interval: Duration, max_backoff: Duration) -> Self {
        Self {
            poll_interval,
            max_backoff: max_backoff.max(poll_interval),
        }
    }

    /// Delay before the next poll after `failures` consecutive read errors
    pub fn delay_after(&self, failures: u32) -> Duration {
        if failures == 0 {
            return self.poll_interval;
        }
        let factor = 1u32.checked_shl(failures.min(16)).unwrap_or(u32::MAX);
        self.poll_interval.saturating_mul(factor).min(self.max_backoff)
    }
}

/// What one poll iteration did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    pub applied: usize,
    pub delivered: usize,
    pub dropped: usize,
}

impl PollStats {
    pub fn is_idle(&self) -> bool {
        self.applied == 0 && self.delivered == 0 && self.dropped == 0
    }
}

/// One unit of polling work driven by [`run_worker`]
pub trait PollTask: Send + 'static {
    /// Name used in log fields
    fn label(&self) -> String;

    /// Drain the subscription once
    fn poll_once(&mut self) -> Result<PollStats, TransportError>;

    /// Release the subscription
    fn close(&mut self);
}

/// Drive `task` until shutdown is signalled
pub async fn run_worker<T: PollTask>(mut task: T, timing: WorkerTiming, mut shutdown: ShutdownListener) {
    let label = task.label();
    debug!(worker = %label, "Worker started");
    chat_metrics::worker_started();

    let mut failures: u32 = 0;
    loop {
        if shutdown.is_triggered() {
            break;
        }

        match task.poll_once() {
            Ok(stats) => {
                if failures > 0 {
                    debug!(worker = %label, failures, "Subscription read recovered");
                }
                failures = 0;
                if !stats.is_idle() {
                    trace!(
                        worker = %label,
                        applied = stats.applied,
                        delivered = stats.delivered,
                        dropped = stats.dropped,
                        "Poll iteration"
                    );
                }
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                chat_metrics::transport_read_error();
                warn!(
                    worker = %label,
                    error = %e,
                    transient = e.is_transient(),
                    failures,
                    retry_in = ?timing.delay_after(failures),
                    "Subscription read failed"
                );
            }
        }

        tokio::select! {
            _ = shutdown.recv() => break,
            _ = tokio::time::sleep(timing.delay_after(failures)) => {}
        }
    }

    task.close();
    chat_metrics::worker_stopped();
    debug!(worker = %label, "Worker stopped");
}

/// Applies announcements and filters chat messages for one local user
#[derive(Debug)]
pub struct UserWorker {
    user_id: UserId,
    subscription: Subscription,
    store: Arc<MembershipStore>,
    inbox: SharedInbox,
    policy: FilterPolicy,
    gate: ReplayGate,
}

impl UserWorker {
    /// Open the user's subscription
    ///
    /// The replay gate captures the user's memberships as the mirror knows
    /// them at this instant.
    pub fn new(
        user_id: UserId,
        channel: &DistributionChannel,
        store: Arc<MembershipStore>,
        inbox: SharedInbox,
        policy: FilterPolicy,
        replay: ReplayPolicy,
    ) -> Self {
        let snapshot = store.snapshot();
        let gate = ReplayGate::open(replay, snapshot.user(&user_id));
        Self {
            user_id,
            subscription: channel.subscribe(),
            store,
            inbox,
            policy,
            gate,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    fn consider(&self, msg: ChatMessage, origin: SampleOrigin, stats: &mut PollStats) {
        if !self.gate.admits(origin, &msg) {
            self.record_drop(&msg, DropReason::NotReplayable, stats);
            return;
        }

        // Evaluated against the mirror as it stands right now
        let snapshot = self.store.snapshot();
        let mut inbox = self.inbox.lock();
        match evaluate(&msg, snapshot.user(&self.user_id), &inbox, &self.policy) {
            Verdict::Deliver => {
                debug!(
                    user_id = %self.user_id,
                    message_id = %msg.id,
                    group_id = %msg.group_id,
                    "Delivered message"
                );
                inbox.deliver(msg);
                chat_metrics::inbox_delivered();
                stats.delivered += 1;
            }
            Verdict::Drop(reason) => {
                drop(inbox);
                self.record_drop(&msg, reason, stats);
            }
        }
    }

    fn record_drop(&self, msg: &ChatMessage, reason: DropReason, stats: &mut PollStats) {
        trace!(
            user_id = %self.user_id,
            message_id = %msg.id,
            reason = reason.as_str(),
            "Dropped message"
        );
        chat_metrics::inbox_dropped(reason.as_str());
        stats.dropped += 1;
    }
}

impl PollTask for UserWorker {
    fn label(&self) -> String {
        format!("user:{}", self.user_id)
    }

    fn poll_once(&mut self) -> Result<PollStats, TransportError> {
        let mut stats = PollStats::default();
        for Received { envelope, origin, .. } in self.subscription.take()? {
            match envelope.into_payload() {
                Ok(msg) => self.consider(msg, origin, &mut stats),
                Err(announcement) => apply_announcement(&self.store, &announcement, &mut stats),
            }
        }
        Ok(stats)
    }

    fn close(&mut self) {
        self.subscription.close();
    }
}

/// Keeps the mirror converging even when a peer hosts no users
#[derive(Debug)]
pub struct MirrorWorker {
    subscription: Subscription,
    store: Arc<MembershipStore>,
}

impl MirrorWorker {
    pub fn new(channel: &DistributionChannel, store: Arc<MembershipStore>) -> Self {
        Self {
            subscription: channel.subscribe(),
            store,
        }
    }
}

impl PollTask for MirrorWorker {
    fn label(&self) -> String {
        "mirror".to_string()
    }

    fn poll_once(&mut self) -> Result<PollStats, TransportError> {
        let mut stats = PollStats::default();
        for received in self.subscription.take()? {
            if let Err(announcement) = received.envelope.into_payload() {
                apply_announcement(&self.store, &announcement, &mut stats);
            }
        }
        Ok(stats)
    }

    fn close(&mut self) {
        self.subscription.close();
    }
}

fn apply_announcement(store: &MembershipStore, announcement: &Announcement, stats: &mut PollStats) {
    if store.apply(announcement).changed() {
        stats.applied += 1;
    }
}
