//! Metrics for the bus and the filtering pipeline
//!
//! Counters are recorded through the `metrics` facade; without an installed
//! recorder they are no-ops.

use crate::model::EnvelopeKind;
use metrics::{counter, describe_counter, describe_gauge, gauge};

pub const ENVELOPES_PUBLISHED: &str = "peerchat.envelopes.published";
pub const ENVELOPES_RECEIVED: &str = "peerchat.envelopes.received";
pub const INBOX_DELIVERED: &str = "peerchat.inbox.delivered";
pub const INBOX_DROPPED: &str = "peerchat.inbox.dropped";
pub const TRANSPORT_READ_ERRORS: &str = "peerchat.transport.read_errors";
pub const WORKERS_ACTIVE: &str = "peerchat.workers.active";

/// Register metric descriptions with the installed recorder
pub fn describe_metrics() {
    describe_counter!(ENVELOPES_PUBLISHED, "Envelopes accepted by the transport, by kind");
    describe_counter!(ENVELOPES_RECEIVED, "Envelopes decoded by subscriptions, by kind");
    describe_counter!(INBOX_DELIVERED, "Chat messages appended to a user inbox");
    describe_counter!(INBOX_DROPPED, "Chat messages rejected by the filter, by reason");
    describe_counter!(TRANSPORT_READ_ERRORS, "Failed subscription reads");
    describe_gauge!(WORKERS_ACTIVE, "Running per-user and mirror workers");
}

pub(crate) fn envelope_published(kind: EnvelopeKind) {
    counter!(ENVELOPES_PUBLISHED, "kind" => kind.as_str()).increment(1);
}

pub(crate) fn envelope_received(kind: EnvelopeKind) {
    counter!(ENVELOPES_RECEIVED, "kind" => kind.as_str()).increment(1);
}

pub(crate) fn inbox_delivered() {
    counter!(INBOX_DELIVERED).increment(1);
}

pub(crate) fn inbox_dropped(reason: &'static str) {
    counter!(INBOX_DROPPED, "reason" => reason).increment(1);
}

pub(crate) fn transport_read_error() {
    counter!(TRANSPORT_READ_ERRORS).increment(1);
}

pub(crate) fn worker_started() {
    gauge!(WORKERS_ACTIVE).increment(1.0);
}

pub(crate) fn worker_stopped() {
    gauge!(WORKERS_ACTIVE).decrement(1.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        describe_metrics();
        envelope_published(EnvelopeKind::ChatMessage);
        inbox_dropped("duplicate");
        worker_started();
        worker_stopped();
    }
}
