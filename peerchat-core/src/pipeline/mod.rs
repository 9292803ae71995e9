//! Per-user filtering pipeline
//!
//! Every local user owns a worker that reads the shared channel, keeps the
//! membership mirror current and decides which chat messages reach the
//! user's inbox.

mod filter;
mod inbox;
mod worker;

pub use filter::{evaluate, DropReason, FilterPolicy, SelfEcho, Verdict};
pub use inbox::{Inbox, SharedInbox};
pub use worker::{run_worker, MirrorWorker, PollStats, PollTask, UserWorker, WorkerTiming};
