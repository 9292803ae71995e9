//! Durability/replay layer
//!
//! A pass-through contract on the transport's retained history: the
//! [`HistoryCache`] is what a transport keeps per key, and the
//! [`ReplayPolicy`] decides which retained chat messages a late joiner's
//! workers hand to the filter.

mod history;
mod replay;

pub use history::HistoryCache;
pub use replay::{ReplayGate, ReplayPolicy};
