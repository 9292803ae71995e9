//! Identity & membership store
//!
//! Holds the peer-local mirror of users, groups and their many-to-many
//! membership relation.

mod snapshot;
mod store;

pub use snapshot::{ApplyOutcome, MembershipSnapshot};
pub use store::{Membership, MembershipStore};
