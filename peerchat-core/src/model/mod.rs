//! Message envelope model
//!
//! Plain data: identifiers, user/group records, and the three envelope kinds
//! exchanged over the distribution channel.

pub mod entities;
pub mod envelope;
pub mod types;

pub use entities::{Group, User};
pub use envelope::{Announcement, ChatMessage, CodecError, Envelope, EnvelopeKind, HistoryKey};
pub use types::{GroupId, MessageId, UserId, MAX_BODY_LEN, MAX_NAME_LEN};
