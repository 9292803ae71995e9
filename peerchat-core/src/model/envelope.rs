//! Wire-level envelopes carried over the distribution channel
//!
//! Three kinds share one topic. The JSON encoding carries an internal
//! `kind` tag so a receiver can dispatch without ambiguity:
//!
//! ```text
//! {"kind":"user_announcement","user":{...}}
//! {"kind":"group_announcement","group":{...}}
//! {"kind":"chat_message","id":"...","sender_id":"...","group_id":"...","body":"..."}
//! ```

use super::entities::{Group, User};
use super::types::{GroupId, MessageId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;
use uuid::Uuid;

/// Envelope (de)serialization failure
#[derive(Debug, Error)]
#[error("Envelope codec error: {0}")]
pub struct CodecError(#[from] serde_json::Error);

/// A chat message addressed to a group
///
/// Immutable once published. Two messages are the same message when their
/// ids match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub sender_id: UserId,
    pub group_id: GroupId,
    pub body: String,
}

impl ChatMessage {
    /// Create a message with a freshly generated id
    pub fn new(sender_id: UserId, group_id: GroupId, body: impl Into<String>) -> Self {
        Self {
            id: MessageId::generate(),
            sender_id,
            group_id,
            body: body.into(),
        }
    }
}

impl PartialEq for ChatMessage {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ChatMessage {}

impl Hash for ChatMessage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Membership announcement payloads
///
/// Announcements carry the full current state of one entity so that
/// applying them is an idempotent upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Announcement {
    User(User),
    Group(Group),
}

impl Announcement {
    pub fn into_envelope(self) -> Envelope {
        match self {
            Announcement::User(user) => Envelope::UserAnnouncement { user },
            Announcement::Group(group) => Envelope::GroupAnnouncement { group },
        }
    }
}

/// Envelope discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    UserAnnouncement,
    GroupAnnouncement,
    ChatMessage,
}

impl EnvelopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvelopeKind::UserAnnouncement => "user_announcement",
            EnvelopeKind::GroupAnnouncement => "group_announcement",
            EnvelopeKind::ChatMessage => "chat_message",
        }
    }
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retention key: the transport keeps a bounded history per distinct key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HistoryKey {
    pub kind: EnvelopeKind,
    pub sender: Option<Uuid>,
    pub group: Option<GroupId>,
}

/// The unit of distribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Envelope {
    UserAnnouncement { user: User },
    GroupAnnouncement { group: Group },
    ChatMessage(ChatMessage),
}

impl Envelope {
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Envelope::UserAnnouncement { .. } => EnvelopeKind::UserAnnouncement,
            Envelope::GroupAnnouncement { .. } => EnvelopeKind::GroupAnnouncement,
            Envelope::ChatMessage(_) => EnvelopeKind::ChatMessage,
        }
    }

    /// The `(kind, sender, group)` key this envelope is retained under
    pub fn history_key(&self) -> HistoryKey {
        match self {
            Envelope::UserAnnouncement { user } => HistoryKey {
                kind: EnvelopeKind::UserAnnouncement,
                sender: Some(user.id.0),
                group: None,
            },
            Envelope::GroupAnnouncement { group } => HistoryKey {
                kind: EnvelopeKind::GroupAnnouncement,
                sender: None,
                group: Some(group.id),
            },
            Envelope::ChatMessage(msg) => HistoryKey {
                kind: EnvelopeKind::ChatMessage,
                sender: Some(msg.sender_id.0),
                group: Some(msg.group_id),
            },
        }
    }

    /// Split into an announcement or a chat message
    pub fn into_payload(self) -> Result<ChatMessage, Announcement> {
        match self {
            Envelope::UserAnnouncement { user } => Err(Announcement::User(user)),
            Envelope::GroupAnnouncement { group } => Err(Announcement::Group(group)),
            Envelope::ChatMessage(msg) => Ok(msg),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl From<ChatMessage> for Envelope {
    fn from(msg: ChatMessage) -> Self {
        Envelope::ChatMessage(msg)
    }
}

impl From<Announcement> for Envelope {
    fn from(announcement: Announcement) -> Self {
        announcement.into_envelope()
    }
}
