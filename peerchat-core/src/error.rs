//! Error types for the control surface

use crate::channel::TransportError;
use crate::config::ConfigError;
use crate::model::{CodecError, GroupId, UserId};
use thiserror::Error;

/// Result type for peerchat operations
pub type ChatResult<T> = Result<T, ChatError>;

/// Errors returned to callers of the control surface
#[derive(Error, Debug)]
pub enum ChatError {
    /// Referenced user is unknown to the local mirror
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// Referenced group is unknown to the local mirror
    #[error("Group not found: {0}")]
    GroupNotFound(GroupId),

    /// User is known to the mirror but has no inbox on this peer
    #[error("User {0} is not hosted on this peer")]
    NotLocal(UserId),

    /// Sender is not a member of the target group
    #[error("User {user} is not a member of group {group}")]
    NotAMember { user: UserId, group: GroupId },

    /// Caller-supplied value rejected before anything was published
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The distribution channel rejected the operation
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The peer was started with an invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The peer has already been shut down
    #[error("Peer is shut down")]
    ShutDown,
}

impl ChatError {
    /// Whether this is one of the unknown-id errors
    pub fn is_not_found(&self) -> bool {
        matches!(self, ChatError::UserNotFound(_) | ChatError::GroupNotFound(_))
    }
}
