/*
    types.rs - Identifier types shared by every peerchat component

    Defines:
    - UserId, GroupId, MessageId (UUID v4 newtypes)
    - Length limits for names and message bodies
*/

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Maximum length in bytes of a user display name or group name
pub const MAX_NAME_LEN: usize = 64;

/// Maximum length in bytes of a chat message body
pub const MAX_BODY_LEN: usize = 2048;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new(id: Uuid) -> Self {
                $name(id)
            }

            /// Generate a fresh random identifier
            pub fn generate() -> Self {
                $name(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map($name)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                $name(id)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a chat user
    UserId
);

uuid_id!(
    /// Unique identifier for a chat group
    GroupId
);

uuid_id!(
    /// Unique identifier for a published chat message
    MessageId
);
