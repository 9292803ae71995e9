//! User and group records as held in the membership mirror and carried by
//! announcements.

use super::types::{GroupId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A chat participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    /// Groups this user belongs to
    #[serde(default)]
    pub group_ids: BTreeSet<GroupId>,
}

impl User {
    /// Create a user with no group memberships
    pub fn new(id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            group_ids: BTreeSet::new(),
        }
    }

    pub fn is_in(&self, group_id: &GroupId) -> bool {
        self.group_ids.contains(group_id)
    }
}

/// A named set of users that messages are addressed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    /// Users belonging to this group
    #[serde(default)]
    pub member_ids: BTreeSet<UserId>,
}

impl Group {
    /// Create a group with no members
    pub fn new(id: GroupId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            member_ids: BTreeSet::new(),
        }
    }

    pub fn has_member(&self, user_id: &UserId) -> bool {
        self.member_ids.contains(user_id)
    }
}
