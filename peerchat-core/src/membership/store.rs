//! Identity & membership store
//!
//! The local, authoritative view of every known user and group. All
//! mutations go through [`MembershipStore`], which swaps in a new
//! [`MembershipSnapshot`] in one step. Readers clone the current snapshot
//! `Arc` and never hold a lock while inspecting it, so a filtering worker
//! either sees an update fully applied or not at all.

use super::snapshot::{ApplyOutcome, MembershipSnapshot};
use crate::error::{ChatError, ChatResult};
use crate::model::{Announcement, Group, GroupId, User, UserId, MAX_NAME_LEN};
use std::sync::{Arc, RwLock};
use tracing::{debug, trace};

/// Outcome of [`MembershipStore::add_user_to_group`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    /// User state after the change
    pub user: User,
    /// Group state after the change
    pub group: Group,
    /// False when the user already belonged to the group
    pub changed: bool,
}

/// Copy-on-write membership mirror
#[derive(Debug, Default)]
pub struct MembershipStore {
    state: RwLock<Arc<MembershipSnapshot>>,
}

impl MembershipStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current consistent view
    pub fn snapshot(&self) -> Arc<MembershipSnapshot> {
        let guard = self.state.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Run `f` against a private copy of the state and publish the result
    ///
    /// `Arc::make_mut` only clones when some reader still holds the
    /// previous snapshot.
    fn update<R>(&self, f: impl FnOnce(&mut MembershipSnapshot) -> R) -> R {
        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        f(Arc::make_mut(&mut guard))
    }

    /// Register a new user with no group memberships
    pub fn create_user(&self, display_name: &str) -> ChatResult<User> {
        validate_name("user name", display_name)?;
        let user = User::new(UserId::generate(), display_name);
        self.update(|s| s.insert_user(user.clone()));
        debug!(user_id = %user.id, name = %user.display_name, "Created user");
        Ok(user)
    }

    /// Register a new, empty group
    pub fn create_group(&self, name: &str) -> ChatResult<Group> {
        validate_name("group name", name)?;
        let group = Group::new(GroupId::generate(), name);
        self.update(|s| s.insert_group(group.clone()));
        debug!(group_id = %group.id, name = %group.name, "Created group");
        Ok(group)
    }

    /// Add a user to a group; adding an existing member is a no-op
    pub fn add_user_to_group(&self, user_id: &UserId, group_id: &GroupId) -> ChatResult<Membership> {
        self.update(|s| {
            if s.user(user_id).is_none() {
                return Err(ChatError::UserNotFound(*user_id));
            }
            if s.group(group_id).is_none() {
                return Err(ChatError::GroupNotFound(*group_id));
            }

            let changed = s.link(*user_id, *group_id).changed();
            let user = s.user(user_id).cloned().ok_or(ChatError::UserNotFound(*user_id))?;
            let group = s.group(group_id).cloned().ok_or(ChatError::GroupNotFound(*group_id))?;
            Ok(Membership { user, group, changed })
        })
    }

    /// Idempotent upsert of an announcement received from the channel
    pub fn apply(&self, announcement: &Announcement) -> ApplyOutcome {
        let outcome = self.update(|s| s.apply(announcement));
        match announcement {
            Announcement::User(user) => {
                trace!(user_id = %user.id, ?outcome, "Applied user announcement")
            }
            Announcement::Group(group) => {
                trace!(group_id = %group.id, ?outcome, "Applied group announcement")
            }
        }
        outcome
    }

    pub fn user(&self, user_id: &UserId) -> ChatResult<User> {
        self.snapshot()
            .user(user_id)
            .cloned()
            .ok_or(ChatError::UserNotFound(*user_id))
    }

    pub fn group(&self, group_id: &GroupId) -> ChatResult<Group> {
        self.snapshot()
            .group(group_id)
            .cloned()
            .ok_or(ChatError::GroupNotFound(*group_id))
    }

    pub fn contains_user(&self, user_id: &UserId) -> bool {
        self.snapshot().user(user_id).is_some()
    }

    pub fn contains_group(&self, group_id: &GroupId) -> bool {
        self.snapshot().group(group_id).is_some()
    }

    pub fn is_member(&self, user_id: &UserId, group_id: &GroupId) -> bool {
        self.snapshot().is_member(user_id, group_id)
    }

    /// All known users in insertion order
    pub fn list_users(&self) -> Vec<User> {
        self.snapshot().users().cloned().collect()
    }

    /// All known groups in insertion order
    pub fn list_groups(&self) -> Vec<Group> {
        self.snapshot().groups().cloned().collect()
    }

    /// Groups a user belongs to, in group insertion order
    pub fn groups_of(&self, user_id: &UserId) -> ChatResult<Vec<Group>> {
        let snap = self.snapshot();
        let user = snap.user(user_id).ok_or(ChatError::UserNotFound(*user_id))?;
        Ok(snap
            .groups()
            .filter(|g| user.is_in(&g.id))
            .cloned()
            .collect())
    }

    /// Members of a group, in user insertion order
    pub fn members_of(&self, group_id: &GroupId) -> ChatResult<Vec<User>> {
        let snap = self.snapshot();
        let group = snap.group(group_id).ok_or(ChatError::GroupNotFound(*group_id))?;
        Ok(snap
            .users()
            .filter(|u| group.has_member(&u.id))
            .cloned()
            .collect())
    }
}

fn validate_name(what: &str, name: &str) -> ChatResult<()> {
    if name.len() > MAX_NAME_LEN {
        return Err(ChatError::InvalidInput(format!(
            "{} exceeds {} bytes",
            what, MAX_NAME_LEN
        )));
    }
    Ok(())
}
