/*
    snapshot.rs - Immutable view of the membership mirror

    A snapshot holds every known user and group in insertion order plus the
    memberships that were announced before one of their two endpoints was
    known locally. Pending memberships are materialised as soon as the
    missing entity arrives, which keeps `Group::member_ids` restricted to
    users present in the same mirror.
*/

use crate::model::{Announcement, Group, GroupId, User, UserId};
use hashlink::LinkedHashMap;
use std::collections::BTreeSet;

/// Result of applying an announcement or a local mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The entity was not known before
    Inserted,
    /// The entity existed and some field changed
    Updated,
    /// Nothing changed
    Unchanged,
}

impl ApplyOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self, ApplyOutcome::Unchanged)
    }

    fn merge(self, other: ApplyOutcome) -> ApplyOutcome {
        match (self, other) {
            (ApplyOutcome::Inserted, _) | (_, ApplyOutcome::Inserted) => ApplyOutcome::Inserted,
            (ApplyOutcome::Updated, _) | (_, ApplyOutcome::Updated) => ApplyOutcome::Updated,
            _ => ApplyOutcome::Unchanged,
        }
    }
}

/// Point-in-time state of the mirror
#[derive(Debug, Clone, Default)]
pub struct MembershipSnapshot {
    users: LinkedHashMap<UserId, User>,
    groups: LinkedHashMap<GroupId, Group>,
    pending: BTreeSet<(UserId, GroupId)>,
}

impl MembershipSnapshot {
    pub fn user(&self, id: &UserId) -> Option<&User> {
        self.users.get(id)
    }

    pub fn group(&self, id: &GroupId) -> Option<&Group> {
        self.groups.get(id)
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Memberships waiting for an unknown user or group
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_member(&self, user_id: &UserId, group_id: &GroupId) -> bool {
        self.users
            .get(user_id)
            .map(|u| u.is_in(group_id))
            .unwrap_or(false)
    }

    /// Users and groups sorted by id
    ///
    /// Insertion order depends on arrival order, which differs between
    /// peers; this view does not, so two converged mirrors compare equal.
    pub fn canonical(&self) -> (Vec<User>, Vec<Group>) {
        let mut users: Vec<User> = self.users.values().cloned().collect();
        let mut groups: Vec<Group> = self.groups.values().cloned().collect();
        users.sort_by_key(|u| u.id);
        groups.sort_by_key(|g| g.id);
        (users, groups)
    }

    pub(crate) fn insert_user(&mut self, user: User) {
        let id = user.id;
        self.users.insert(id, User::new(id, user.display_name));
        for group_id in user.group_ids {
            self.link(id, group_id);
        }
        self.resolve_pending_for_user(id);
    }

    pub(crate) fn insert_group(&mut self, group: Group) {
        let id = group.id;
        self.groups.insert(id, Group::new(id, group.name));
        for user_id in group.member_ids {
            self.link(user_id, id);
        }
        self.resolve_pending_for_group(id);
    }

    /// Record that `user_id` belongs to `group_id`
    ///
    /// Links both sides when both are known, otherwise parks the pair.
    pub(crate) fn link(&mut self, user_id: UserId, group_id: GroupId) -> ApplyOutcome {
        let both_known = self.users.contains_key(&user_id) && self.groups.contains_key(&group_id);
        if !both_known {
            return if self.pending.insert((user_id, group_id)) {
                ApplyOutcome::Updated
            } else {
                ApplyOutcome::Unchanged
            };
        }

        let mut outcome = ApplyOutcome::Unchanged;
        if let Some(user) = self.users.get_mut(&user_id) {
            if user.group_ids.insert(group_id) {
                outcome = ApplyOutcome::Updated;
            }
        }
        if let Some(group) = self.groups.get_mut(&group_id) {
            if group.member_ids.insert(user_id) {
                outcome = ApplyOutcome::Updated;
            }
        }
        outcome
    }

    /// Idempotent upsert of an announced entity
    ///
    /// Set-valued fields merge by union and names take the announced value,
    /// so re-applying an announcement is a no-op and application order does
    /// not change the converged state.
    pub(crate) fn apply(&mut self, announcement: &Announcement) -> ApplyOutcome {
        match announcement {
            Announcement::User(user) => self.apply_user(user),
            Announcement::Group(group) => self.apply_group(group),
        }
    }

    fn apply_user(&mut self, announced: &User) -> ApplyOutcome {
        let id = announced.id;
        let mut outcome = match self.users.get_mut(&id) {
            None => {
                self.insert_user(announced.clone());
                return ApplyOutcome::Inserted;
            }
            Some(existing) if existing.display_name != announced.display_name => {
                existing.display_name = announced.display_name.clone();
                ApplyOutcome::Updated
            }
            Some(_) => ApplyOutcome::Unchanged,
        };
        for group_id in &announced.group_ids {
            outcome = outcome.merge(self.link(id, *group_id));
        }
        outcome
    }

    fn apply_group(&mut self, announced: &Group) -> ApplyOutcome {
        let id = announced.id;
        let mut outcome = match self.groups.get_mut(&id) {
            None => {
                self.insert_group(announced.clone());
                return ApplyOutcome::Inserted;
            }
            Some(existing) if existing.name != announced.name => {
                existing.name = announced.name.clone();
                ApplyOutcome::Updated
            }
            Some(_) => ApplyOutcome::Unchanged,
        };
        for user_id in &announced.member_ids {
            outcome = outcome.merge(self.link(*user_id, id));
        }
        outcome
    }

    fn resolve_pending_for_user(&mut self, user_id: UserId) {
        let ready: Vec<(UserId, GroupId)> = self
            .pending
            .iter()
            .filter(|(u, g)| *u == user_id && self.groups.contains_key(g))
            .copied()
            .collect();
        self.materialise(ready);
    }

    fn resolve_pending_for_group(&mut self, group_id: GroupId) {
        let ready: Vec<(UserId, GroupId)> = self
            .pending
            .iter()
            .filter(|(u, g)| *g == group_id && self.users.contains_key(u))
            .copied()
            .collect();
        self.materialise(ready);
    }

    fn materialise(&mut self, ready: Vec<(UserId, GroupId)>) {
        for (user_id, group_id) in ready {
            self.pending.remove(&(user_id, group_id));
            self.link(user_id, group_id);
        }
    }
}
