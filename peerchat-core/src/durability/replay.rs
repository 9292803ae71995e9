//! Replay policy for late joiners
//!
//! Retained announcements are always applied since the mirror cannot be
//! correct without them. Retained chat messages are only handed to the
//! filter when the policy allows it. Live traffic is never gated here.

use crate::channel::SampleOrigin;
use crate::model::{ChatMessage, GroupId, User};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Which historical chat messages a new subscriber may receive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayPolicy {
    /// Every retained message, subject to the normal filter
    All,
    /// Only messages of groups the user belonged to when subscribing
    #[default]
    MemberGroups,
    /// No historical chat messages
    #[serde(rename = "none", alias = "disabled")]
    Disabled,
}

impl FromStr for ReplayPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(ReplayPolicy::All),
            "member_groups" | "member-groups" => Ok(ReplayPolicy::MemberGroups),
            "none" | "disabled" => Ok(ReplayPolicy::Disabled),
            other => Err(format!("unknown replay policy: {}", other)),
        }
    }
}

impl fmt::Display for ReplayPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReplayPolicy::All => "all",
            ReplayPolicy::MemberGroups => "member_groups",
            ReplayPolicy::Disabled => "none",
        };
        f.write_str(s)
    }
}

/// Replay decision for one subscription, fixed when it is opened
#[derive(Debug, Clone)]
pub struct ReplayGate {
    policy: ReplayPolicy,
    groups_at_subscribe: BTreeSet<GroupId>,
}

impl ReplayGate {
    /// Capture the user's memberships at subscribe time
    pub fn open(policy: ReplayPolicy, user: Option<&User>) -> Self {
        Self {
            policy,
            groups_at_subscribe: user.map(|u| u.group_ids.clone()).unwrap_or_default(),
        }
    }

    pub fn policy(&self) -> ReplayPolicy {
        self.policy
    }

    /// Whether a chat message may proceed to the filter
    pub fn admits(&self, origin: SampleOrigin, msg: &ChatMessage) -> bool {
        if origin == SampleOrigin::Live {
            return true;
        }
        match self.policy {
            ReplayPolicy::All => true,
            ReplayPolicy::MemberGroups => self.groups_at_subscribe.contains(&msg.group_id),
            ReplayPolicy::Disabled => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UserId;

    #[test]
    fn test_live_traffic_always_admitted() {
        let msg = ChatMessage::new(UserId::generate(), GroupId::generate(), "live");
        for policy in [ReplayPolicy::All, ReplayPolicy::MemberGroups, ReplayPolicy::Disabled] {
            let gate = ReplayGate::open(policy, None);
            assert!(gate.admits(SampleOrigin::Live, &msg));
        }
    }

    #[test]
    fn test_member_groups_uses_memberships_at_open() {
        let joined = GroupId::generate();
        let later = GroupId::generate();
        let mut user = User::new(UserId::generate(), "alice");
        user.group_ids.insert(joined);

        let gate = ReplayGate::open(ReplayPolicy::MemberGroups, Some(&user));
        let old_joined = ChatMessage::new(UserId::generate(), joined, "a");
        let old_later = ChatMessage::new(UserId::generate(), later, "b");

        assert!(gate.admits(SampleOrigin::History, &old_joined));
        assert!(!gate.admits(SampleOrigin::History, &old_later));
    }

    #[test]
    fn test_all_and_disabled() {
        let msg = ChatMessage::new(UserId::generate(), GroupId::generate(), "old");
        assert!(ReplayGate::open(ReplayPolicy::All, None).admits(SampleOrigin::History, &msg));
        assert!(!ReplayGate::open(ReplayPolicy::Disabled, None).admits(SampleOrigin::History, &msg));
    }

    #[test]
    fn test_policy_parse_and_display() {
        for policy in [ReplayPolicy::All, ReplayPolicy::MemberGroups, ReplayPolicy::Disabled] {
            assert_eq!(policy.to_string().parse::<ReplayPolicy>(), Ok(policy));
        }
        assert_eq!(ReplayPolicy::Disabled.to_string(), "none");
        assert_eq!("disabled".parse::<ReplayPolicy>(), Ok(ReplayPolicy::Disabled));
        assert!("some".parse::<ReplayPolicy>().is_err());
    }

    #[test]
    fn test_policy_serde_matches_display() {
        for policy in [ReplayPolicy::All, ReplayPolicy::MemberGroups, ReplayPolicy::Disabled] {
            let json = serde_json::to_string(&policy).unwrap();
            assert_eq!(json, format!("\"{}\"", policy));
            assert_eq!(serde_json::from_str::<ReplayPolicy>(&json).unwrap(), policy);
        }
        assert_eq!(
            serde_json::from_str::<ReplayPolicy>("\"disabled\"").unwrap(),
            ReplayPolicy::Disabled
        );
    }
}
