//! Delivery predicate for chat messages
//!
//! Evaluated per local user against the local mirror at evaluation time.
//! The mirror may briefly lag global truth: a message that arrives before
//! the announcement making its recipient a member is dropped as
//! `NotMember` and is not redelivered later.

use super::inbox::Inbox;
use crate::model::{ChatMessage, User};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether a user receives the messages they authored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelfEcho {
    /// Deliver own messages back, e.g. as multi-device confirmation
    Deliver,
    #[default]
    Suppress,
}

impl FromStr for SelfEcho {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deliver" | "on" | "true" => Ok(SelfEcho::Deliver),
            "suppress" | "off" | "false" => Ok(SelfEcho::Suppress),
            other => Err(format!("unknown self-echo mode: {}", other)),
        }
    }
}

impl fmt::Display for SelfEcho {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelfEcho::Deliver => f.write_str("deliver"),
            SelfEcho::Suppress => f.write_str("suppress"),
        }
    }
}

/// Configurable part of the predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterPolicy {
    pub self_echo: SelfEcho,
}

impl FilterPolicy {
    pub fn new(self_echo: SelfEcho) -> Self {
        Self { self_echo }
    }
}

/// Why a message did not reach an inbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Already delivered (at-least-once redelivery)
    Duplicate,
    /// Recipient is not a member of the target group in the local mirror
    NotMember,
    /// Recipient authored the message and self-echo is suppressed
    SelfEcho,
    /// Retained message excluded by the replay policy
    NotReplayable,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::Duplicate => "duplicate",
            DropReason::NotMember => "not_member",
            DropReason::SelfEcho => "self_echo",
            DropReason::NotReplayable => "not_replayable",
        }
    }
}

/// Result of evaluating the predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Deliver,
    Drop(DropReason),
}

/// Decide whether `msg` belongs in `recipient`'s inbox
///
/// `recipient` is the user as currently seen by the local mirror; `None`
/// means the mirror does not know the user, which gates everything.
pub fn evaluate(
    msg: &ChatMessage,
    recipient: Option<&User>,
    inbox: &Inbox,
    policy: &FilterPolicy,
) -> Verdict {
    if inbox.contains(&msg.id) {
        return Verdict::Drop(DropReason::Duplicate);
    }
    let Some(user) = recipient else {
        return Verdict::Drop(DropReason::NotMember);
    };
    if !user.is_in(&msg.group_id) {
        return Verdict::Drop(DropReason::NotMember);
    }
    if policy.self_echo == SelfEcho::Suppress && msg.sender_id == user.id {
        return Verdict::Drop(DropReason::SelfEcho);
    }
    Verdict::Deliver
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GroupId, UserId};

    fn member_of(group: GroupId) -> User {
        let mut user = User::new(UserId::generate(), "member");
        user.group_ids.insert(group);
        user
    }

    #[test]
    fn test_member_receives_message() {
        let group = GroupId::generate();
        let user = member_of(group);
        let msg = ChatMessage::new(UserId::generate(), group, "hi");
        let verdict = evaluate(&msg, Some(&user), &Inbox::new(), &FilterPolicy::default());
        assert_eq!(verdict, Verdict::Deliver);
    }

    #[test]
    fn test_non_member_is_gated() {
        let user = member_of(GroupId::generate());
        let msg = ChatMessage::new(UserId::generate(), GroupId::generate(), "hi");
        let policy = FilterPolicy::default();
        assert_eq!(
            evaluate(&msg, Some(&user), &Inbox::new(), &policy),
            Verdict::Drop(DropReason::NotMember)
        );
        assert_eq!(
            evaluate(&msg, None, &Inbox::new(), &policy),
            Verdict::Drop(DropReason::NotMember)
        );
    }

    #[test]
    fn test_duplicate_checked_first() {
        let group = GroupId::generate();
        let user = member_of(group);
        let msg = ChatMessage::new(UserId::generate(), group, "hi");
        let mut inbox = Inbox::new();
        inbox.deliver(msg.clone());

        assert_eq!(
            evaluate(&msg, Some(&user), &inbox, &FilterPolicy::default()),
            Verdict::Drop(DropReason::Duplicate)
        );
    }

    #[test]
    fn test_self_echo_policy() {
        let group = GroupId::generate();
        let user = member_of(group);
        let own = ChatMessage::new(user.id, group, "mine");

        let suppress = FilterPolicy::new(SelfEcho::Suppress);
        let deliver = FilterPolicy::new(SelfEcho::Deliver);
        assert_eq!(
            evaluate(&own, Some(&user), &Inbox::new(), &suppress),
            Verdict::Drop(DropReason::SelfEcho)
        );
        assert_eq!(evaluate(&own, Some(&user), &Inbox::new(), &deliver), Verdict::Deliver);

        // Self-echo never bypasses membership gating
        let elsewhere = ChatMessage::new(user.id, GroupId::generate(), "stray");
        assert_eq!(
            evaluate(&elsewhere, Some(&user), &Inbox::new(), &deliver),
            Verdict::Drop(DropReason::NotMember)
        );
    }

    #[test]
    fn test_self_echo_from_str() {
        assert_eq!("deliver".parse::<SelfEcho>(), Ok(SelfEcho::Deliver));
        assert_eq!("OFF".parse::<SelfEcho>(), Ok(SelfEcho::Suppress));
        assert!("maybe".parse::<SelfEcho>().is_err());
    }
}
