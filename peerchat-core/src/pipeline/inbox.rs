//! Per-user inbox with id-based deduplication

use crate::model::{ChatMessage, MessageId};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Messages delivered to one local user
///
/// Every id ever delivered is remembered, so a redelivered envelope can
/// never produce a second entry.
#[derive(Debug, Default)]
pub struct Inbox {
    delivered: Vec<ChatMessage>,
    seen: HashSet<MessageId>,
    read_cursor: usize,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.seen.contains(id)
    }

    /// Append a message unless its id was already delivered
    pub fn deliver(&mut self, msg: ChatMessage) -> bool {
        if !self.seen.insert(msg.id) {
            return false;
        }
        self.delivered.push(msg);
        true
    }

    /// Messages delivered since the previous poll
    pub fn poll(&mut self) -> Vec<ChatMessage> {
        let fresh = self.delivered[self.read_cursor..].to_vec();
        self.read_cursor = self.delivered.len();
        fresh
    }

    /// Every delivered message, oldest first
    pub fn all(&self) -> &[ChatMessage] {
        &self.delivered
    }

    pub fn unread(&self) -> usize {
        self.delivered.len() - self.read_cursor
    }

    pub fn len(&self) -> usize {
        self.delivered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delivered.is_empty()
    }
}

/// Inbox shared between a user's worker and the control surface
#[derive(Debug, Clone, Default)]
pub struct SharedInbox(Arc<Mutex<Inbox>>);

impl SharedInbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, Inbox> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn poll(&self) -> Vec<ChatMessage> {
        self.lock().poll()
    }

    pub fn all(&self) -> Vec<ChatMessage> {
        self.lock().all().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GroupId, UserId};

    fn msg(body: &str) -> ChatMessage {
        ChatMessage::new(UserId::generate(), GroupId::generate(), body)
    }

    #[test]
    fn test_duplicates_are_rejected() {
        let mut inbox = Inbox::new();
        let m = msg("once");
        assert!(inbox.deliver(m.clone()));
        assert!(!inbox.deliver(m.clone()));
        assert_eq!(inbox.len(), 1);
        assert!(inbox.contains(&m.id));
    }

    #[test]
    fn test_poll_returns_only_new_messages() {
        let mut inbox = Inbox::new();
        inbox.deliver(msg("a"));
        inbox.deliver(msg("b"));
        assert_eq!(inbox.unread(), 2);

        let first: Vec<String> = inbox.poll().into_iter().map(|m| m.body).collect();
        assert_eq!(first, vec!["a", "b"]);
        assert!(inbox.poll().is_empty());

        inbox.deliver(msg("c"));
        let second: Vec<String> = inbox.poll().into_iter().map(|m| m.body).collect();
        assert_eq!(second, vec!["c"]);
        assert_eq!(inbox.all().len(), 3);
    }

    #[test]
    fn test_polled_ids_stay_deduplicated() {
        let mut inbox = Inbox::new();
        let m = msg("read");
        inbox.deliver(m.clone());
        inbox.poll();
        assert!(!inbox.deliver(m));
        assert_eq!(inbox.unread(), 0);
    }
}
