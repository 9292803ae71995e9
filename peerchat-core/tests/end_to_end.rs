/*
    End-to-end delivery tests

    Several peers share one in-memory domain. Users, groups and memberships
    created on one peer must reach the others through announcements, and
    chat messages must land in exactly the inboxes of group members.
*/

mod common;

use common::*;
use peerchat_core::{ChatError, InMemoryTransport};
use std::collections::BTreeSet;

/// A and B are members of G, C is not; A says "hi"
///
/// A lives on one peer, B and C on another. With self-echo enabled both A
/// and B end up with exactly one copy, C with none.
#[tokio::test]
async fn test_group_message_reaches_members_only() {
    let transport = InMemoryTransport::default();
    let peer_one = start_peer(&transport, echo_config());
    let peer_two = start_peer(&transport, echo_config());

    let a = peer_one.create_user("A").unwrap();
    let b = peer_two.create_user("B").unwrap();
    let c = peer_two.create_user("C").unwrap();

    wait_until("peer one to learn about B", || {
        peer_one.snapshot().user(&b.id).is_some()
    })
    .await;

    let g = peer_one.create_group("G").unwrap();
    peer_one.add_user_to_group(&a.id, &g.id).unwrap();
    peer_one.add_user_to_group(&b.id, &g.id).unwrap();

    let sent = peer_one.send_message(&g.id, &a.id, "hi").unwrap();

    wait_until("A and B to receive the message", || {
        inbox_len(&peer_one, &a.id) == 1 && inbox_len(&peer_two, &b.id) == 1
    })
    .await;
    settle().await;

    for inbox in [peer_one.inbox(&a.id).unwrap(), peer_two.inbox(&b.id).unwrap()] {
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].id, sent);
        assert_eq!(inbox[0].body, "hi");
        assert_eq!(inbox[0].sender_id, a.id);
        assert_eq!(inbox[0].group_id, g.id);
    }
    assert!(peer_two.inbox(&c.id).unwrap().is_empty());

    // Both mirrors agree on the membership relation
    // Each mirror lists members in its own arrival order
    let members: BTreeSet<_> = peer_two.members_of(&g.id).unwrap().into_iter().map(|u| u.id).collect();
    assert_eq!(members, BTreeSet::from([a.id, b.id]));
    assert_eq!(peer_one.snapshot().canonical(), peer_two.snapshot().canonical());
    assert_eq!(peer_two.groups_of(&c.id).unwrap(), vec![]);
}

/// Default policy: a sender never sees their own message
#[tokio::test]
async fn test_self_echo_suppressed_by_default() {
    let transport = InMemoryTransport::default();
    let peer = start_peer(&transport, fast_config());

    let alice = peer.create_user("alice").unwrap();
    let bob = peer.create_user("bob").unwrap();
    let group = peer.create_group("pair").unwrap();
    peer.add_user_to_group(&alice.id, &group.id).unwrap();
    peer.add_user_to_group(&bob.id, &group.id).unwrap();

    peer.send_message(&group.id, &alice.id, "ping").unwrap();
    wait_until("bob to receive ping", || inbox_len(&peer, &bob.id) == 1).await;
    settle().await;

    assert!(peer.inbox(&alice.id).unwrap().is_empty());
}

/// Opt-in policy: the sender's own inbox receives the message too
#[tokio::test]
async fn test_self_echo_delivered_when_enabled() {
    let transport = InMemoryTransport::default();
    let peer = start_peer(&transport, echo_config());

    let alice = peer.create_user("alice").unwrap();
    let group = peer.create_group("notes").unwrap();
    peer.add_user_to_group(&alice.id, &group.id).unwrap();

    peer.send_message(&group.id, &alice.id, "to self").unwrap();
    wait_until("alice to see her own message", || inbox_len(&peer, &alice.id) == 1).await;

    assert_eq!(bodies(&peer.poll_inbox(&alice.id).unwrap()), vec!["to self"]);
    assert!(peer.poll_inbox(&alice.id).unwrap().is_empty());
}

/// Messages from one sender arrive in publish order
#[tokio::test]
async fn test_per_sender_order_is_preserved() {
    let transport = InMemoryTransport::default();
    let sender_peer = start_peer(&transport, fast_config());
    let reader_peer = start_peer(&transport, fast_config());

    let reader = reader_peer.create_user("reader").unwrap();
    let writer = sender_peer.create_user("writer").unwrap();
    wait_until("reader to be mirrored", || {
        sender_peer.snapshot().user(&reader.id).is_some()
    })
    .await;

    let group = sender_peer.create_group("feed").unwrap();
    sender_peer.add_user_to_group(&writer.id, &group.id).unwrap();
    sender_peer.add_user_to_group(&reader.id, &group.id).unwrap();

    let expected: Vec<String> = (0..20).map(|i| format!("msg-{}", i)).collect();
    for body in &expected {
        sender_peer.send_message(&group.id, &writer.id, body).unwrap();
    }

    wait_until("all messages", || inbox_len(&reader_peer, &reader.id) == 20).await;
    assert_eq!(bodies(&reader_peer.inbox(&reader.id).unwrap()), expected);
}

/// Control-surface errors are typed and nothing is published for them
#[tokio::test]
async fn test_control_surface_errors() {
    let transport = InMemoryTransport::default();
    let peer = start_peer(&transport, fast_config());
    let outsider = peer.create_user("outsider").unwrap();
    let group = peer.create_group("closed").unwrap();
    let retained = transport.retained(peer.channel().topic());

    assert!(matches!(
        peer.send_message(&group.id, &outsider.id, "let me in"),
        Err(ChatError::NotAMember { .. })
    ));
    assert!(matches!(
        peer.create_user(&"u".repeat(65)),
        Err(ChatError::InvalidInput(_))
    ));
    assert!(matches!(
        peer.create_group(&"g".repeat(65)),
        Err(ChatError::InvalidInput(_))
    ));
    assert_eq!(transport.retained(peer.channel().topic()), retained);
}
