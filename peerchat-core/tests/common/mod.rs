/*
    Shared helpers for the peerchat integration tests

    Every test builds one InMemoryTransport domain and starts peers on it
    with a short poll interval so convergence takes milliseconds.
*/

#![allow(dead_code)]

use peerchat_core::pipeline::SelfEcho;
use peerchat_core::{ChatMessage, ChatPeer, Config, InMemoryTransport, UserId};
use std::sync::Arc;
use std::time::Duration;

pub const POLL: Duration = Duration::from_millis(5);
pub const DEADLINE: Duration = Duration::from_secs(5);

pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.bus.poll_interval = POLL;
    config.bus.max_backoff = Duration::from_millis(40);
    config
}

pub fn echo_config() -> Config {
    let mut config = fast_config();
    config.bus.self_echo = SelfEcho::Deliver;
    config
}

pub fn start_peer(transport: &InMemoryTransport, config: Config) -> ChatPeer {
    ChatPeer::start(config, Arc::new(transport.clone())).expect("peer should start")
}

/// Poll `cond` until it holds, panicking after [`DEADLINE`]
pub async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + DEADLINE;
    while !cond() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(POLL).await;
    }
}

/// Give every worker several poll iterations
pub async fn settle() {
    tokio::time::sleep(POLL * 20).await;
}

pub fn bodies(messages: &[ChatMessage]) -> Vec<String> {
    messages.iter().map(|m| m.body.clone()).collect()
}

pub fn inbox_len(peer: &ChatPeer, user: &UserId) -> usize {
    peer.inbox(user).map(|m| m.len()).unwrap_or(0)
}
