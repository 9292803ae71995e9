//! Serverless group messaging over a shared publish/subscribe topic
//!
//! Peers in one domain exchange user, group and chat envelopes on a single
//! topic. Each peer mirrors the membership state from the announcements it
//! observes and filters chat messages into the inboxes of its local users.

pub mod channel;
pub mod config;
pub mod durability;
pub mod error;
pub mod logging;
pub mod membership;
pub mod metrics;
pub mod model;
pub mod peer;
pub mod pipeline;
pub mod shutdown;

pub use channel::{DistributionChannel, InMemoryTransport, QosProfile, Transport};
pub use config::Config;
pub use error::{ChatError, ChatResult};
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogLevel};
pub use model::{ChatMessage, Group, GroupId, MessageId, User, UserId};
pub use peer::ChatPeer;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        // Ensure the main exports are accessible
        let _ = LogLevel::Info;
        let _ = Config::default();
        let _ = QosProfile::default();
    }
}
