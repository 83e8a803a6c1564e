//! Naming services for the component bus.
//!
//! Two small request/reply services back every component: the name registry,
//! which maps machine names to IPv4 addresses, and the topic registry, which
//! hands out a compact [`net::EncodingKey`] for each `topic@host` pair. Each
//! has a caching client. [`BusContext`] bundles both clients so they can be
//! passed to constructors instead of living in global state.

mod cache;
pub mod context;
pub mod error;
pub mod names;
pub mod resolver;
pub mod topic_client;
pub mod topics;

pub use cache::DEFAULT_CACHE_TTL;
pub use context::BusContext;
pub use error::RegistryError;
pub use names::NameRegistry;
pub use resolver::NameResolver;
pub use topic_client::TopicClient;
pub use topics::TopicRegistry;

/// Reply sent by both services to acknowledge a command.
pub const ACK: &[u8] = b"t";

/// Join a topic and its publishing host into the registry form.
pub fn topic_host(topic: &str, host: &str) -> String {
    format!("{topic}@{host}")
}

/// Split `topic@host` at the first `@`.
pub fn split_topic_host(topic_host: &str) -> Option<(&str, &str)> {
    topic_host.split_once('@')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_host_round_trips() {
        let joined = topic_host("text.data", "pc:5000");
        assert_eq!(joined, "text.data@pc:5000");
        assert_eq!(split_topic_host(&joined), Some(("text.data", "pc:5000")));
        assert_eq!(split_topic_host("no-host"), None);
    }
}
