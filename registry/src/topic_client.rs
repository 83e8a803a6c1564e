//! Caching client for the topic registry.

use std::{
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use log::warn;
use net::{EncodingKey, NetError, RequestClient};

use crate::{
    cache::{TtlCache, DEFAULT_CACHE_TTL},
    topic_host, ACK,
};

struct TopicCache {
    by_topic: TtlCache<String, EncodingKey>,
    by_key: TtlCache<EncodingKey, String>,
}

impl TopicCache {
    fn new(ttl: Duration) -> Self {
        Self {
            by_topic: TtlCache::new(ttl),
            by_key: TtlCache::new(ttl),
        }
    }
}

/// Client side of the [`crate::TopicRegistry`].
///
/// Positive answers are cached in both directions for the cache TTL.
/// Removals by other processes are only observed once an entry expires.
pub struct TopicClient {
    client: RequestClient,
    cache: Mutex<TopicCache>,
}

impl TopicClient {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: RequestClient::new(addr, timeout),
            cache: Mutex::new(TopicCache::new(DEFAULT_CACHE_TTL)),
        }
    }

    /// Trust cached answers for `ttl` instead of the default.
    pub fn with_cache_ttl(self, ttl: Duration) -> Self {
        {
            let mut cache = self.cache();
            cache.by_topic.set_ttl(ttl);
            cache.by_key.set_ttl(ttl);
        }
        self
    }

    pub fn addr(&self) -> &str {
        self.client.addr()
    }

    fn cache(&self) -> MutexGuard<'_, TopicCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn command(&self, command: u8, operand: &[u8]) -> Result<Vec<u8>, NetError> {
        let mut request = Vec::with_capacity(1 + operand.len());
        request.push(command);
        request.extend_from_slice(operand);
        Ok(self.client.request(&request).await?.to_vec())
    }

    pub async fn add_topic(&self, topic: &str, host: &str) -> Result<bool, NetError> {
        let reply = self.command(b'+', topic_host(topic, host).as_bytes()).await?;
        Ok(reply.eq_ignore_ascii_case(ACK))
    }

    /// Unregister a topic and forget any locally cached mapping for it.
    pub async fn remove_topic(&self, topic: &str, host: &str) -> Result<bool, NetError> {
        let key = topic_host(topic, host);
        let reply = self.command(b'-', key.as_bytes()).await?;
        let mut cache = self.cache();
        if let Some(encoding) = cache.by_topic.remove(&key) {
            cache.by_key.remove(&encoding);
        }
        Ok(reply.eq_ignore_ascii_case(ACK))
    }

    /// Encoding for `topic` published by `host`.
    ///
    /// `Ok(None)` means the registry had no answer.
    pub async fn encoding(&self, topic: &str, host: &str) -> Result<Option<EncodingKey>, NetError> {
        let key = topic_host(topic, host);
        if let Some(encoding) = self.cache().by_topic.get(&key) {
            return Ok(Some(encoding));
        }
        let reply = self.command(b'!', key.as_bytes()).await?;
        let Some(encoding) = EncodingKey::from_slice(&reply) else {
            if !reply.is_empty() {
                warn!("topic registry sent a {} byte encoding for {key}", reply.len());
            }
            return Ok(None);
        };
        let mut cache = self.cache();
        cache.by_topic.insert(key.clone(), encoding);
        cache.by_key.insert(encoding, key);
        Ok(Some(encoding))
    }

    /// The `topic@host` registered under `encoding`, if any.
    pub async fn topic(&self, encoding: EncodingKey) -> Result<Option<String>, NetError> {
        if let Some(topic) = self.cache().by_key.get(&encoding) {
            return Ok(Some(topic));
        }
        let reply = self.command(b'?', encoding.as_bytes()).await?;
        if reply.is_empty() {
            return Ok(None);
        }
        let topic = String::from_utf8_lossy(&reply).into_owned();
        let mut cache = self.cache();
        cache.by_key.insert(encoding, topic.clone());
        cache.by_topic.insert(topic.clone(), encoding);
        Ok(Some(topic))
    }
}
