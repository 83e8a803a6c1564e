//! Topic registry service.
//!
//! Commands (first byte, then operand):
//!
//! * `+topic@host` registers the pair, replies `t`
//! * `-topic@host` forgets the pair, replies `t`
//! * `!topic@host` replies with the 3-byte key, registering the pair if needed
//! * `?<key>` replies with `topic@host`, or nothing for an unknown key

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use log::{debug, info, warn};
use net::{EncodingKey, RequestHandler};

use crate::ACK;

/// Keys a registry can hand out: every 3-byte value except the unknown one.
pub const KEY_SPACE: usize = (1 << (8 * net::ENCODING_SIZE)) - 1;

struct TopicTable {
    by_topic: HashMap<String, EncodingKey>,
    by_key: HashMap<EncodingKey, String>,
    next: Option<EncodingKey>,
    capacity: usize,
}

impl TopicTable {
    fn new(capacity: usize) -> Self {
        Self {
            by_topic: HashMap::new(),
            by_key: HashMap::new(),
            next: None,
            capacity: capacity.min(KEY_SPACE),
        }
    }

    fn allocate(&mut self) -> Option<EncodingKey> {
        if self.by_key.len() >= self.capacity {
            return None;
        }
        let start = self.next.unwrap_or(EncodingKey::FIRST);
        let mut key = start;
        // After a full wrap keys still held by live topics are skipped.
        while self.by_key.contains_key(&key) {
            key = key.next();
            if key == start {
                return None;
            }
        }
        self.next = Some(key.next());
        Some(key)
    }

    fn add(&mut self, topic_host: &str) -> Option<EncodingKey> {
        if let Some(key) = self.by_topic.get(topic_host) {
            return Some(*key);
        }
        let Some(key) = self.allocate() else {
            warn!("no encoding left for {topic_host}");
            return None;
        };
        self.by_topic.insert(topic_host.to_string(), key);
        self.by_key.insert(key, topic_host.to_string());
        debug!("registered {topic_host} as {key}");
        Some(key)
    }

    fn remove(&mut self, topic_host: &str) {
        if let Some(key) = self.by_topic.remove(topic_host) {
            self.by_key.remove(&key);
            debug!("removed {topic_host} ({key})");
        }
    }
}

/// Sole authority for topic encodings.
pub struct TopicRegistry {
    table: Mutex<TopicTable>,
}

impl Default for TopicRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::with_capacity(KEY_SPACE)
    }

    /// A registry holding at most `capacity` live topics. Once full, new
    /// topics get no encoding until others are removed.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            table: Mutex::new(TopicTable::new(capacity)),
        }
    }

    fn table(&self) -> MutexGuard<'_, TopicTable> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `topic_host`, returning its key. Idempotent. `None` when
    /// every key is taken.
    pub fn add(&self, topic_host: &str) -> Option<EncodingKey> {
        self.table().add(topic_host)
    }

    pub fn remove(&self, topic_host: &str) {
        self.table().remove(topic_host)
    }

    /// Key for `topic_host`, registering it on first sight.
    ///
    /// Operands without a host part are refused.
    pub fn encoding(&self, topic_host: &str) -> Option<EncodingKey> {
        let mut table = self.table();
        if let Some(key) = table.by_topic.get(topic_host) {
            return Some(*key);
        }
        if !topic_host.contains('@') {
            return None;
        }
        info!("requested unknown topic {topic_host}, registering it");
        table.add(topic_host)
    }

    pub fn topic(&self, key: EncodingKey) -> Option<String> {
        self.table().by_key.get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        self.table().by_topic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RequestHandler for TopicRegistry {
    fn handle(&self, request: &[u8]) -> Vec<u8> {
        let Some((command, operand)) = request.split_first() else {
            return Vec::new();
        };
        if *command == b'?' {
            return EncodingKey::from_slice(operand)
                .and_then(|key| self.topic(key))
                .map(String::into_bytes)
                .unwrap_or_default();
        }
        let Ok(topic_host) = std::str::from_utf8(operand) else {
            return Vec::new();
        };
        match command {
            b'+' => match self.add(topic_host) {
                Some(_) => ACK.to_vec(),
                None => Vec::new(),
            },
            b'-' => {
                self.remove(topic_host);
                ACK.to_vec()
            }
            b'!' => self
                .encoding(topic_host)
                .map(|key| key.as_bytes().to_vec())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_issued_in_order() {
        let registry = TopicRegistry::new();
        assert_eq!(registry.add("a@h:1"), Some(EncodingKey::FIRST));
        assert_eq!(registry.add("b@h:1"), Some(EncodingKey::new([0, 0, 2])));
        assert_eq!(registry.add("a@h:1"), Some(EncodingKey::FIRST));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn removed_keys_are_not_reissued() {
        let registry = TopicRegistry::new();
        let first = registry.add("a@h:1").unwrap();
        registry.remove("a@h:1");
        assert!(registry.topic(first).is_none());
        assert_ne!(registry.add("a@h:1"), Some(first));
    }

    #[test]
    fn encoding_auto_registers_only_scoped_topics() {
        let registry = TopicRegistry::new();
        assert!(registry.encoding("loose").is_none());
        let key = registry.encoding("text.data@pc:5000").unwrap();
        assert_eq!(registry.topic(key).as_deref(), Some("text.data@pc:5000"));
    }

    #[test]
    fn handle_speaks_the_command_protocol() {
        let registry = TopicRegistry::new();
        assert_eq!(registry.handle(b"+x@h:1"), ACK);
        let key = registry.handle(b"!x@h:1");
        assert_eq!(key, EncodingKey::FIRST.as_bytes().to_vec());

        let mut lookup = vec![b'?'];
        lookup.extend_from_slice(&key);
        assert_eq!(registry.handle(&lookup), b"x@h:1");

        assert_eq!(registry.handle(b"-x@h:1"), ACK);
        assert!(registry.handle(&lookup).is_empty());
        assert!(registry.handle(b"").is_empty());
        assert!(registry.handle(b"#x").is_empty());
    }

    #[test]
    fn full_registry_refuses_new_topics() {
        let registry = TopicRegistry::with_capacity(2);
        assert!(registry.add("a@h:1").is_some());
        assert!(registry.add("b@h:1").is_some());
        assert_eq!(registry.add("c@h:1"), None);
        assert!(registry.handle(b"+c@h:1").is_empty());
        assert!(registry.handle(b"!c@h:1").is_empty());
        assert!(registry.add("a@h:1").is_some());

        registry.remove("a@h:1");
        assert!(registry.add("c@h:1").is_some());
        assert_eq!(registry.len(), 2);
    }
}
