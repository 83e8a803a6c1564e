//! Machine name service.
//!
//! Commands: `+name@ip` adds a machine, `-name` forgets it and `?name`
//! replies with its address (empty when unknown).

use std::{
    collections::HashMap,
    path::Path,
    sync::{Mutex, MutexGuard},
};

use log::{debug, warn};
use net::RequestHandler;
use serde::Deserialize;

use crate::{RegistryError, ACK};

/// On-disk machine list: `{"machines": ["name@ip", ...]}`.
#[derive(Debug, Default, Deserialize)]
pub struct MachineList {
    #[serde(default)]
    pub machines: Vec<String>,
}

#[derive(Default)]
pub struct NameRegistry {
    machines: Mutex<HashMap<String, String>>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry seeded from `name@ip` entries.
    pub fn with_machines<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let registry = Self::new();
        for entry in entries {
            registry.add_entry(entry.as_ref());
        }
        registry
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RegistryError::MachineList {
            path: path.to_path_buf(),
            source,
        })?;
        let list: MachineList = serde_json::from_str(&text)?;
        Ok(Self::with_machines(list.machines))
    }

    fn machines(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.machines.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a `name@ip` entry. Entries without an address are ignored.
    pub fn add_entry(&self, entry: &str) {
        match entry.trim().split_once('@') {
            Some((name, ip)) if !name.is_empty() && !ip.is_empty() => self.add(name, ip),
            _ => warn!("ignoring machine entry {entry:?}"),
        }
    }

    pub fn add(&self, name: &str, ip: &str) {
        debug!("machine {name} is at {ip}");
        self.machines().insert(name.to_string(), ip.to_string());
    }

    pub fn remove(&self, name: &str) {
        self.machines().remove(name);
    }

    pub fn lookup(&self, name: &str) -> Option<String> {
        self.machines().get(name).cloned()
    }
}

impl RequestHandler for NameRegistry {
    fn handle(&self, request: &[u8]) -> Vec<u8> {
        let Ok(request) = std::str::from_utf8(request) else {
            return Vec::new();
        };
        let mut chars = request.chars();
        let command = chars.next();
        let operand = chars.as_str();
        match command {
            Some('+') => {
                self.add_entry(operand);
                ACK.to_vec()
            }
            Some('-') => {
                self.remove(operand.trim());
                ACK.to_vec()
            }
            Some('?') => self
                .lookup(operand.trim())
                .map(String::into_bytes)
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_adds_looks_up_and_removes() {
        let registry = NameRegistry::new();
        assert_eq!(registry.handle(b"+robot@10.0.0.7"), ACK);
        assert_eq!(registry.handle(b"?robot"), b"10.0.0.7");
        assert_eq!(registry.handle(b"-robot"), ACK);
        assert!(registry.handle(b"?robot").is_empty());
    }

    #[test]
    fn malformed_entries_are_ignored() {
        let registry = NameRegistry::with_machines(["robot", "@1.2.3.4", " desk@10.0.0.2 "]);
        assert!(registry.lookup("robot").is_none());
        assert_eq!(registry.lookup("desk").as_deref(), Some("10.0.0.2"));
    }

    #[test]
    fn machine_list_parses() {
        let list: MachineList =
            serde_json::from_str(r#"{"machines": ["a@1.1.1.1", "b@2.2.2.2"]}"#).unwrap();
        let registry = NameRegistry::with_machines(list.machines);
        assert_eq!(registry.lookup("b").as_deref(), Some("2.2.2.2"));
    }
}
