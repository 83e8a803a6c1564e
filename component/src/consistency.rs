//! Named groups of payload predicates.
//!
//! A payload passes a group when any predicate registered for it accepts the
//! payload. Groups fall back to the wildcard group [`ANY`], and a group
//! nobody declared lets everything through.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use net::{BusData, Payload};

/// Wildcard group consulted after every specific group.
pub const ANY: &str = "*";

pub trait Checker: Send + Sync {
    fn check(&self, payload: &Payload) -> bool;
}

impl<F> Checker for F
where
    F: Fn(&Payload) -> bool + Send + Sync,
{
    fn check(&self, payload: &Payload) -> bool {
        self(payload)
    }
}

/// Accepts payloads of one kind.
#[derive(Clone, Debug)]
pub struct KindChecker {
    kind: String,
}

impl KindChecker {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }

    pub fn of<T: BusData>() -> Self {
        Self::new(T::KIND)
    }

    pub fn shared<T: BusData>() -> Arc<dyn Checker> {
        Arc::new(Self::of::<T>())
    }
}

impl Checker for KindChecker {
    fn check(&self, payload: &Payload) -> bool {
        payload.kind() == self.kind
    }
}

#[derive(Default)]
pub struct ConsistencyManager {
    groups: Mutex<HashMap<String, Vec<Arc<dyn Checker>>>>,
}

impl ConsistencyManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn groups(&self) -> MutexGuard<'_, HashMap<String, Vec<Arc<dyn Checker>>>> {
        self.groups.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_checker(&self, group: &str, checker: Arc<dyn Checker>) {
        self.groups()
            .entry(group.to_string())
            .or_default()
            .push(checker);
    }

    /// Remove `checker` from `group`, comparing by identity. A group left
    /// without checkers counts as undeclared again.
    pub fn remove_checker(&self, group: &str, checker: &Arc<dyn Checker>) -> bool {
        let mut groups = self.groups();
        let Some(checkers) = groups.get_mut(group) else {
            return false;
        };
        let before = checkers.len();
        checkers.retain(|c| !Arc::ptr_eq(c, checker));
        let removed = checkers.len() != before;
        if checkers.is_empty() {
            groups.remove(group);
        }
        removed
    }

    pub fn is_defined(&self, group: &str) -> bool {
        self.groups().contains_key(group)
    }

    pub fn defined_groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = self.groups().keys().cloned().collect();
        groups.sort();
        groups
    }

    /// Whether `payload` is acceptable for `group`.
    ///
    /// With `return_on_first` the checkers of a group stop at the first
    /// acceptance; otherwise every checker runs. The answer is the same.
    pub fn check(&self, group: &str, payload: &Payload, return_on_first: bool) -> bool {
        check_group(&self.groups(), group, payload, return_on_first)
    }
}

fn check_group(
    groups: &HashMap<String, Vec<Arc<dyn Checker>>>,
    group: &str,
    payload: &Payload,
    return_on_first: bool,
) -> bool {
    if group != ANY && !groups.contains_key(group) && !groups.contains_key(ANY) {
        return true;
    }
    let mut valid = false;
    for checker in groups.get(group).into_iter().flatten() {
        valid |= checker.check(payload);
        if valid && return_on_first {
            break;
        }
    }
    if group == ANY {
        valid
    } else {
        valid || check_group(groups, ANY, payload, return_on_first)
    }
}
