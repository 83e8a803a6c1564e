//! Payload kinds every component understands.

use chrono::Utc;
use net::BusData;
use serde::{Deserialize, Serialize};

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Tick published by the scheduler; drives each component's `act` hook.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemHeartbeat {
    pub timestamp: i64,
}

impl SystemHeartbeat {
    pub fn now() -> Self {
        Self {
            timestamp: now_millis(),
        }
    }
}

impl BusData for SystemHeartbeat {
    const KIND: &'static str = "system.heartbeat";
}

/// Liveness signal a component emits after doing work.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentHeartbeat {
    pub source: String,
    pub timestamp: i64,
}

impl ComponentHeartbeat {
    pub fn now(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            timestamp: now_millis(),
        }
    }
}

impl BusData for ComponentHeartbeat {
    const KIND: &'static str = "component.heartbeat";
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemEventKind {
    Wake,
    Shutdown,
}

/// Lifecycle announcement on a component's system topic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemEvent {
    pub id: u64,
    pub event: SystemEventKind,
    /// Name of the component the event concerns.
    pub source: String,
}

impl SystemEvent {
    pub fn wake(source: impl Into<String>) -> Self {
        Self {
            id: 1,
            event: SystemEventKind::Wake,
            source: source.into(),
        }
    }

    pub fn shutdown(source: impl Into<String>) -> Self {
        Self {
            id: 2,
            event: SystemEventKind::Shutdown,
            source: source.into(),
        }
    }
}

impl BusData for SystemEvent {
    const KIND: &'static str = "system.event";
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DebugLevel {
    Debug,
    Inform,
    Critical,
}

impl DebugLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebugLevel::Debug => "DEBUG",
            DebugLevel::Inform => "INFORM",
            DebugLevel::Critical => "CRITICAL",
        }
    }
}

impl From<DebugLevel> for log::Level {
    fn from(level: DebugLevel) -> Self {
        match level {
            DebugLevel::Debug => log::Level::Debug,
            DebugLevel::Inform => log::Level::Info,
            DebugLevel::Critical => log::Level::Error,
        }
    }
}

/// Log line forwarded over a component's debug topic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugData {
    pub level: DebugLevel,
    pub source: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl DebugData {
    pub fn new(level: DebugLevel, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            source: source.into(),
            message: message.into(),
            detail: None,
        }
    }

    /// `(LEVEL)[source] message`
    pub fn line(&self) -> String {
        let mut line = format!("({})[{}] {}", self.level.as_str(), self.source, self.message);
        if let Some(detail) = &self.detail {
            line.push_str(": ");
            line.push_str(detail);
        }
        line
    }
}

impl BusData for DebugData {
    const KIND: &'static str = "debug";
}

/// Plain text, e.g. a recognized utterance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringData {
    pub id: u64,
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl StringData {
    pub fn new(id: u64, data: impl Into<String>) -> Self {
        Self {
            id,
            data: data.into(),
            language: None,
        }
    }
}

impl BusData for StringData {
    const KIND: &'static str = "string";
}

#[cfg(test)]
mod tests {
    use super::*;
    use net::Payload;

    #[test]
    fn debug_line_format() {
        let mut data = DebugData::new(DebugLevel::Critical, "Speech", "device lost");
        assert_eq!(data.line(), "(CRITICAL)[Speech] device lost");
        data.detail = Some("hw:1".into());
        assert_eq!(data.line(), "(CRITICAL)[Speech] device lost: hw:1");
    }

    #[test]
    fn system_events_keep_their_ids() {
        let payload = Payload::new(&SystemEvent::shutdown("Planner")).unwrap();
        let event: SystemEvent = payload.decode().unwrap();
        assert_eq!(event.id, 2);
        assert_eq!(event.event, SystemEventKind::Shutdown);
        assert!(payload.decode::<SystemHeartbeat>().is_err());
    }
}
