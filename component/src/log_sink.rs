//! Component printing the debug data other components forward.

use std::collections::VecDeque;

use async_trait::async_trait;
use log::{log, warn};
use net::Envelope;

use crate::{data::DebugData, ComponentHandle, Configurable, DataHandler, KindChecker};

const HISTORY: usize = 100;

/// Subscribe it to `<component>.debug` topics to collect their log lines.
#[derive(Default)]
pub struct LogSink {
    history: VecDeque<String>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent lines, oldest first.
    pub fn dump(&self) -> String {
        self.history.iter().cloned().collect::<Vec<_>>().join("\n")
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.history.iter().map(String::as_str)
    }

    fn record(&mut self, data: &DebugData) {
        let line = data.line();
        log!(target: "bus", log::Level::from(data.level), "{line}");
        self.history.push_back(line);
        if self.history.len() > HISTORY {
            self.history.pop_front();
        }
    }
}

impl Configurable for LogSink {
    fn declare(&self, handle: &ComponentHandle) {
        handle.add_inbound_checker(KindChecker::shared::<DebugData>());
    }
}

#[async_trait]
impl DataHandler for LogSink {
    async fn handle_data(&mut self, envelope: Envelope, _handle: &ComponentHandle) {
        match envelope.payload.decode::<DebugData>() {
            Ok(data) => self.record(&data),
            Err(e) => warn!("log sink dropped data from {}: {e}", envelope.sender),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DebugLevel;

    #[test]
    fn history_is_bounded() {
        let mut sink = LogSink::new();
        for i in 0..(HISTORY + 5) {
            sink.record(&DebugData::new(DebugLevel::Inform, "Camera", format!("frame {i}")));
        }
        assert_eq!(sink.lines().count(), HISTORY);
        assert_eq!(sink.lines().next(), Some("(INFORM)[Camera] frame 5"));
        assert!(sink.dump().ends_with("frame 104"));
    }
}
