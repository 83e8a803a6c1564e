//! Component reporting when a whole system of components is up or down.

use std::collections::HashMap;

use async_trait::async_trait;
use log::{info, warn};
use net::Envelope;

use crate::{
    config::SUBSCRIBE, data::SystemEventKind, ComponentConfig, ComponentError, ComponentHandle,
    Configurable, DataHandler, KindChecker, SystemEvent,
};

/// Internal channel the aggregated events are published on.
pub const MONITOR_CHANNEL: &str = "system.monitor.data";
const MONITOR_NAME: &str = "SystemMonitor";

/// Tracks every `<component>.system` topic it subscribes to.
///
/// Once all tracked components announced themselves awake it publishes a
/// wake event on [`MONITOR_CHANNEL`]; once all of them shut down again it
/// publishes a shutdown event.
#[derive(Default)]
pub struct SystemMonitor {
    awake: HashMap<String, bool>,
    active: usize,
}

impl SystemMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracked(&self) -> usize {
        self.awake.len()
    }

    pub fn active(&self) -> usize {
        self.active
    }

    /// Apply `event` and return the system-wide event it completes, if any.
    fn observe(&mut self, event: &SystemEvent) -> Option<SystemEvent> {
        let Some(awake) = self.awake.get_mut(&event.source) else {
            warn!("system event from untracked component {}", event.source);
            return None;
        };
        match event.event {
            SystemEventKind::Wake => {
                if *awake {
                    return None;
                }
                *awake = true;
                self.active += 1;
                (self.active == self.awake.len()).then(|| SystemEvent::wake(MONITOR_NAME))
            }
            SystemEventKind::Shutdown => {
                if self.awake.remove(&event.source) == Some(true) {
                    self.active -= 1;
                }
                (self.active == 0).then(|| SystemEvent::shutdown(MONITOR_NAME))
            }
        }
    }
}

#[async_trait]
impl Configurable for SystemMonitor {
    fn declare(&self, handle: &ComponentHandle) {
        handle.add_outbound_checker(MONITOR_CHANNEL, KindChecker::shared::<SystemEvent>());
    }

    async fn setup(
        &mut self,
        config: &ComponentConfig,
        _handle: &ComponentHandle,
    ) -> Result<(), ComponentError> {
        self.awake.clear();
        self.active = 0;
        for entry in config.property_list(SUBSCRIBE) {
            let topic = entry.split('@').next().unwrap_or(entry);
            if let Some(component) = topic.strip_suffix(".system") {
                self.awake.insert(component.to_string(), false);
            }
        }
        info!("monitoring {} components", self.awake.len());
        Ok(())
    }
}

#[async_trait]
impl DataHandler for SystemMonitor {
    async fn handle_data(&mut self, _envelope: Envelope, _handle: &ComponentHandle) {}

    async fn handle_system_event(&mut self, event: SystemEvent, handle: &ComponentHandle) {
        if let Some(summary) = self.observe(&event) {
            info!("system {:?}", summary.event);
            handle.send(MONITOR_CHANNEL, &summary).await;
        }
    }
}
