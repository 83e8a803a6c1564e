//! Capabilities a component can take part in.
//!
//! Concrete components implement [`Configurable`] and [`DataHandler`]; the
//! runtime supplies [`Publisher`] and [`Subscriber`] through the
//! [`ComponentHandle`] passed into every hook.

use async_trait::async_trait;
use net::{Envelope, Payload};

use crate::{ComponentConfig, ComponentError, ComponentHandle, ParamSpec, SystemEvent};

/// Something that owns an outbound channel.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// `machine:port` of the outbound channel.
    fn identity(&self) -> &str;

    /// Expose the internal channel `internal` on the bus as `external`.
    async fn publish(&self, external: &str, internal: &str) -> Result<(), ComponentError>;

    /// Publish `payload` on the topic mapped to `internal`. Returns whether
    /// the payload passed the channel's checks and was handed to the bus.
    async fn publish_data(&self, internal: &str, payload: Payload) -> bool;
}

/// Something that owns an inbound router.
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn subscribe(&self, topic: &str, host: &str) -> Result<(), ComponentError>;

    fn unsubscribe(&self, topic: &str, host: &str) -> bool;
}

#[async_trait]
pub trait Configurable: Send {
    /// Declare the checkers of received data and of the internal channels
    /// the component publishes on. Runs once, right after construction.
    fn declare(&self, _handle: &ComponentHandle) {}

    /// Configuration parameters the component reads in `setup`.
    fn params(&self) -> ParamSpec {
        ParamSpec::default()
    }

    async fn setup(
        &mut self,
        _config: &ComponentConfig,
        _handle: &ComponentHandle,
    ) -> Result<(), ComponentError> {
        Ok(())
    }
}

#[async_trait]
pub trait DataHandler: Send {
    /// Called for every received envelope that passes the inbound checks.
    async fn handle_data(&mut self, envelope: Envelope, handle: &ComponentHandle);

    /// Called on every scheduler heartbeat. Returning `true` reports that
    /// work was done and emits a component heartbeat.
    async fn act(&mut self, _handle: &ComponentHandle) -> bool {
        false
    }

    async fn handle_system_event(&mut self, _event: SystemEvent, _handle: &ComponentHandle) {}
}
