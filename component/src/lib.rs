//! Components and the channels that connect them.
//!
//! A component publishes through one [`Outbound`] channel and receives
//! through one [`InboundRouter`]. The [`ComponentRuntime`] wires both to the
//! naming services, guards traffic with a [`ConsistencyManager`] and turns
//! scheduler heartbeats into calls to the component's `act` hook.

pub mod capability;
pub mod config;
pub mod consistency;
pub mod data;
pub mod error;
pub mod inbound;
pub mod log_sink;
pub mod monitor;
pub mod outbound;
pub mod runtime;
pub mod scheduler;

pub use capability::{Configurable, DataHandler, Publisher, Subscriber};
pub use config::{ComponentConfig, ParamSpec};
pub use consistency::{Checker, ConsistencyManager, KindChecker};
pub use data::{
    ComponentHeartbeat, DebugData, DebugLevel, StringData, SystemEvent, SystemEventKind,
    SystemHeartbeat,
};
pub use error::{ComponentError, ConfigError};
pub use inbound::{Handler, InboundRouter};
pub use log_sink::LogSink;
pub use monitor::SystemMonitor;
pub use outbound::Outbound;
pub use runtime::{ComponentHandle, ComponentRuntime, Lifecycle};
pub use scheduler::Scheduler;
