//! Component lifecycle: construction, configuration, reaction and shutdown.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, Weak,
    },
    time::Duration,
};

use async_trait::async_trait;
use log::{debug, error, info, log, warn};
use net::{BusData, Envelope, NetError, Payload};
use once_cell::sync::OnceCell;
use registry::{split_topic_host, topic_host, BusContext, RegistryError};

use crate::{
    config::{PUBLISH, SUBSCRIBE},
    consistency::{Checker, ConsistencyManager, KindChecker},
    data::{ComponentHeartbeat, DebugData, DebugLevel, SystemEvent, SystemHeartbeat},
    scheduler::HEARTBEAT_TOPIC,
    ComponentConfig, ComponentError, Configurable, DataHandler, Handler, InboundRouter, Outbound,
    Publisher, Subscriber,
};

/// Consistency group guarding received data.
pub const INBOUND: &str = "__INBOUND_";

/// Grace period between the shutdown announcement and closing the channels.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Constructed,
    Running,
    Closed,
}

struct HandleInner {
    name: String,
    heartbeat_topic: String,
    system_topic: String,
    debug_topic: String,
    outbound: Outbound,
    inbound: InboundRouter,
    consistency: ConsistencyManager,
    mapping: Mutex<HashMap<String, String>>,
    system_topics: HashSet<String>,
    listener: OnceCell<Weak<dyn Handler>>,
    heartbeats: AtomicU64,
}

/// The runtime side of a component, shared with its hooks.
#[derive(Clone)]
pub struct ComponentHandle {
    inner: Arc<HandleInner>,
}

impl ComponentHandle {
    fn new(name: &str, outbound: Outbound, inbound: InboundRouter) -> Self {
        let heartbeat_topic = format!("{name}.heartbeat");
        let system_topic = format!("{name}.system");
        let debug_topic = format!("{name}.debug");
        let system_topics = [&heartbeat_topic, &system_topic, &debug_topic]
            .into_iter()
            .cloned()
            .collect();
        Self {
            inner: Arc::new(HandleInner {
                name: name.to_string(),
                heartbeat_topic,
                system_topic,
                debug_topic,
                outbound,
                inbound,
                consistency: ConsistencyManager::new(),
                mapping: Mutex::new(HashMap::new()),
                system_topics,
                listener: OnceCell::new(),
                heartbeats: AtomicU64::new(0),
            }),
        }
    }

    fn mapping(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.inner.mapping.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn heartbeat_topic(&self) -> &str {
        &self.inner.heartbeat_topic
    }

    pub fn system_topic(&self) -> &str {
        &self.inner.system_topic
    }

    pub fn debug_topic(&self) -> &str {
        &self.inner.debug_topic
    }

    pub fn is_system_topic(&self, internal: &str) -> bool {
        self.inner.system_topics.contains(internal)
    }

    pub fn outbound(&self) -> &Outbound {
        &self.inner.outbound
    }

    pub fn inbound(&self) -> &InboundRouter {
        &self.inner.inbound
    }

    /// External topic `internal` is published as.
    pub fn external(&self, internal: &str) -> Option<String> {
        self.mapping().get(internal).cloned()
    }

    /// Accept received payloads that pass `checker`.
    pub fn add_inbound_checker(&self, checker: Arc<dyn Checker>) {
        self.inner.consistency.add_checker(INBOUND, checker);
    }

    /// Declare the internal channel `internal` and what it may carry.
    pub fn add_outbound_checker(&self, internal: &str, checker: Arc<dyn Checker>) {
        self.inner.consistency.add_checker(internal, checker);
    }

    pub fn accepts(&self, payload: &Payload) -> bool {
        self.inner.consistency.check(INBOUND, payload, true)
    }

    /// Serialize `data` and publish it on `internal`.
    pub async fn send<T: BusData>(&self, internal: &str, data: &T) -> bool {
        match Payload::new(data) {
            Ok(payload) => self.publish_data(internal, payload).await,
            Err(e) => {
                error!("[{}] unable to serialize {}: {e}", self.name(), T::KIND);
                false
            }
        }
    }

    /// Log `message` locally and forward it on the debug topic.
    pub async fn debug(&self, level: DebugLevel, message: impl Into<String>) {
        let data = DebugData::new(level, self.name(), message);
        log!(log::Level::from(level), "[{}] {}", self.name(), data.message);
        self.send(self.debug_topic(), &data).await;
    }

    /// Component heartbeats emitted so far.
    pub fn heartbeats(&self) -> u64 {
        self.inner.heartbeats.load(Ordering::Relaxed)
    }

    async fn beat(&self) {
        self.inner.heartbeats.fetch_add(1, Ordering::Relaxed);
        let heartbeat = ComponentHeartbeat::now(self.identity());
        self.send(self.heartbeat_topic(), &heartbeat).await;
    }

    fn attach(&self, listener: Weak<dyn Handler>) {
        if self.inner.listener.set(listener).is_err() {
            warn!("[{}] listener attached twice", self.name());
        }
    }

    fn close(&self) {
        self.inner.inbound.close();
        self.inner.outbound.close();
    }
}

#[async_trait]
impl Publisher for ComponentHandle {
    fn identity(&self) -> &str {
        self.inner.outbound.identity()
    }

    async fn publish(&self, external: &str, internal: &str) -> Result<(), ComponentError> {
        if !self.is_system_topic(internal) && !self.inner.consistency.is_defined(internal) {
            error!(
                "[{}] cannot publish {external}: channel {internal} was never declared",
                self.name()
            );
            return Err(ComponentError::UndeclaredChannel(internal.to_string()));
        }
        let added = self
            .inner
            .outbound
            .topics()
            .add_topic(external, self.identity())
            .await?;
        if !added {
            return Err(RegistryError::Refused(topic_host(external, self.identity())).into());
        }
        self.mapping()
            .insert(internal.to_string(), external.to_string());
        debug!("[{}] {internal} published as {external}", self.name());
        Ok(())
    }

    async fn publish_data(&self, internal: &str, payload: Payload) -> bool {
        if !self.inner.consistency.check(internal, &payload, true) {
            warn!(
                "[{}] {} rejected on channel {internal}",
                self.name(),
                payload.kind()
            );
            return false;
        }
        let Some(external) = self.external(internal) else {
            debug!("[{}] channel {internal} is not published", self.name());
            return false;
        };
        self.inner.outbound.publish(&external, payload).await;
        true
    }
}

#[async_trait]
impl Subscriber for ComponentHandle {
    async fn subscribe(&self, topic: &str, host: &str) -> Result<(), ComponentError> {
        let listener = self
            .inner
            .listener
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| ComponentError::Setup(format!("{} is not attached", self.name())))?;
        self.inner.inbound.subscribe(topic, host, listener).await?;
        Ok(())
    }

    fn unsubscribe(&self, topic: &str, host: &str) -> bool {
        self.inner.inbound.unsubscribe(topic, host)
    }
}

/// Routes received envelopes into the component's hooks.
struct Reactor<C> {
    component: tokio::sync::Mutex<C>,
    handle: ComponentHandle,
}

#[async_trait]
impl<C> Handler for Reactor<C>
where
    C: DataHandler + 'static,
{
    async fn react(&self, envelope: Envelope) -> Result<(), NetError> {
        let mut component = self.component.lock().await;
        if envelope.payload.is::<SystemHeartbeat>() {
            if component.act(&self.handle).await {
                self.handle.beat().await;
            }
        } else if envelope.payload.is::<SystemEvent>() {
            let event = envelope.payload.decode::<SystemEvent>()?;
            component.handle_system_event(event, &self.handle).await;
        } else if self.handle.accepts(&envelope.payload) {
            component.handle_data(envelope, &self.handle).await;
            self.handle.beat().await;
        } else {
            debug!(
                "[{}] ignoring {} from {}",
                self.handle.name(),
                envelope.payload.kind(),
                envelope.sender
            );
        }
        Ok(())
    }
}

/// Drives one component through its lifecycle.
pub struct ComponentRuntime<C> {
    handle: ComponentHandle,
    reactor: Arc<Reactor<C>>,
    config: ComponentConfig,
    state: Lifecycle,
}

impl<C> ComponentRuntime<C>
where
    C: Configurable + DataHandler + 'static,
{
    /// Open the component's channels and register its system topics.
    ///
    /// The configuration must name the machine (`hostname`). When it names a
    /// `scheduler` host, the component follows that scheduler's heartbeat.
    pub async fn construct(
        name: &str,
        component: C,
        config: ComponentConfig,
        ctx: BusContext,
    ) -> Result<Self, ComponentError> {
        let outbound = Outbound::open(config.machine_name()?, config.port()?, ctx.topics().clone())
            .await?;
        let inbound = InboundRouter::start(format!("{name}@{}", outbound.identity()), ctx);
        let handle = ComponentHandle::new(name, outbound, inbound);
        let reactor = Arc::new(Reactor {
            component: tokio::sync::Mutex::new(component),
            handle: handle.clone(),
        });
        let listener: Arc<dyn Handler> = reactor.clone();
        handle.attach(Arc::downgrade(&listener));

        if let Some(scheduler) = config.scheduler_host() {
            handle.subscribe(HEARTBEAT_TOPIC, scheduler).await?;
        } else {
            warn!("[{name}] no scheduler configured, act will never run");
        }
        let system = [
            (handle.heartbeat_topic(), KindChecker::shared::<ComponentHeartbeat>()),
            (handle.debug_topic(), KindChecker::shared::<DebugData>()),
            (handle.system_topic(), KindChecker::shared::<SystemEvent>()),
        ];
        for (topic, checker) in system {
            handle.add_outbound_checker(topic, checker);
            handle.publish(topic, topic).await?;
        }
        // System signals always pass, so a component declaring no data
        // kinds receives nothing else.
        handle.add_inbound_checker(KindChecker::shared::<SystemHeartbeat>());
        handle.add_inbound_checker(KindChecker::shared::<SystemEvent>());
        reactor.component.lock().await.declare(&handle);

        info!("[{name}] constructed as {}", handle.identity());
        Ok(Self {
            handle,
            reactor,
            config,
            state: Lifecycle::Constructed,
        })
    }

    pub fn handle(&self) -> &ComponentHandle {
        &self.handle
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    /// Run `f` against the component while no envelope is being handled.
    pub async fn with_component<R>(&self, f: impl FnOnce(&mut C) -> R) -> R {
        f(&mut *self.reactor.component.lock().await)
    }

    /// Validate parameters, apply the configured subscriptions and
    /// publications, run the component's setup and announce it awake.
    pub async fn configure(&mut self) -> Result<(), ComponentError> {
        self.ensure(Lifecycle::Constructed)?;
        let params = self.reactor.component.lock().await.params();
        self.config.validate(&params)?;

        for entry in self.config.property_list(SUBSCRIBE) {
            let (topic, host) = split_topic_host(entry).ok_or_else(|| invalid(SUBSCRIBE, entry))?;
            self.handle.subscribe(topic, host).await?;
        }
        for entry in self.config.property_list(PUBLISH) {
            let (external, internal) =
                split_topic_host(entry).ok_or_else(|| invalid(PUBLISH, entry))?;
            self.handle.publish(external, internal).await?;
        }

        self.reactor
            .component
            .lock()
            .await
            .setup(&self.config, &self.handle)
            .await?;
        self.handle
            .send(self.handle.system_topic(), &SystemEvent::wake(self.handle.name()))
            .await;
        self.state = Lifecycle::Running;
        info!("[{}] running", self.handle.name());
        Ok(())
    }

    /// Announce shutdown, give the announcement time to leave, then close
    /// both channels.
    pub async fn close(&mut self) -> Result<(), ComponentError> {
        if self.state == Lifecycle::Closed {
            return Err(ComponentError::Lifecycle {
                expected: Lifecycle::Running,
                actual: Lifecycle::Closed,
            });
        }
        self.handle
            .send(self.handle.system_topic(), &SystemEvent::shutdown(self.handle.name()))
            .await;
        tokio::time::sleep(SHUTDOWN_GRACE).await;
        self.handle.close();
        self.state = Lifecycle::Closed;
        info!("[{}] closed", self.handle.name());
        Ok(())
    }

    fn ensure(&self, expected: Lifecycle) -> Result<(), ComponentError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ComponentError::Lifecycle {
                expected,
                actual: self.state,
            })
        }
    }
}

impl<C> Drop for ComponentRuntime<C> {
    fn drop(&mut self) {
        if self.state != Lifecycle::Closed {
            self.handle.close();
        }
    }
}

fn invalid(key: &str, value: &str) -> ComponentError {
    crate::ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
    .into()
}
