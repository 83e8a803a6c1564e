//! Periodic heartbeat source that drives every component's `act` hook.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use log::{debug, error, info};
use net::Payload;
use registry::TopicClient;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::{data::SystemHeartbeat, ComponentError, Outbound, Publisher};

/// Topic every scheduler publishes its heartbeat on.
pub const HEARTBEAT_TOPIC: &str = "schedule.heartbeat";

pub struct Scheduler {
    outbound: Outbound,
    interval: Duration,
    cancel: CancellationToken,
}

impl Scheduler {
    /// Open the scheduler's outbound channel and register its heartbeat topic.
    pub async fn open(
        machine: &str,
        port: u16,
        interval: Duration,
        topics: Arc<TopicClient>,
    ) -> Result<Self, ComponentError> {
        let scheduler = Self {
            outbound: Outbound::open(machine, port, topics).await?,
            interval,
            cancel: CancellationToken::new(),
        };
        scheduler.publish(HEARTBEAT_TOPIC, HEARTBEAT_TOPIC).await?;
        Ok(scheduler)
    }

    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Publish a single heartbeat now.
    pub async fn tick(&self) -> usize {
        match Payload::new(&SystemHeartbeat::now()) {
            Ok(payload) => self.outbound.publish(HEARTBEAT_TOPIC, payload).await,
            Err(e) => {
                error!("unable to build heartbeat: {e}");
                0
            }
        }
    }

    /// Tick every `interval` until [`Scheduler::close`] is called.
    pub async fn run(&self) {
        info!(
            "scheduler {} ticking every {:?}",
            self.outbound.identity(),
            self.interval
        );
        let mut ticker = time::interval(self.interval);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let reached = self.tick().await;
                    debug!("heartbeat queued for {reached} subscribers");
                }
            }
        }
        self.outbound.close();
    }

    pub fn close(&self) {
        self.cancel.cancel();
        self.outbound.close();
    }
}

#[async_trait]
impl Publisher for Scheduler {
    fn identity(&self) -> &str {
        self.outbound.identity()
    }

    async fn publish(&self, external: &str, _internal: &str) -> Result<(), ComponentError> {
        self.outbound
            .topics()
            .add_topic(external, self.identity())
            .await?;
        Ok(())
    }

    async fn publish_data(&self, internal: &str, payload: Payload) -> bool {
        self.outbound.publish(internal, payload).await;
        true
    }
}
