#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use component::Handler;
use net::{Envelope, NetError, RequestServer};
use registry::{BusContext, NameRegistry, NameResolver, TopicClient, TopicRegistry};
use tokio::sync::mpsc;

pub const TIMEOUT: Duration = Duration::from_secs(2);

/// Name and topic services on ephemeral ports.
pub struct Bus {
    pub ctx: BusContext,
    _names: RequestServer,
    pub topics: RequestServer,
}

pub async fn start_bus() -> Bus {
    let _ = env_logger::builder().is_test(true).try_init();
    let names = RequestServer::bind("127.0.0.1:0", Arc::new(NameRegistry::new()))
        .await
        .unwrap();
    let topics = RequestServer::bind("127.0.0.1:0", Arc::new(TopicRegistry::new()))
        .await
        .unwrap();
    let resolver = NameResolver::new(&names.local_addr().to_string(), TIMEOUT).unwrap();
    let client = TopicClient::new(topics.local_addr().to_string(), TIMEOUT);
    Bus {
        ctx: BusContext::new(Arc::new(resolver), Arc::new(client)),
        _names: names,
        topics,
    }
}

/// Poll `check` until it holds, failing the test after a few seconds.
pub async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..300 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Handler forwarding every envelope into a channel.
pub struct Collect(pub mpsc::UnboundedSender<Envelope>);

impl Collect {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self(tx)), rx)
    }
}

#[async_trait]
impl Handler for Collect {
    async fn react(&self, envelope: Envelope) -> Result<(), NetError> {
        let _ = self.0.send(envelope);
        Ok(())
    }
}

pub async fn next(rx: &mut mpsc::UnboundedReceiver<Envelope>) -> Envelope {
    tokio::time::timeout(TIMEOUT, rx.recv())
        .await
        .expect("no envelope in time")
        .expect("channel closed")
}
