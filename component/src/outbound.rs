//! Publishing side of a component.
//!
//! An [`Outbound`] channel listens on a TCP port and fans every published
//! envelope out to the connected subscribers whose filters match the
//! envelope's encoding prefix. Each subscriber is served from its own bounded
//! queue; a subscriber that falls behind loses frames instead of stalling the
//! publisher.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard},
};

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use net::{
    frame::{framed, Control},
    Envelope, NetError, Payload,
};
use registry::TopicClient;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc::{self, error::TrySendError},
};
use tokio_util::sync::CancellationToken;

/// Frames buffered per subscriber before new ones are dropped.
const QUEUE_DEPTH: usize = 1024;

struct Peer {
    filters: HashMap<Bytes, usize>,
    queue: mpsc::Sender<Bytes>,
}

impl Peer {
    fn wants(&self, frame: &[u8]) -> bool {
        self.filters.keys().any(|prefix| frame.starts_with(prefix))
    }
}

type Peers = Arc<Mutex<HashMap<u64, Peer>>>;

fn lock(peers: &Peers) -> MutexGuard<'_, HashMap<u64, Peer>> {
    peers.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct Outbound {
    identity: String,
    addr: SocketAddr,
    topics: Arc<TopicClient>,
    peers: Peers,
    cancel: CancellationToken,
}

impl Outbound {
    /// Bind `port` on all interfaces (`0` picks a free one) and start
    /// accepting subscribers.
    ///
    /// The channel's identity is `machine:port` with the port actually bound.
    pub async fn open(
        machine: &str,
        port: u16,
        topics: Arc<TopicClient>,
    ) -> Result<Self, NetError> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        let addr = listener.local_addr()?;
        let identity = format!("{machine}:{}", addr.port());
        let peers: Peers = Arc::default();
        let cancel = CancellationToken::new();
        tokio::spawn(accept_loop(listener, peers.clone(), cancel.clone()));
        info!("publishing as {identity}");
        Ok(Self {
            identity,
            addr,
            topics,
            peers,
            cancel,
        })
    }

    /// `machine:port` under which this channel's topics are registered.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn topics(&self) -> &Arc<TopicClient> {
        &self.topics
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Connected subscribers.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.peers).len()
    }

    /// Active filters summed over all subscribers.
    pub fn filter_count(&self) -> usize {
        lock(&self.peers)
            .values()
            .map(|p| p.filters.values().sum::<usize>())
            .sum()
    }

    /// Publish `payload` on `topic`. Returns how many subscribers the frame
    /// was queued for.
    ///
    /// Failures are logged, never raised: a missing encoding or a closed
    /// channel simply means nobody receives the payload.
    pub async fn publish(&self, topic: &str, payload: Payload) -> usize {
        if self.is_closed() {
            warn!("[{}] publish on {topic} after close", self.identity);
            return 0;
        }
        let key = match self.topics.encoding(topic, &self.identity).await {
            Ok(Some(key)) => key,
            Ok(None) => {
                warn!("[{}] no encoding for {topic}", self.identity);
                return 0;
            }
            Err(e) => {
                error!("[{}] encoding lookup for {topic} failed: {e}", self.identity);
                return 0;
            }
        };
        match Envelope::new(key, self.identity.as_str(), payload).encode() {
            Ok(frame) => self.send(frame),
            Err(e) => {
                error!("[{}] unable to encode {topic}: {e}", self.identity);
                0
            }
        }
    }

    fn send(&self, frame: Bytes) -> usize {
        let peers = lock(&self.peers);
        let mut queued = 0;
        for (id, peer) in peers.iter().filter(|(_, p)| p.wants(&frame)) {
            match peer.queue.try_send(frame.clone()) {
                Ok(()) => queued += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("[{}] subscriber {id} is behind, dropping frame", self.identity)
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
        queued
    }

    /// Stop accepting subscribers and disconnect the current ones.
    pub fn close(&self) {
        self.cancel.cancel();
        lock(&self.peers).clear();
        debug!("[{}] outbound closed", self.identity);
    }
}

impl Drop for Outbound {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn accept_loop(listener: TcpListener, peers: Peers, cancel: CancellationToken) {
    let mut next_id = 0u64;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    let id = next_id;
                    next_id += 1;
                    let (queue, frames) = mpsc::channel(QUEUE_DEPTH);
                    lock(&peers).insert(id, Peer { filters: HashMap::new(), queue });
                    debug!("subscriber {id} connected from {remote}");
                    tokio::spawn(serve_peer(id, stream, frames, peers.clone(), cancel.child_token()));
                }
                Err(e) => warn!("outbound accept failed: {e}"),
            },
        }
    }
}

async fn serve_peer(
    id: u64,
    stream: TcpStream,
    mut frames: mpsc::Receiver<Bytes>,
    peers: Peers,
    cancel: CancellationToken,
) {
    let mut conn = framed(stream);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = frames.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = conn.send(frame).await {
                    debug!("subscriber {id} went away: {e}");
                    break;
                }
            }
            control = conn.next() => match control {
                Some(Ok(control)) => match Control::decode(&control) {
                    Some(control) => apply(&peers, id, control),
                    None => warn!("subscriber {id} sent an unknown control frame"),
                },
                Some(Err(e)) => {
                    debug!("subscriber {id} stream failed: {e}");
                    break;
                }
                None => break,
            },
        }
    }
    lock(&peers).remove(&id);
    debug!("subscriber {id} disconnected");
}

fn apply(peers: &Peers, id: u64, control: Control) {
    let mut peers = lock(peers);
    let Some(peer) = peers.get_mut(&id) else {
        return;
    };
    match control {
        Control::Subscribe(prefix) => *peer.filters.entry(prefix).or_default() += 1,
        Control::Unsubscribe(prefix) => {
            if let Some(count) = peer.filters.get_mut(&prefix) {
                *count -= 1;
                if *count == 0 {
                    peer.filters.remove(&prefix);
                }
            }
        }
    }
}
