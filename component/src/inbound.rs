//! Receiving side of a component.
//!
//! The [`InboundRouter`] keeps at most one connection per upstream publisher,
//! shared by every topic subscribed from it and dropped once the last of
//! those topics is unsubscribed. All connections feed a single dispatch task
//! which decodes each envelope, maps its encoding back to `topic@host` and
//! hands it to the handler registered for that feed.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use net::{
    frame::{framed, Control, FramedStream},
    EncodingKey, Envelope, NetError,
};
use registry::{topic_host, BusContext};
use tokio::{net::TcpStream, sync::mpsc};
use tokio_util::sync::CancellationToken;

const RECONNECT_DELAY: Duration = Duration::from_millis(200);
const DISPATCH_DEPTH: usize = 1024;

/// Receives the envelopes of one or more feeds.
///
/// Handlers run on the router's dispatch task, one envelope at a time, so a
/// slow handler delays every feed of the router.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn react(&self, envelope: Envelope) -> Result<(), NetError>;
}

struct Route {
    handler: Arc<dyn Handler>,
    upstream: String,
    key: EncodingKey,
}

struct Upstream {
    refs: usize,
    control: mpsc::UnboundedSender<Control>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Tables {
    routes: HashMap<String, Route>,
    upstreams: HashMap<String, Upstream>,
}

type SharedTables = Arc<Mutex<Tables>>;

fn lock(tables: &SharedTables) -> MutexGuard<'_, Tables> {
    tables.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct InboundRouter {
    label: String,
    ctx: BusContext,
    tables: SharedTables,
    frames: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
}

impl InboundRouter {
    /// Start the dispatch task. `label` only tags log lines.
    pub fn start(label: impl Into<String>, ctx: BusContext) -> Self {
        let label = label.into();
        let tables: SharedTables = Arc::default();
        let cancel = CancellationToken::new();
        let (frames, rx) = mpsc::channel(DISPATCH_DEPTH);
        tokio::spawn(dispatch(
            label.clone(),
            ctx.clone(),
            tables.clone(),
            rx,
            cancel.clone(),
        ));
        Self {
            label,
            ctx,
            tables,
            frames,
            cancel,
        }
    }

    /// Route `topic` published by `host` to `handler`.
    ///
    /// `host` is `machine:port` and may use a machine name. Subscribing to a
    /// feed again only replaces its handler.
    pub async fn subscribe(
        &self,
        topic: &str,
        host: &str,
        handler: Arc<dyn Handler>,
    ) -> Result<(), NetError> {
        if self.cancel.is_cancelled() {
            return Err(NetError::Closed(self.label.clone()));
        }
        let feed = topic_host(topic, host);
        let upstream = self
            .ctx
            .names()
            .resolve_host(host)
            .await?
            .ok_or_else(|| NetError::Unresolved(host.to_string()))?;
        let key = self
            .ctx
            .topics()
            .encoding(topic, host)
            .await?
            .ok_or_else(|| NetError::Unresolved(feed.clone()))?;

        let mut tables = lock(&self.tables);
        if let Some(route) = tables.routes.get_mut(&feed) {
            route.handler = handler;
            return Ok(());
        }
        let conn = tables
            .upstreams
            .entry(upstream.clone())
            .or_insert_with(|| self.connect(&upstream));
        conn.refs += 1;
        let _ = conn
            .control
            .send(Control::Subscribe(Bytes::copy_from_slice(key.as_bytes())));
        tables.routes.insert(
            feed.clone(),
            Route {
                handler,
                upstream,
                key,
            },
        );
        debug!("[{}] subscribed to {feed} ({key})", self.label);
        Ok(())
    }

    fn connect(&self, upstream: &str) -> Upstream {
        let (control, rx) = mpsc::unbounded_channel();
        let cancel = self.cancel.child_token();
        tokio::spawn(follow_upstream(
            upstream.to_string(),
            rx,
            self.frames.clone(),
            cancel.clone(),
        ));
        info!("[{}] connecting to {upstream}", self.label);
        Upstream {
            refs: 0,
            control,
            cancel,
        }
    }

    /// Stop routing `topic@host`. Returns whether the feed was subscribed.
    pub fn unsubscribe(&self, topic: &str, host: &str) -> bool {
        let feed = topic_host(topic, host);
        let mut tables = lock(&self.tables);
        let Some(route) = tables.routes.remove(&feed) else {
            return false;
        };
        if let Some(conn) = tables.upstreams.get_mut(&route.upstream) {
            let _ = conn.control.send(Control::Unsubscribe(Bytes::copy_from_slice(
                route.key.as_bytes(),
            )));
            conn.refs -= 1;
            if conn.refs == 0 {
                conn.cancel.cancel();
                tables.upstreams.remove(&route.upstream);
                info!("[{}] disconnected from {}", self.label, route.upstream);
            }
        }
        debug!("[{}] unsubscribed from {feed}", self.label);
        true
    }

    /// Open upstream connections.
    pub fn connection_count(&self) -> usize {
        lock(&self.tables).upstreams.len()
    }

    pub fn is_subscribed(&self, topic: &str, host: &str) -> bool {
        lock(&self.tables)
            .routes
            .contains_key(&topic_host(topic, host))
    }

    /// Stop dispatching, drop every connection and forget all handlers.
    pub fn close(&self) {
        self.cancel.cancel();
        let mut tables = lock(&self.tables);
        tables.routes.clear();
        tables.upstreams.clear();
    }
}

impl Drop for InboundRouter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn dispatch(
    label: String,
    ctx: BusContext,
    tables: SharedTables,
    mut frames: mpsc::Receiver<Bytes>,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        let envelope = match Envelope::decode(&frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("[{label}] dropping frame: {e}");
                continue;
            }
        };
        let feed = match ctx.topics().topic(envelope.key).await {
            Ok(Some(feed)) => feed,
            Ok(None) => {
                info!("[{label}] received data for unknown encoding {}", envelope.key);
                continue;
            }
            Err(e) => {
                warn!("[{label}] unable to look up {}: {e}", envelope.key);
                continue;
            }
        };
        let handler = lock(&tables).routes.get(&feed).map(|r| r.handler.clone());
        match handler {
            Some(handler) => {
                if let Err(e) = handler.react(envelope).await {
                    warn!("[{label}] handler for {feed} failed: {e}");
                }
            }
            None => info!("[{label}] received data for unsubscribed feed {feed}"),
        }
    }
    debug!("[{label}] dispatch stopped");
}

/// Keep a subscription connection to `addr` alive until cancelled.
///
/// Filters are replayed after every reconnect.
async fn follow_upstream(
    addr: String,
    mut control: mpsc::UnboundedReceiver<Control>,
    frames: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
) {
    let mut filters: Vec<Bytes> = Vec::new();
    loop {
        let stream = tokio::select! {
            _ = cancel.cancelled() => return,
            stream = TcpStream::connect(addr.as_str()) => stream,
        };
        match stream {
            Ok(stream) => {
                let mut conn = framed(stream);
                match replay(&mut conn, &filters).await {
                    Ok(()) => loop {
                        tokio::select! {
                            _ = cancel.cancelled() => return,
                            cmd = control.recv() => {
                                let Some(cmd) = cmd else { return };
                                track(&mut filters, &cmd);
                                if let Err(e) = conn.send(cmd.encode()).await {
                                    debug!("lost {addr}: {e}");
                                    break;
                                }
                            }
                            frame = conn.next() => match frame {
                                Some(Ok(frame)) => {
                                    if frames.send(frame.freeze()).await.is_err() {
                                        return;
                                    }
                                }
                                Some(Err(e)) => {
                                    warn!("bad frame from {addr}: {e}");
                                    break;
                                }
                                None => {
                                    debug!("{addr} closed the connection");
                                    break;
                                }
                            },
                        }
                    },
                    Err(e) => debug!("lost {addr} while replaying filters: {e}"),
                }
            }
            Err(e) => debug!("unable to reach {addr}: {e}"),
        }
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
        }
    }
}

async fn replay(conn: &mut FramedStream, filters: &[Bytes]) -> std::io::Result<()> {
    for prefix in filters {
        conn.send(Control::Subscribe(prefix.clone()).encode()).await?;
    }
    Ok(())
}

fn track(filters: &mut Vec<Bytes>, cmd: &Control) {
    match cmd {
        Control::Subscribe(prefix) => filters.push(prefix.clone()),
        Control::Unsubscribe(prefix) => {
            if let Some(pos) = filters.iter().position(|p| p == prefix) {
                filters.remove(pos);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracked_filters_follow_control_frames() {
        let mut filters = Vec::new();
        let a = Bytes::from_static(&[0, 0, 1]);
        let b = Bytes::from_static(&[0, 0, 2]);
        track(&mut filters, &Control::Subscribe(a.clone()));
        track(&mut filters, &Control::Subscribe(b.clone()));
        track(&mut filters, &Control::Unsubscribe(a));
        track(&mut filters, &Control::Unsubscribe(Bytes::from_static(&[9])));
        assert_eq!(filters, vec![b]);
    }

    #[tokio::test]
    async fn peers_that_hang_up_are_retried_after_a_delay() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let accepts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counted = accepts.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                drop(stream);
            }
        });

        let (control, rx) = mpsc::unbounded_channel();
        let (frames, _frames_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        control
            .send(Control::Subscribe(Bytes::from_static(&[0, 0, 1])))
            .unwrap();
        tokio::spawn(follow_upstream(addr, rx, frames, cancel.clone()));

        tokio::time::sleep(RECONNECT_DELAY * 3).await;
        cancel.cancel();
        let seen = accepts.load(std::sync::atomic::Ordering::SeqCst);
        assert!((1..=4).contains(&seen), "{seen} connections");
    }
}
