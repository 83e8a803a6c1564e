//! Synchronous-style request/reply over framed TCP.
//!
//! A [`RequestServer`] answers one frame with one frame by delegating to a
//! [`RequestHandler`]. A [`RequestClient`] serializes its calls, reconnects
//! lazily and bounds every round trip with a timeout.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use log::{debug, warn};
use tokio::{
    net::{TcpListener, TcpStream, ToSocketAddrs},
    sync::Mutex,
};
use tokio_util::sync::CancellationToken;

use crate::{
    frame::{framed, FramedStream},
    NetError,
};

/// Service logic behind a [`RequestServer`].
pub trait RequestHandler: Send + Sync + 'static {
    fn handle(&self, request: &[u8]) -> Vec<u8>;
}

/// Accept loop answering requests until closed.
pub struct RequestServer {
    addr: SocketAddr,
    cancel: CancellationToken,
}

impl RequestServer {
    /// Bind `addr` and start serving `handler` on a background task.
    pub async fn bind(
        addr: impl ToSocketAddrs,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<Self, NetError> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let cancel = CancellationToken::new();
        tokio::spawn(accept_loop(listener, handler, cancel.clone()));
        debug!("request server listening on {addr}");
        Ok(Self { addr, cancel })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Resolves once the server has been closed.
    pub async fn closed(&self) {
        self.cancel.cancelled().await
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for RequestServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn accept_loop(
    listener: TcpListener,
    handler: Arc<dyn RequestHandler>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("request client connected from {peer}");
                    tokio::spawn(serve_connection(stream, handler.clone(), cancel.child_token()));
                }
                Err(e) => warn!("request server accept failed: {e}"),
            },
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    handler: Arc<dyn RequestHandler>,
    cancel: CancellationToken,
) {
    let mut conn = framed(stream);
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = conn.next() => frame,
        };
        match frame {
            Some(Ok(request)) => {
                let reply = handler.handle(&request);
                if let Err(e) = conn.send(Bytes::from(reply)).await {
                    warn!("failed to send reply: {e}");
                    break;
                }
            }
            Some(Err(e)) => {
                warn!("bad request frame: {e}");
                break;
            }
            None => break,
        }
    }
}

/// Client side of a request/reply service.
pub struct RequestClient {
    addr: String,
    timeout: Duration,
    conn: Mutex<Option<FramedStream>>,
}

impl RequestClient {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
            conn: Mutex::new(None),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send `body` and wait for the matching reply.
    ///
    /// Calls are serialized per client. A failed or timed out call drops the
    /// connection so the next call starts on a fresh one.
    pub async fn request(&self, body: &[u8]) -> Result<Bytes, NetError> {
        let mut slot = self.conn.lock().await;
        let outcome = tokio::time::timeout(self.timeout, round_trip(&self.addr, &mut slot, body)).await;
        match outcome {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => {
                *slot = None;
                Err(e)
            }
            Err(_) => {
                *slot = None;
                Err(NetError::Timeout {
                    addr: self.addr.clone(),
                    timeout: self.timeout,
                })
            }
        }
    }
}

async fn round_trip(
    addr: &str,
    slot: &mut Option<FramedStream>,
    body: &[u8],
) -> Result<Bytes, NetError> {
    if slot.is_none() {
        *slot = Some(framed(TcpStream::connect(addr).await?));
    }
    let Some(conn) = slot.as_mut() else {
        return Err(NetError::Closed(addr.to_string()));
    };
    conn.send(Bytes::copy_from_slice(body)).await?;
    match conn.next().await {
        Some(Ok(reply)) => Ok(reply.freeze()),
        Some(Err(e)) => Err(e.into()),
        None => Err(NetError::Closed(addr.to_string())),
    }
}
