//! TCP transport layer
//!
//! Accepts streams, reads the dialer's hello line, asks a [`ConnGate`] which
//! handler (if any) the remote is granted, and serves it under a scope derived
//! from the node's root scope.

use crate::addr::{hello_line, TransportAddr};
use crate::conn::ConnTracker;
use crate::handler::HandlerRegistry;
use crate::tasks::TaskGroup;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tangle_core::FeedRef;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long a dialer has to send its hello line
pub const HELLO_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest accepted hello line, newline included
pub const MAX_HELLO_LEN: u64 = 128;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("network already closed")]
    AlreadyClosed,
    #[error("network already serving")]
    AlreadyServing,
}

/// Per-connection accept decision
pub trait ConnGate: Send + Sync {
    /// Handler to serve `remote` with, or the reason it is rejected
    fn admit(&self, remote: &TransportAddr) -> anyhow::Result<Arc<HandlerRegistry>>;
}

/// A listening endpoint and the connections it serves
pub struct Network {
    local_addr: SocketAddr,
    listener: Mutex<Option<TcpListener>>,
    tracker: Arc<ConnTracker>,
    closed: CancellationToken,
}

impl Network {
    /// Bind a listener
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            local_addr,
            listener: Mutex::new(Some(listener)),
            tracker: Arc::new(ConnTracker::new()),
            closed: CancellationToken::new(),
        })
    }

    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Connections currently served by this network
    pub fn tracker(&self) -> &Arc<ConnTracker> {
        &self.tracker
    }

    /// Start accepting. The accept loop and every connection task run in `group`.
    pub fn serve(
        &self,
        gate: Arc<dyn ConnGate>,
        group: Arc<TaskGroup>,
        root: CancellationToken,
    ) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::AlreadyClosed);
        }
        let listener = self
            .listener
            .lock()
            .take()
            .ok_or(TransportError::AlreadyServing)?;

        info!("Listening on {}", self.local_addr);
        let tracker = self.tracker.clone();
        let closed = self.closed.clone();
        let accept_group = group.clone();
        group.spawn(async move {
            loop {
                tokio::select! {
                    _ = closed.cancelled() => break,
                    _ = root.cancelled() => break,
                    result = listener.accept() => match result {
                        Ok((stream, socket)) => {
                            debug!("Accepted connection from {}", socket);
                            accept_group.spawn(handle_stream(
                                stream,
                                socket,
                                gate.clone(),
                                tracker.clone(),
                                root.clone(),
                            ));
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
            }
            debug!("Accept loop finished");
            Ok(())
        });
        Ok(())
    }

    /// Stop accepting new connections. Live connections are left to the tracker.
    pub fn close(&self) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::AlreadyClosed);
        }
        self.closed.cancel();
        self.listener.lock().take();
        Ok(())
    }
}

async fn handle_stream(
    stream: TcpStream,
    socket: SocketAddr,
    gate: Arc<dyn ConnGate>,
    tracker: Arc<ConnTracker>,
    root: CancellationToken,
) -> anyhow::Result<()> {
    let mut reader = BufReader::new(stream);
    let mut hello = String::new();
    let mut limited = (&mut reader).take(MAX_HELLO_LEN);
    let read = timeout(HELLO_TIMEOUT, limited.read_line(&mut hello)).await;
    match read {
        Err(_) => {
            warn!("No hello from {} within {:?}", socket, HELLO_TIMEOUT);
            return Ok(());
        }
        Ok(Err(e)) => {
            debug!("Hello read from {} failed: {}", socket, e);
            return Ok(());
        }
        Ok(Ok(0)) => return Ok(()),
        Ok(Ok(_)) if !hello.ends_with('\n') => {
            warn!("Hello from {} exceeds {} bytes", socket, MAX_HELLO_LEN);
            return Ok(());
        }
        Ok(Ok(_)) => {}
    }

    let remote = TransportAddr::new(socket, hello.trim());
    let handler = match gate.admit(&remote) {
        Ok(handler) => handler,
        Err(e) => {
            warn!("Rejected {}: {:#}", remote, e);
            return Ok(());
        }
    };

    debug!("Serving {} with {} handler", remote, handler.name());
    let scope = root.child_token();
    let _guard = tracker.track(remote.clone(), scope.clone());
    if let Err(e) = handler.serve(reader, scope).await {
        debug!("Connection {} ended: {}", remote, e);
    }
    Ok(())
}

/// Connect to `addr` presenting `feed` as our identity
pub async fn dial(addr: SocketAddr, feed: &FeedRef) -> Result<TcpStream, TransportError> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(hello_line(feed).as_bytes()).await?;
    stream.write_all(b"\n").await?;
    Ok(stream)
}
