//! Method-to-plugin handler registry
//!
//! A handler serves one accepted connection. Each request is a single line
//! `<method> [args]`; the plugin registered for the method writes its reply
//! lines to a [`LineSink`]. The RPC framing proper lives outside this crate,
//! this dispatcher is the thin boundary the node hands connections to.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Plugin errors
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("bad arguments: {0}")]
    BadArgs(String),
    #[error("{0}")]
    Failed(String),
}

/// Write half of a connection, one reply per line
pub struct LineSink {
    writer: Box<dyn AsyncWrite + Send + Unpin>,
}

impl LineSink {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            writer: Box::new(writer),
        }
    }

    /// Write one line and flush it
    pub async fn send(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }
}

/// A named method served over a connection
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Method name this plugin answers to
    fn method(&self) -> &'static str;

    /// Serve one call. `scope` concludes when the call returns, when the
    /// connection is cancelled, or when the peer closes its side while no
    /// further request is pending.
    async fn call(
        &self,
        args: &str,
        sink: &mut LineSink,
        scope: &CancellationToken,
    ) -> Result<(), PluginError>;
}

/// Set of plugins granted to a connection
pub struct HandlerRegistry {
    name: &'static str,
    plugins: RwLock<BTreeMap<&'static str, Arc<dyn Plugin>>>,
}

impl HandlerRegistry {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            plugins: RwLock::new(BTreeMap::new()),
        }
    }

    /// Registry name (for logs)
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register a plugin, replacing any plugin with the same method
    pub fn register(&self, plugin: Arc<dyn Plugin>) {
        self.plugins.write().insert(plugin.method(), plugin);
    }

    /// Registered method names, sorted
    pub fn methods(&self) -> Vec<&'static str> {
        self.plugins.read().keys().copied().collect()
    }

    fn get(&self, method: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.read().get(method).cloned()
    }

    /// Serve requests on `stream` until EOF or until `scope` is cancelled
    pub async fn serve<S>(&self, stream: S, scope: CancellationToken) -> Result<(), PluginError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read, write) = tokio::io::split(stream);
        let mut lines = BufReader::new(read).lines();
        let mut sink = LineSink::new(write);

        loop {
            let line = tokio::select! {
                _ = scope.cancelled() => break,
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let (method, args) = line.split_once(' ').unwrap_or((line, ""));
            let Some(plugin) = self.get(method) else {
                sink.send(&format!("error: unknown method {method}")).await?;
                continue;
            };

            debug!("{} handler: calling {}", self.name, method);
            let call_scope = scope.child_token();
            let _call_guard = call_scope.clone().drop_guard();
            let result = {
                let call = plugin.call(args.trim(), &mut sink, &call_scope);
                tokio::pin!(call);

                // nothing else reads while a call runs; watch for the peer leaving
                let mut watching = true;
                loop {
                    tokio::select! {
                        result = &mut call => break result,
                        gone = peer_gone(lines.get_mut()), if watching => {
                            watching = false;
                            if gone {
                                debug!("{} handler: peer left during {}", self.name, method);
                                call_scope.cancel();
                            }
                        }
                    }
                }
            };
            match result {
                Ok(()) => {}
                Err(PluginError::Io(e)) => return Err(e.into()),
                Err(e) => sink.send(&format!("error: {e}")).await?,
            }
        }

        Ok(())
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("name", &self.name)
            .field("methods", &self.methods())
            .finish()
    }
}

/// Resolves once the read side has data (false) or is finished (true).
///
/// Buffered data is left in place for the next request.
async fn peer_gone<R: AsyncBufRead + Unpin>(reader: &mut R) -> bool {
    match reader.fill_buf().await {
        Ok(buf) => buf.is_empty(),
        Err(_) => true,
    }
}
