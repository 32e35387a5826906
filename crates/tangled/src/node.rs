//! Node assembly and lifecycle
//!
//! A node owns its storage, the contact log and trust graph, the blob
//! manager, and every network it listens on. All of its background work runs
//! under one root scope. Shutdown concludes that scope and then tears down in
//! a fixed stage order; see [`Node::close`].

use crate::blobs::{BlobManager, SledBlobStore};
use crate::config::NodeState;
use crate::contacts::ContactLog;
use crate::gate::{ConnectionGate, HOP_OFFSET};
use crate::graph::GraphBuilder;
use crate::metrics::SharedMetrics;
use crate::plugins::{self, Services};
use crate::storage::{Storage, StorageError};
use parking_lot::Mutex;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tangle_core::{FeedRef, KeyPair};
use tangle_net::{ConnGate, Network, TaskGroup, TransportError};
use thiserror::Error;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Node errors
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("node is shutting down")]
    Closed,
}

/// Shutdown stages, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownStage {
    /// Close listeners and their live connections
    Networks,
    /// Wait for connection-serving tasks
    Serve,
    /// Wait for index and graph-update workers
    Indexes,
    /// Flush and release storage
    Closers,
}

impl fmt::Display for ShutdownStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShutdownStage::Networks => "networks",
            ShutdownStage::Serve => "serve",
            ShutdownStage::Indexes => "indexes",
            ShutdownStage::Closers => "closers",
        };
        f.write_str(name)
    }
}

/// The first failing shutdown stage
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("shutdown stage {stage} failed: {reason}")]
pub struct ShutdownError {
    pub stage: ShutdownStage,
    pub reason: String,
}

impl ShutdownError {
    fn new(stage: ShutdownStage, reason: impl fmt::Display) -> Self {
        Self {
            stage,
            reason: format!("{reason:#}"),
        }
    }
}

/// Node construction options
#[derive(Clone)]
pub struct NodeOptions {
    pub data_dir: PathBuf,
    /// Follow hops to replicate; the gate admits up to `hops + 2`
    pub hops: usize,
    /// Admit every peer
    pub promisc: bool,
    pub metrics: SharedMetrics,
}

impl fmt::Debug for NodeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeOptions")
            .field("data_dir", &self.data_dir)
            .field("hops", &self.hops)
            .field("promisc", &self.promisc)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

/// A running tangle node
pub struct Node {
    keypair: KeyPair,
    storage: Arc<Storage>,
    contacts: Arc<ContactLog>,
    graph: Arc<GraphBuilder>,
    blobs: Arc<BlobManager>,
    gate: Arc<ConnectionGate>,
    networks: Mutex<Vec<Arc<Network>>>,
    /// Accept loops and connection handlers
    serve_group: Arc<TaskGroup>,
    /// Graph builder
    index_group: Arc<TaskGroup>,
    root: CancellationToken,
    closed: OnceCell<Result<(), ShutdownError>>,
}

impl Node {
    /// Open a node. Must be called within a tokio runtime.
    pub fn open(options: NodeOptions) -> Result<Self, NodeError> {
        let storage = Arc::new(Storage::open(&options.data_dir)?);
        let keypair = load_or_create_identity(&storage)?;
        let feed = keypair.feed_ref();
        info!("Node identity {}", feed);

        let contacts = Arc::new(ContactLog::open(storage.clone())?);
        let graph = Arc::new(GraphBuilder::new());
        let replayed = graph.catch_up(&contacts)?;
        info!(
            "Replayed {} contact messages ({} identities)",
            replayed,
            graph.node_count()
        );

        let root = CancellationToken::new();
        let index_group = Arc::new(TaskGroup::new("index"));
        index_group.spawn({
            let graph = graph.clone();
            let contacts = contacts.clone();
            let root = root.clone();
            let metrics = options.metrics.clone();
            async move {
                graph.serve(contacts, root, metrics).await?;
                Ok(())
            }
        });

        let blobs = Arc::new(BlobManager::new(Arc::new(SledBlobStore::new(
            storage.clone(),
        ))));
        let services = Services {
            feed,
            blobs: blobs.clone(),
            contacts: contacts.clone(),
            graph: graph.clone(),
        };
        let gate = Arc::new(ConnectionGate::new(
            feed,
            options.promisc,
            graph.authorizer(feed, options.hops + HOP_OFFSET),
            plugins::master_handler(&services),
            plugins::public_handler(&services),
            options.metrics.clone(),
        ));
        if options.promisc {
            warn!("Promiscuous mode: every peer is admitted");
        }

        Ok(Self {
            keypair,
            storage,
            contacts,
            graph,
            blobs,
            gate,
            networks: Mutex::new(Vec::new()),
            serve_group: Arc::new(TaskGroup::new("serve")),
            index_group,
            root,
            closed: OnceCell::new(),
        })
    }

    pub fn feed(&self) -> FeedRef {
        self.keypair.feed_ref()
    }

    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }

    pub fn contacts(&self) -> &Arc<ContactLog> {
        &self.contacts
    }

    pub fn graph(&self) -> &Arc<GraphBuilder> {
        &self.graph
    }

    pub fn blobs(&self) -> &Arc<BlobManager> {
        &self.blobs
    }

    /// Number of live connections across all networks
    pub fn connection_count(&self) -> usize {
        self.networks
            .lock()
            .iter()
            .map(|network| network.tracker().count())
            .sum()
    }

    /// Listen on `addr`, returning the bound address
    pub async fn listen(&self, addr: SocketAddr) -> Result<SocketAddr, NodeError> {
        if self.root.is_cancelled() {
            return Err(NodeError::Closed);
        }
        let network = Arc::new(Network::bind(addr).await?);
        let gate: Arc<dyn ConnGate> = self.gate.clone();
        network.serve(gate, self.serve_group.clone(), self.root.clone())?;

        let local = network.local_addr();
        self.networks.lock().push(network);
        Ok(local)
    }

    /// Conclude the root scope. Background work winds down; call
    /// [`Node::close`] to wait for it.
    pub fn shutdown(&self) {
        if !self.root.is_cancelled() {
            info!("Shutting down");
        }
        self.root.cancel();
    }

    /// Resolves once [`Node::shutdown`] has been called
    pub async fn stopped(&self) {
        self.root.cancelled().await
    }

    /// Shut down and release everything.
    ///
    /// Stages run in [`ShutdownStage`] order and the first failure aborts the
    /// rest. The outcome is recorded: later calls return it without running
    /// anything again.
    pub async fn close(&self) -> Result<(), ShutdownError> {
        self.closed
            .get_or_init(|| self.close_stages())
            .await
            .clone()
    }

    async fn close_stages(&self) -> Result<(), ShutdownError> {
        self.shutdown();

        let networks: Vec<_> = self.networks.lock().drain(..).collect();
        for network in &networks {
            network
                .close()
                .map_err(|e| ShutdownError::new(ShutdownStage::Networks, e))?;
            let dropped = network.tracker().close_all();
            debug!("Closed {} ({} live connections)", network.local_addr(), dropped);
        }

        self.serve_group
            .wait()
            .await
            .map_err(|e| ShutdownError::new(ShutdownStage::Serve, e))?;

        self.index_group
            .wait()
            .await
            .map_err(|e| ShutdownError::new(ShutdownStage::Indexes, e))?;

        self.storage
            .flush()
            .map_err(|e| ShutdownError::new(ShutdownStage::Closers, e))?;

        info!("Node closed");
        Ok(())
    }
}

fn load_or_create_identity(storage: &Storage) -> Result<KeyPair, StorageError> {
    if let Some(state) = storage.node_state()? {
        return Ok(KeyPair::from_seed(&state.keypair_seed));
    }

    let keypair = KeyPair::generate();
    let created_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    storage.put_node_state(&NodeState {
        keypair_seed: keypair.seed(),
        created_at,
    })?;
    info!("Created new identity {}", keypair.feed_ref());
    Ok(keypair)
}
