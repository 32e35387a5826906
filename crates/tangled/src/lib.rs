//! tangled - Tangle node daemon
//!
//! This daemon provides:
//! - A peer-trust graph built from contact messages, with hop-limited,
//!   block-aware authorization
//! - A connection gate deciding which handler each inbound peer is granted
//! - Content-addressed blob storage with a push feed of new blob refs
//! - Staged, idempotent shutdown

pub mod blobs;
pub mod config;
pub mod contacts;
pub mod gate;
pub mod graph;
pub mod metrics;
pub mod node;
pub mod plugins;
pub mod storage;

pub use blobs::{BlobManager, BlobRefBroadcaster, BlobRefReceiver, BlobStore, SubscriptionError};
pub use config::Config;
pub use contacts::ContactLog;
pub use gate::{ConnectionGate, GateError, Grant};
pub use graph::{AuthError, Authorizer, GraphBuilder, TrustGraph};
pub use metrics::{MetricsSink, NoopMetrics};
pub use node::{Node, NodeError, NodeOptions, ShutdownError, ShutdownStage};
pub use storage::Storage;
