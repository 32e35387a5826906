//! Configuration for tangled

use crate::node::NodeOptions;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use tangle_core::Bytes32;

/// Log output formats
pub const LOG_FORMATS: [&str; 2] = ["pretty", "json"];

/// tangled - trust-gated tangle node
#[derive(Parser, Debug, Clone)]
#[command(name = "tangled")]
#[command(about = "Tangle node: follow-graph gated replication daemon")]
pub struct Config {
    /// Listen address for peer connections
    #[arg(short, long, default_value = "0.0.0.0:8008")]
    pub listen: SocketAddr,

    /// Data directory for persistent storage
    #[arg(short, long, default_value = "./data/tangled")]
    pub data_dir: PathBuf,

    /// Follow hops to replicate (peers up to hops + 2 away may connect)
    #[arg(long, default_value = "1")]
    pub hops: usize,

    /// Accept connections from every peer
    #[arg(long)]
    pub promisc: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,
}

impl Config {
    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            anyhow::bail!("Data directory cannot be empty");
        }
        if !LOG_FORMATS.contains(&self.log_format.as_str()) {
            anyhow::bail!(
                "Unknown log format {:?} (expected one of {:?})",
                self.log_format,
                LOG_FORMATS
            );
        }
        Ok(())
    }

    /// Log filter directive for the configured verbosity
    pub fn log_directive(&self) -> &'static str {
        if self.verbose {
            "tangled=debug"
        } else {
            "tangled=info"
        }
    }
}

impl From<&Config> for NodeOptions {
    fn from(config: &Config) -> Self {
        NodeOptions {
            data_dir: config.data_dir.clone(),
            hops: config.hops,
            promisc: config.promisc,
            metrics: None,
        }
    }
}

/// Persisted node state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    /// Our identity keypair seed
    pub keypair_seed: Bytes32,
    /// Unix time the identity was created
    pub created_at: u64,
}
