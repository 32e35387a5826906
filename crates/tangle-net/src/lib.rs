//! Networking primitives for the tangle node
//!
//! This crate provides:
//! - Transport addresses and remote identity extraction
//! - A TCP listener that gates each accepted stream before serving it
//! - Live connection tracking for shutdown
//! - The method-to-plugin handler registry
//! - errgroup-style task groups

pub mod addr;
pub mod conn;
pub mod handler;
pub mod tasks;
pub mod transport;

pub use addr::{AddrError, TransportAddr};
pub use conn::{ConnGuard, ConnTracker};
pub use handler::{HandlerRegistry, LineSink, Plugin, PluginError};
pub use tasks::TaskGroup;
pub use transport::{dial, ConnGate, Network, TransportError};
