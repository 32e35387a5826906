//! Peer-trust graph and hop-limited authorization
//!
//! Contact edges observed in feeds form a weighted directed graph. A peer is
//! authorized when it is reachable from the local identity over follow edges
//! within a hop budget and nobody on the way blocks it.

pub mod authorizer;
pub mod builder;
pub mod dot;
pub mod trust;

pub use authorizer::Authorizer;
pub use builder::GraphBuilder;
pub use trust::{EdgeClass, TrustEdge, TrustGraph};

use tangle_core::FeedRef;
use thiserror::Error;

/// Weight of a follow edge
pub const FOLLOW_WEIGHT: f64 = 1.0;

/// Weight of a contact edge that neither follows nor blocks
pub const NEUTRAL_WEIGHT: f64 = 0.0;

/// Weight stored for block edges
pub const BLOCK_WEIGHT: f64 = f64::INFINITY;

/// Edges weighing strictly more than this are blocks
pub const BLOCK_THRESHOLD: f64 = 1.0;

/// Authorization errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("{candidate:?} is blocked")]
    Blocked { candidate: FeedRef },
    #[error("{candidate:?} is not within {max_hops} hops")]
    TooFar { candidate: FeedRef, max_hops: usize },
}
