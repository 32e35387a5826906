//! Inbound connection gate
//!
//! Decides, per accepted stream, which handler the remote is granted. The
//! checks run in a fixed order and the first match wins:
//!
//! 1. the remote identity must parse from the transport address
//! 2. our own identity gets the master handler
//! 3. a promiscuous node grants everybody the public handler
//! 4. otherwise the trust graph must authorize the remote, first under the
//!    tag it presented, then under each other known feed format
//!
//! Rejected streams get no handler at all.

use crate::graph::{AuthError, Authorizer};
use crate::metrics::{self, SharedMetrics, Timer};
use std::fmt;
use std::sync::Arc;
use tangle_core::{FeedRef, RefAlgo};
use tangle_net::{AddrError, ConnGate, HandlerRegistry, TransportAddr};
use thiserror::Error;
use tracing::debug;

/// Hops between a direct follow and our own position in the graph
pub const HOP_OFFSET: usize = 2;

/// Gate rejections
#[derive(Debug, Error)]
pub enum GateError {
    #[error("cannot derive remote identity: {0}")]
    AddressParse(#[from] AddrError),
    #[error("{remote:?} not authorized under any feed format: {source}")]
    FallbackExhausted {
        remote: FeedRef,
        #[source]
        source: AuthError,
    },
}

impl GateError {
    /// Short label for rejection counters
    pub fn label(&self) -> &'static str {
        match self {
            GateError::AddressParse(_) => "address",
            GateError::FallbackExhausted {
                source: AuthError::Blocked { .. },
                ..
            } => "blocked",
            GateError::FallbackExhausted {
                source: AuthError::TooFar { .. },
                ..
            } => "too_far",
        }
    }
}

/// Access level granted to an admitted connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    /// Our own identity: full control
    Master,
    Public,
}

impl fmt::Display for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grant::Master => write!(f, "master"),
            Grant::Public => write!(f, "public"),
        }
    }
}

/// Accept policy for inbound connections
pub struct ConnectionGate {
    self_feed: FeedRef,
    promisc: bool,
    authorizer: Authorizer,
    master: Arc<HandlerRegistry>,
    public: Arc<HandlerRegistry>,
    metrics: SharedMetrics,
}

impl ConnectionGate {
    /// `authorizer` must be rooted at `self_feed`; its hop budget already
    /// includes [`HOP_OFFSET`].
    pub fn new(
        self_feed: FeedRef,
        promisc: bool,
        authorizer: Authorizer,
        master: Arc<HandlerRegistry>,
        public: Arc<HandlerRegistry>,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            self_feed,
            promisc,
            authorizer,
            master,
            public,
            metrics,
        }
    }

    /// Run the decision procedure for `remote`
    pub fn decide(&self, remote: &TransportAddr) -> Result<Grant, GateError> {
        let remote = remote.feed_ref()?;

        if remote == self.self_feed {
            return Ok(Grant::Master);
        }
        if self.promisc {
            return Ok(Grant::Public);
        }

        let _timer = Timer::start(&self.metrics, "graph_auth");
        let mut last = match self.authorizer.authorize(&remote) {
            Ok(hops) => {
                debug!("{:?} authorized at {} hops", remote, hops);
                return Ok(Grant::Public);
            }
            Err(e) => e,
        };

        for algo in RefAlgo::ALL.into_iter().filter(|algo| *algo != remote.algo) {
            let alternate = remote.with_algo(algo);
            match self.authorizer.authorize(&alternate) {
                Ok(hops) => {
                    debug!("{:?} authorized as {:?} at {} hops", remote, alternate, hops);
                    return Ok(Grant::Public);
                }
                Err(e) => last = e,
            }
        }

        Err(GateError::FallbackExhausted {
            remote,
            source: last,
        })
    }

    fn handler(&self, grant: Grant) -> Arc<HandlerRegistry> {
        match grant {
            Grant::Master => self.master.clone(),
            Grant::Public => self.public.clone(),
        }
    }
}

impl ConnGate for ConnectionGate {
    fn admit(&self, remote: &TransportAddr) -> anyhow::Result<Arc<HandlerRegistry>> {
        match self.decide(remote) {
            Ok(grant) => {
                metrics::incr(&self.metrics, metrics::CONN_ACCEPTED, &grant.to_string());
                Ok(self.handler(grant))
            }
            Err(e) => {
                metrics::incr(&self.metrics, metrics::CONN_REJECTED, e.label());
                Err(e.into())
            }
        }
    }
}
