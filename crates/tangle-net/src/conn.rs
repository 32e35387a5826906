//! Live connection tracking

use crate::addr::TransportAddr;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A connection currently being served
#[derive(Debug)]
struct TrackedConn {
    remote: TransportAddr,
    scope: CancellationToken,
    opened_at: Instant,
}

/// Registry of served connections, used to tear them down on shutdown
#[derive(Debug, Default)]
pub struct ConnTracker {
    conns: Mutex<HashMap<u64, TrackedConn>>,
    next_id: AtomicU64,
}

impl ConnTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a connection until the returned guard drops.
    ///
    /// Cancelling `scope` must end the connection's serving task.
    pub fn track(self: &Arc<Self>, remote: TransportAddr, scope: CancellationToken) -> ConnGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.conns.lock().insert(
            id,
            TrackedConn {
                remote,
                scope,
                opened_at: Instant::now(),
            },
        );
        ConnGuard {
            tracker: self.clone(),
            id,
        }
    }

    /// Number of live connections
    pub fn count(&self) -> usize {
        self.conns.lock().len()
    }

    /// Remote addresses of live connections
    pub fn active(&self) -> Vec<TransportAddr> {
        self.conns
            .lock()
            .values()
            .map(|c| c.remote.clone())
            .collect()
    }

    /// Cancel every live connection. Returns how many were cancelled.
    pub fn close_all(&self) -> usize {
        let conns = self.conns.lock();
        for conn in conns.values() {
            debug!(
                "Closing connection to {} (open {:?})",
                conn.remote,
                conn.opened_at.elapsed()
            );
            conn.scope.cancel();
        }
        conns.len()
    }

    fn untrack(&self, id: u64) {
        self.conns.lock().remove(&id);
    }
}

/// Removes its connection from the tracker when dropped
#[derive(Debug)]
pub struct ConnGuard {
    tracker: Arc<ConnTracker>,
    id: u64,
}

impl Drop for ConnGuard {
    fn drop(&mut self) {
        self.tracker.untrack(self.id);
    }
}
