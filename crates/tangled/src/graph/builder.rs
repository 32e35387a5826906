//! Graph builder: keeps the trust graph in step with the contact log

use super::{Authorizer, TrustGraph, BLOCK_WEIGHT, FOLLOW_WEIGHT, NEUTRAL_WEIGHT};
use crate::contacts::ContactLog;
use crate::metrics::{self, SharedMetrics};
use crate::storage::StorageError;
use parking_lot::Mutex;
use std::sync::Arc;
use tangle_core::{ContactMessage, FeedRef};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Applies graph-update messages to a shared [`TrustGraph`]
pub struct GraphBuilder {
    graph: Arc<TrustGraph>,
    /// Next log sequence number to apply
    applied: Mutex<u64>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            graph: Arc::new(TrustGraph::new()),
            applied: Mutex::new(0),
        }
    }

    pub fn graph(&self) -> &Arc<TrustGraph> {
        &self.graph
    }

    /// Apply one message
    pub fn apply(&self, msg: &ContactMessage) {
        match msg {
            ContactMessage::Contact {
                author,
                contact,
                following,
                blocking,
            } => {
                let (weight, is_block) = match (*following, *blocking) {
                    (_, true) => (BLOCK_WEIGHT, true),
                    (true, false) => (FOLLOW_WEIGHT, false),
                    (false, false) => (NEUTRAL_WEIGHT, false),
                };
                self.graph
                    .add_or_update_edge(*author, *contact, weight, is_block);
            }
            ContactMessage::About { about, name } => {
                self.graph.set_name(*about, name.clone());
            }
            ContactMessage::MetafeedLink { main, sub } => {
                self.graph.add_link(*main, *sub);
            }
        }
    }

    /// Apply every message appended since the last call. Returns how many.
    pub fn catch_up(&self, log: &ContactLog) -> Result<usize, StorageError> {
        let mut applied = self.applied.lock();
        let pending = log.since(*applied)?;
        for (seq, msg) in &pending {
            self.apply(msg);
            *applied = seq + 1;
        }
        Ok(pending.len())
    }

    /// Follow `log` until `scope` concludes
    pub async fn serve(
        self: Arc<Self>,
        log: Arc<ContactLog>,
        scope: CancellationToken,
        metrics: SharedMetrics,
    ) -> Result<(), StorageError> {
        let mut head = log.subscribe();
        loop {
            let count = self.catch_up(&log)?;
            if count > 0 {
                debug!("Applied {} contact messages", count);
                metrics::gauge(&metrics, metrics::GRAPH_NODES, self.node_count() as f64);
            }

            tokio::select! {
                _ = scope.cancelled() => break,
                changed = head.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("Graph builder stopped ({} nodes)", self.node_count());
        Ok(())
    }

    /// Authorizer rooted at `root`
    pub fn authorizer(&self, root: FeedRef, max_hops: usize) -> Authorizer {
        Authorizer::new(self.graph.clone(), root, max_hops)
    }

    /// Identities `feed` follows
    pub fn follows(&self, feed: &FeedRef) -> Vec<FeedRef> {
        let mut out: Vec<_> = self
            .graph
            .outgoing(feed)
            .into_iter()
            .filter(|(_, edge)| edge.is_follow())
            .map(|(to, _)| to)
            .collect();
        out.sort();
        out
    }

    /// Identities `feed` blocks
    pub fn blocks(&self, feed: &FeedRef) -> Vec<FeedRef> {
        let mut out: Vec<_> = self
            .graph
            .outgoing(feed)
            .into_iter()
            .filter(|(_, edge)| edge.is_block())
            .map(|(to, _)| to)
            .collect();
        out.sort();
        out
    }

    /// Identities within `max_hops` follow hops of `root`
    pub fn hops(&self, root: &FeedRef, max_hops: usize) -> Vec<FeedRef> {
        self.graph.reachable(root, max_hops)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn to_dot(&self) -> String {
        self.graph.to_dot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AuthError;
    use crate::metrics::MemoryMetrics;
    use crate::storage::Storage;
    use std::time::Duration;
    use tempfile::tempdir;

    fn feed(n: u8) -> FeedRef {
        FeedRef::ed25519([n; 32])
    }

    #[test]
    fn test_apply_contacts() {
        let builder = GraphBuilder::new();
        builder.apply(&ContactMessage::follow(feed(0), feed(1)));
        builder.apply(&ContactMessage::follow(feed(0), feed(2)));
        builder.apply(&ContactMessage::block(feed(0), feed(3)));

        assert_eq!(builder.follows(&feed(0)), vec![feed(1), feed(2)]);
        assert_eq!(builder.blocks(&feed(0)), vec![feed(3)]);
        assert_eq!(builder.node_count(), 4);

        // unfollow keeps the node but drops trust
        builder.apply(&ContactMessage::neutral(feed(0), feed(2)));
        assert_eq!(builder.follows(&feed(0)), vec![feed(1)]);
        assert_eq!(builder.node_count(), 4);
    }

    #[test]
    fn test_block_wins_over_follow_flag() {
        let builder = GraphBuilder::new();
        builder.apply(&ContactMessage::Contact {
            author: feed(0),
            contact: feed(1),
            following: true,
            blocking: true,
        });
        assert_eq!(builder.blocks(&feed(0)), vec![feed(1)]);
    }

    #[test]
    fn test_about_and_links() {
        let builder = GraphBuilder::new();
        builder.apply(&ContactMessage::About {
            about: feed(5),
            name: "erin".into(),
        });
        builder.apply(&ContactMessage::MetafeedLink {
            main: feed(5),
            sub: feed(6),
        });

        assert_eq!(builder.graph().name(&feed(5)).as_deref(), Some("erin"));
        assert_eq!(builder.node_count(), 2);
        assert!(builder.follows(&feed(5)).is_empty());
    }

    #[test]
    fn test_authorizer_and_hops() {
        let builder = GraphBuilder::new();
        builder.apply(&ContactMessage::follow(feed(0), feed(1)));
        builder.apply(&ContactMessage::follow(feed(1), feed(2)));

        let auth = builder.authorizer(feed(0), 1);
        assert_eq!(auth.authorize(&feed(1)), Ok(1));
        assert!(matches!(
            auth.authorize(&feed(2)),
            Err(AuthError::TooFar { .. })
        ));
        assert_eq!(builder.hops(&feed(0), 1), vec![feed(0), feed(1)]);
    }

    #[test]
    fn test_catch_up_replays_history() {
        let dir = tempdir().unwrap();
        let log = ContactLog::open(Arc::new(Storage::open(dir.path()).unwrap())).unwrap();
        log.append(&ContactMessage::follow(feed(0), feed(1))).unwrap();
        log.append(&ContactMessage::follow(feed(1), feed(2))).unwrap();

        let builder = GraphBuilder::new();
        assert_eq!(builder.catch_up(&log).unwrap(), 2);
        assert_eq!(builder.catch_up(&log).unwrap(), 0);
        assert_eq!(builder.node_count(), 3);

        log.append(&ContactMessage::block(feed(0), feed(2))).unwrap();
        assert_eq!(builder.catch_up(&log).unwrap(), 1);
        assert_eq!(builder.blocks(&feed(0)), vec![feed(2)]);
    }

    #[tokio::test]
    async fn test_serve_follows_appends() {
        let dir = tempdir().unwrap();
        let log = Arc::new(
            ContactLog::open(Arc::new(Storage::open(dir.path()).unwrap())).unwrap(),
        );
        let builder = Arc::new(GraphBuilder::new());
        let sink = Arc::new(MemoryMetrics::new());
        let scope = CancellationToken::new();
        let worker = tokio::spawn(builder.clone().serve(
            log.clone(),
            scope.clone(),
            Some(sink.clone()),
        ));

        log.append(&ContactMessage::follow(feed(0), feed(1))).unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while builder.node_count() < 2 {
            assert!(tokio::time::Instant::now() < deadline, "builder never caught up");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        scope.cancel();
        worker.await.unwrap().unwrap();
        assert_eq!(sink.gauge(crate::metrics::GRAPH_NODES), Some(2.0));
    }
}
