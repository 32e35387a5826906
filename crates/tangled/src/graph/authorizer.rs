//! Authorization queries bound to a root identity and hop budget

use super::{AuthError, TrustGraph};
use std::sync::Arc;
use tangle_core::FeedRef;

/// Answers "may this peer connect?" for a fixed root and hop budget.
///
/// Holds no state of its own; every query reads the live graph.
#[derive(Debug, Clone)]
pub struct Authorizer {
    graph: Arc<TrustGraph>,
    root: FeedRef,
    max_hops: usize,
}

impl Authorizer {
    pub fn new(graph: Arc<TrustGraph>, root: FeedRef, max_hops: usize) -> Self {
        Self {
            graph,
            root,
            max_hops,
        }
    }

    pub fn root(&self) -> &FeedRef {
        &self.root
    }

    pub fn max_hops(&self) -> usize {
        self.max_hops
    }

    /// Hops used to reach `candidate`, or why it is not authorized
    pub fn authorize(&self, candidate: &FeedRef) -> Result<usize, AuthError> {
        self.graph.authorize(&self.root, candidate, self.max_hops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::FOLLOW_WEIGHT;

    #[test]
    fn test_reads_live_graph() {
        let graph = Arc::new(TrustGraph::new());
        let root = FeedRef::ed25519([0; 32]);
        let peer = FeedRef::ed25519([1; 32]);
        let auth = Authorizer::new(graph.clone(), root, 2);

        assert!(auth.authorize(&peer).is_err());

        graph.add_or_update_edge(root, peer, FOLLOW_WEIGHT, false);
        assert_eq!(auth.authorize(&peer), Ok(1));

        graph.add_or_update_edge(root, peer, FOLLOW_WEIGHT, true);
        assert_eq!(
            auth.authorize(&peer),
            Err(AuthError::Blocked { candidate: peer })
        );
    }
}
