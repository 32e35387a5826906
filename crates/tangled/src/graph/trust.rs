//! Weighted directed trust graph

use super::{AuthError, BLOCK_THRESHOLD, BLOCK_WEIGHT, FOLLOW_WEIGHT};
use parking_lot::Mutex;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;
use tangle_core::FeedRef;

/// What an edge represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeClass {
    /// Follow, neutral or block relationship
    Contact,
    /// Same-owner identity link (never a trust relation)
    Link,
}

/// Edge payload
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrustEdge {
    pub weight: f64,
    pub class: EdgeClass,
}

impl TrustEdge {
    /// Contact edge; `is_block` forces the block weight
    pub fn contact(weight: f64, is_block: bool) -> Self {
        Self {
            weight: if is_block { BLOCK_WEIGHT } else { weight },
            class: EdgeClass::Contact,
        }
    }

    pub fn link() -> Self {
        Self {
            weight: FOLLOW_WEIGHT,
            class: EdgeClass::Link,
        }
    }

    pub fn is_block(&self) -> bool {
        self.class == EdgeClass::Contact && self.weight > BLOCK_THRESHOLD
    }

    /// Traversable during authorization
    pub fn is_follow(&self) -> bool {
        self.class == EdgeClass::Contact && !self.is_block() && self.weight > 0.0
    }
}

/// Lock-protected graph contents
#[derive(Debug, Default)]
pub(super) struct GraphState {
    pub(super) graph: DiGraph<FeedRef, TrustEdge>,
    pub(super) index: HashMap<FeedRef, NodeIndex>,
    pub(super) names: HashMap<FeedRef, String>,
}

impl GraphState {
    fn node(&mut self, feed: FeedRef) -> NodeIndex {
        if let Some(ix) = self.index.get(&feed) {
            return *ix;
        }
        let ix = self.graph.add_node(feed);
        self.index.insert(feed, ix);
        ix
    }

    /// Insert or replace the edge of `edge.class` for the ordered pair.
    ///
    /// A pair holds at most one edge per class, so an identity link never
    /// displaces a contact edge or the other way round.
    fn upsert(&mut self, from: FeedRef, to: FeedRef, edge: TrustEdge) {
        let a = self.node(from);
        let b = self.node(to);
        let existing = self
            .graph
            .edges_connecting(a, b)
            .find(|e| e.weight().class == edge.class)
            .map(|e| e.id());
        match existing {
            Some(ix) => self.graph[ix] = edge,
            None => {
                self.graph.add_edge(a, b, edge);
            }
        }
    }
}

/// Trust graph shared by the connection gate and contact ingestion.
///
/// Every read and write takes the same exclusive lock.
#[derive(Debug, Default)]
pub struct TrustGraph {
    state: Mutex<GraphState>,
}

impl TrustGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the contact edge `from -> to`
    pub fn add_or_update_edge(&self, from: FeedRef, to: FeedRef, weight: f64, is_block: bool) {
        self.state
            .lock()
            .upsert(from, to, TrustEdge::contact(weight, is_block));
    }

    /// Insert or replace `main -> sub` as an identity link
    pub fn add_link(&self, main: FeedRef, sub: FeedRef) {
        self.state.lock().upsert(main, sub, TrustEdge::link());
    }

    /// Record a display name. Does not add a node.
    pub fn set_name(&self, feed: FeedRef, name: impl Into<String>) {
        self.state.lock().names.insert(feed, name.into());
    }

    pub fn name(&self, feed: &FeedRef) -> Option<String> {
        self.state.lock().names.get(feed).cloned()
    }

    /// Number of distinct identities seen as edge endpoints
    pub fn node_count(&self) -> usize {
        self.state.lock().graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.state.lock().graph.edge_count()
    }

    /// Current contact edge for the ordered pair
    pub fn edge(&self, from: &FeedRef, to: &FeedRef) -> Option<TrustEdge> {
        let state = self.state.lock();
        let a = *state.index.get(from)?;
        let b = *state.index.get(to)?;
        let edge = state
            .graph
            .edges_connecting(a, b)
            .map(|e| *e.weight())
            .find(|e| e.class == EdgeClass::Contact);
        edge
    }

    /// Outgoing edges of `from`
    pub fn outgoing(&self, from: &FeedRef) -> Vec<(FeedRef, TrustEdge)> {
        let state = self.state.lock();
        let Some(&a) = state.index.get(from) else {
            return Vec::new();
        };
        state
            .graph
            .edges(a)
            .map(|e| (state.graph[e.target()], *e.weight()))
            .collect()
    }

    /// Decide whether `candidate` is trusted from `root` within `max_hops`.
    ///
    /// Breadth-first over follow edges, one hop level at a time. A block edge
    /// targeting `candidate` from any node scanned before a path is found
    /// vetoes. Nodes at depth `max_hops` are scanned for blocks only. On
    /// success returns the minimal number of hops.
    pub fn authorize(
        &self,
        root: &FeedRef,
        candidate: &FeedRef,
        max_hops: usize,
    ) -> Result<usize, AuthError> {
        if root == candidate {
            return Ok(0);
        }
        let too_far = AuthError::TooFar {
            candidate: *candidate,
            max_hops,
        };

        let state = self.state.lock();
        let (Some(&root_ix), Some(&candidate_ix)) =
            (state.index.get(root), state.index.get(candidate))
        else {
            return Err(too_far);
        };

        let graph = &state.graph;
        let mut visited = vec![false; graph.node_count()];
        visited[root_ix.index()] = true;
        let mut frontier = vec![root_ix];
        let mut hops = 0;

        while !frontier.is_empty() && hops <= max_hops {
            let mut reached = false;
            let mut next = Vec::new();

            for &ix in &frontier {
                for edge in graph.edges(ix) {
                    let weight = edge.weight();
                    let target = edge.target();
                    if target == candidate_ix {
                        if weight.is_block() {
                            return Err(AuthError::Blocked {
                                candidate: *candidate,
                            });
                        }
                        if weight.is_follow() && hops < max_hops {
                            reached = true;
                        }
                    } else if weight.is_follow() && hops < max_hops && !visited[target.index()] {
                        visited[target.index()] = true;
                        next.push(target);
                    }
                }
            }

            if reached {
                return Ok(hops + 1);
            }
            frontier = next;
            hops += 1;
        }

        Err(too_far)
    }

    /// Identities reachable from `root` over follow edges within `max_hops`,
    /// excluding those `root` blocks directly. Includes `root`.
    pub fn reachable(&self, root: &FeedRef, max_hops: usize) -> Vec<FeedRef> {
        let state = self.state.lock();
        let Some(&root_ix) = state.index.get(root) else {
            return vec![*root];
        };

        let graph = &state.graph;
        let blocked: Vec<NodeIndex> = graph
            .edges(root_ix)
            .filter(|e| e.weight().is_block())
            .map(|e| e.target())
            .collect();

        let mut visited = vec![false; graph.node_count()];
        visited[root_ix.index()] = true;
        let mut found = vec![*root];
        let mut frontier = vec![root_ix];
        for _ in 0..max_hops {
            let mut next = Vec::new();
            for &ix in &frontier {
                for edge in graph.edges(ix) {
                    let target = edge.target();
                    if edge.weight().is_follow()
                        && !visited[target.index()]
                        && !blocked.contains(&target)
                    {
                        visited[target.index()] = true;
                        found.push(graph[target]);
                        next.push(target);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        found.sort();
        found
    }

    /// Run `f` with the graph locked
    pub(super) fn with_state<R>(&self, f: impl FnOnce(&GraphState) -> R) -> R {
        f(&self.state.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NEUTRAL_WEIGHT;
    use proptest::prelude::*;
    use tangle_core::RefAlgo;

    fn feed(n: u8) -> FeedRef {
        FeedRef::ed25519([n; 32])
    }

    fn follow(g: &TrustGraph, from: u8, to: u8) {
        g.add_or_update_edge(feed(from), feed(to), FOLLOW_WEIGHT, false);
    }

    fn block(g: &TrustGraph, from: u8, to: u8) {
        g.add_or_update_edge(feed(from), feed(to), FOLLOW_WEIGHT, true);
    }

    #[test]
    fn test_chain_hop_budget() {
        // R(0) -> A(1) -> B(2)
        let g = TrustGraph::new();
        follow(&g, 0, 1);
        follow(&g, 1, 2);

        assert_eq!(g.authorize(&feed(0), &feed(1), 1), Ok(1));
        assert!(matches!(
            g.authorize(&feed(0), &feed(2), 1),
            Err(AuthError::TooFar { max_hops: 1, .. })
        ));
        assert_eq!(g.authorize(&feed(0), &feed(2), 2), Ok(2));
        assert_eq!(g.authorize(&feed(0), &feed(2), 5), Ok(2));
    }

    #[test]
    fn test_intermediate_block_vetoes() {
        // R follows A, A blocks B
        let g = TrustGraph::new();
        follow(&g, 0, 1);
        block(&g, 1, 2);

        for hops in 1..6 {
            assert!(matches!(
                g.authorize(&feed(0), &feed(2), hops),
                Err(AuthError::Blocked { .. })
            ));
        }
    }

    #[test]
    fn test_direct_block_any_budget() {
        let g = TrustGraph::new();
        block(&g, 0, 1);
        follow(&g, 0, 2);
        follow(&g, 2, 1);

        for hops in 0..6 {
            assert_eq!(
                g.authorize(&feed(0), &feed(1), hops),
                Err(AuthError::Blocked { candidate: feed(1) })
            );
        }
    }

    #[test]
    fn test_block_at_same_level_beats_follow() {
        // R -> A -> C and R -> B -x C: both reach C at the second level
        let g = TrustGraph::new();
        follow(&g, 0, 1);
        follow(&g, 0, 2);
        follow(&g, 1, 3);
        block(&g, 2, 3);

        assert!(matches!(
            g.authorize(&feed(0), &feed(3), 3),
            Err(AuthError::Blocked { .. })
        ));
    }

    #[test]
    fn test_deeper_block_does_not_poison_shorter_path() {
        // R -> C directly, and R -> A -> B -x C further out
        let g = TrustGraph::new();
        follow(&g, 0, 3);
        follow(&g, 0, 1);
        follow(&g, 1, 2);
        block(&g, 2, 3);

        assert_eq!(g.authorize(&feed(0), &feed(3), 4), Ok(1));
    }

    #[test]
    fn test_block_on_other_node_does_not_poison() {
        // A blocks X, but R reaches B through A
        let g = TrustGraph::new();
        follow(&g, 0, 1);
        follow(&g, 1, 2);
        block(&g, 1, 9);

        assert_eq!(g.authorize(&feed(0), &feed(2), 2), Ok(2));
    }

    #[test]
    fn test_last_write_wins() {
        let g = TrustGraph::new();
        follow(&g, 0, 1);
        block(&g, 0, 1);
        assert_eq!(g.edge_count(), 1);
        assert!(g.edge(&feed(0), &feed(1)).unwrap().is_block());

        follow(&g, 0, 1);
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.authorize(&feed(0), &feed(1), 1), Ok(1));
    }

    #[test]
    fn test_neutral_edge_not_traversable() {
        let g = TrustGraph::new();
        follow(&g, 0, 1);
        g.add_or_update_edge(feed(0), feed(1), NEUTRAL_WEIGHT, false);

        assert!(matches!(
            g.authorize(&feed(0), &feed(1), 3),
            Err(AuthError::TooFar { .. })
        ));
    }

    #[test]
    fn test_heavy_weight_counts_as_block() {
        let g = TrustGraph::new();
        g.add_or_update_edge(feed(0), feed(1), 2.0, false);
        assert!(g.edge(&feed(0), &feed(1)).unwrap().is_block());
        assert!(matches!(
            g.authorize(&feed(0), &feed(1), 1),
            Err(AuthError::Blocked { .. })
        ));
    }

    #[test]
    fn test_root_reaches_itself() {
        let g = TrustGraph::new();
        assert_eq!(g.authorize(&feed(0), &feed(0), 0), Ok(0));

        block(&g, 0, 0);
        assert_eq!(g.authorize(&feed(0), &feed(0), 0), Ok(0));
    }

    #[test]
    fn test_unknown_identities_too_far() {
        let g = TrustGraph::new();
        follow(&g, 0, 1);
        assert!(matches!(
            g.authorize(&feed(0), &feed(7), 3),
            Err(AuthError::TooFar { .. })
        ));
        assert!(matches!(
            g.authorize(&feed(7), &feed(1), 3),
            Err(AuthError::TooFar { .. })
        ));
    }

    #[test]
    fn test_links_are_not_trust() {
        let g = TrustGraph::new();
        g.add_link(feed(0), feed(1));
        assert!(matches!(
            g.authorize(&feed(0), &feed(1), 3),
            Err(AuthError::TooFar { .. })
        ));
    }

    #[test]
    fn test_link_keeps_contact_edge() {
        let g = TrustGraph::new();
        follow(&g, 0, 1);
        g.add_link(feed(0), feed(1));
        g.add_link(feed(0), feed(1));

        assert_eq!(g.edge_count(), 2);
        assert!(g.edge(&feed(0), &feed(1)).unwrap().is_follow());
        assert_eq!(g.authorize(&feed(0), &feed(1), 1), Ok(1));

        block(&g, 0, 1);
        assert_eq!(g.edge_count(), 2);
        assert!(matches!(
            g.authorize(&feed(0), &feed(1), 1),
            Err(AuthError::Blocked { .. })
        ));
    }

    #[test]
    fn test_format_tags_are_separate_nodes() {
        let g = TrustGraph::new();
        let alt = feed(1).with_algo(RefAlgo::Gabby);
        g.add_or_update_edge(feed(0), alt, FOLLOW_WEIGHT, false);

        assert_eq!(g.node_count(), 2);
        assert!(g.authorize(&feed(0), &feed(1), 2).is_err());
        assert_eq!(g.authorize(&feed(0), &alt, 2), Ok(1));
    }

    #[test]
    fn test_names_do_not_add_nodes() {
        let g = TrustGraph::new();
        g.set_name(feed(4), "dana");
        assert_eq!(g.node_count(), 0);
        assert_eq!(g.name(&feed(4)).as_deref(), Some("dana"));
    }

    #[test]
    fn test_reachable_skips_blocked() {
        let g = TrustGraph::new();
        follow(&g, 0, 1);
        follow(&g, 1, 2);
        follow(&g, 2, 3);
        follow(&g, 1, 4);
        block(&g, 0, 4);

        assert_eq!(g.reachable(&feed(0), 2), vec![feed(0), feed(1), feed(2)]);
        assert_eq!(g.reachable(&feed(9), 2), vec![feed(9)]);
    }

    proptest! {
        #[test]
        fn prop_node_count_is_distinct_endpoints(
            edges in proptest::collection::vec((0u8..12, 0u8..12, any::<bool>()), 0..60)
        ) {
            let g = TrustGraph::new();
            let mut seen = std::collections::HashSet::new();
            for (from, to, is_block) in &edges {
                g.add_or_update_edge(feed(*from), feed(*to), FOLLOW_WEIGHT, *is_block);
                seen.insert(*from);
                seen.insert(*to);
            }
            prop_assert_eq!(g.node_count(), seen.len());
        }

        #[test]
        fn prop_direct_block_always_vetoes(
            edges in proptest::collection::vec((0u8..8, 0u8..8), 0..30),
            hops in 0usize..6,
        ) {
            let g = TrustGraph::new();
            for (from, to) in &edges {
                follow(&g, *from, *to);
            }
            block(&g, 0, 1);
            prop_assert_eq!(
                g.authorize(&feed(0), &feed(1), hops),
                Err(AuthError::Blocked { candidate: feed(1) })
            );
        }
    }
}
