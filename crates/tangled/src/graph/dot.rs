//! Graphviz export of the trust graph (debugging only)

use super::trust::{EdgeClass, TrustEdge, TrustGraph};
use petgraph::dot::{Config, Dot};
use std::fmt;
use tangle_core::FeedRef;

/// Color of ordinary follow (and neutral) edges
pub const FOLLOW_COLOR: &str = "black";
/// Color of block edges
pub const BLOCK_COLOR: &str = "firebrick1";
/// Color of identity links
pub const LINK_COLOR: &str = "green";

impl fmt::Display for TrustEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.weight)
    }
}

/// Color attribute for an edge
pub fn edge_color(edge: &TrustEdge) -> &'static str {
    match edge.class {
        EdgeClass::Link => LINK_COLOR,
        EdgeClass::Contact if edge.is_block() => BLOCK_COLOR,
        EdgeClass::Contact => FOLLOW_COLOR,
    }
}

/// Display name if known, short sigil otherwise
pub fn node_label(feed: &FeedRef, name: Option<&str>) -> String {
    match name {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => feed.short_sigil(),
    }
}

impl TrustGraph {
    /// Render the graph in DOT format
    pub fn to_dot(&self) -> String {
        self.with_state(|state| {
            Dot::with_attr_getters(
                &state.graph,
                &[Config::EdgeNoLabel, Config::NodeNoLabel],
                &|_, edge| format!("color={}", edge_color(edge.weight())),
                &|_, (_, feed)| {
                    let name = state.names.get(feed).map(String::as_str);
                    format!("label={:?}", node_label(feed, name))
                },
            )
            .to_string()
        })
    }
}
