//! Social graph with copy-on-write sharing
//!
//! Replicated engines start out sharing one adjacency map. The first
//! mutation through any handle detaches that handle onto a private copy;
//! the other handles keep seeing the shared original.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use ferry_core::NodeId;

type Adjacency = BTreeMap<NodeId, BTreeSet<NodeId>>;

/// Undirected neighbor relation derived from contact history
#[derive(Debug, Clone, Default)]
pub struct SocialGraph {
    adjacency: Arc<Adjacency>,
}

impl SocialGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Neighbors of `node`, in id order
    pub fn neighbors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.adjacency
            .get(&node)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    pub fn neighbor_count(&self, node: NodeId) -> usize {
        self.adjacency.get(&node).map_or(0, BTreeSet::len)
    }

    pub fn has_edge(&self, a: NodeId, b: NodeId) -> bool {
        self.adjacency.get(&a).is_some_and(|set| set.contains(&b))
    }

    /// Add the symmetric edge `a - b`. Returns whether the graph changed.
    pub fn add_edge(&mut self, a: NodeId, b: NodeId) -> bool {
        if a == b || self.has_edge(a, b) {
            return false;
        }
        let adjacency = self.ensure_private();
        adjacency.entry(a).or_default().insert(b);
        adjacency.entry(b).or_default().insert(a);
        true
    }

    /// Remove the symmetric edge `a - b`. Returns whether the graph changed.
    pub fn remove_edge(&mut self, a: NodeId, b: NodeId) -> bool {
        if !self.has_edge(a, b) {
            return false;
        }
        let adjacency = self.ensure_private();
        for (from, to) in [(a, b), (b, a)] {
            if let Some(set) = adjacency.get_mut(&from) {
                set.remove(&to);
                if set.is_empty() {
                    adjacency.remove(&from);
                }
            }
        }
        true
    }

    /// Number of distinct edges
    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(BTreeSet::len).sum::<usize>() / 2
    }

    /// Whether another handle still reads the same storage
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.adjacency) > 1
    }

    pub fn shares_storage_with(&self, other: &SocialGraph) -> bool {
        Arc::ptr_eq(&self.adjacency, &other.adjacency)
    }

    fn ensure_private(&mut self) -> &mut Adjacency {
        Arc::make_mut(&mut self.adjacency)
    }
}
