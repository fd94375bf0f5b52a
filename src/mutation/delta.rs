//! Delta reconciler
//!
//! A server delta names nodes and edges created, updated and deleted by one
//! mutation. Applying it is an upsert/delete pass in a fixed order so that
//! applying the same delta twice leaves the cache as applying it once.

use crate::graph::{Edge, EdgeId, Graph, Node, NodeId};
use crate::optimistic::{MutationId, Pending, PendingSet};
use serde::{Deserialize, Serialize};

/// Id of a deleted node or edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deleted {
    pub id: String,
}

impl Deleted {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Created, updated and deleted items of one kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ChangeSet<T> {
    #[serde(default)]
    pub created: Vec<T>,
    #[serde(default)]
    pub updated: Vec<T>,
    #[serde(default)]
    pub deleted: Vec<Deleted>,
}

impl<T> Default for ChangeSet<T> {
    fn default() -> Self {
        Self {
            created: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
        }
    }
}

impl<T> ChangeSet<T> {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    fn upserts(&self) -> impl Iterator<Item = &T> {
        self.created.iter().chain(self.updated.iter())
    }
}

/// The server's account of what one mutation changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDelta {
    #[serde(default)]
    pub nodes: ChangeSet<Node>,
    #[serde(default)]
    pub edges: ChangeSet<Edge>,
}

impl GraphDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_node(mut self, node: Node) -> Self {
        self.nodes.created.push(node);
        self
    }

    pub fn update_node(mut self, node: Node) -> Self {
        self.nodes.updated.push(node);
        self
    }

    pub fn delete_node(mut self, id: impl Into<String>) -> Self {
        self.nodes.deleted.push(Deleted::new(id));
        self
    }

    pub fn create_edge(mut self, edge: Edge) -> Self {
        self.edges.created.push(edge);
        self
    }

    pub fn update_edge(mut self, edge: Edge) -> Self {
        self.edges.updated.push(edge);
        self
    }

    pub fn delete_edge(mut self, id: impl Into<String>) -> Self {
        self.edges.deleted.push(Deleted::new(id));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

/// Counts of what a delta changed in the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeltaSummary {
    pub nodes_upserted: usize,
    pub nodes_removed: usize,
    pub edges_upserted: usize,
    pub edges_removed: usize,
}

impl DeltaSummary {
    /// True if applying the delta changed nothing
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Apply a server delta on behalf of `mutation_id`.
///
/// Order: node upserts, edge upserts, edge deletions, node deletions (which
/// also drop the deleted node's edges). Upserted items take the server's
/// fields but keep the pending markers of other mutations; `mutation_id`'s
/// own marker is dropped. Upserts count only if they changed the cache.
pub fn apply_delta(graph: &mut Graph, delta: &GraphDelta, mutation_id: &MutationId) -> DeltaSummary {
    let mut summary = DeltaSummary::default();

    for incoming in delta.nodes.upserts() {
        let pending = carried_pending(graph.get_node(&incoming.id), mutation_id);
        let mut node = incoming.clone();
        *node.pending_mut() = pending;
        if graph.get_node(&node.id) != Some(&node) {
            graph.add_node(node);
            summary.nodes_upserted += 1;
        }
    }

    for incoming in delta.edges.upserts() {
        let pending = carried_pending(graph.get_edge(&incoming.id), mutation_id);
        let mut edge = incoming.clone();
        *edge.pending_mut() = pending;
        if graph.get_edge(&edge.id) != Some(&edge) {
            graph.edges.insert(edge.id.clone(), edge);
            summary.edges_upserted += 1;
        }
    }

    for deleted in &delta.edges.deleted {
        if graph.remove_edge(&EdgeId::from_string(deleted.id.as_str())).is_some() {
            summary.edges_removed += 1;
        }
    }

    for deleted in &delta.nodes.deleted {
        if let Some((_, edges)) = graph.remove_node_cascade(&NodeId::from_string(deleted.id.as_str())) {
            summary.nodes_removed += 1;
            summary.edges_removed += edges.len();
        }
    }

    summary
}

fn carried_pending<P: Pending>(existing: Option<&P>, mutation_id: &MutationId) -> PendingSet {
    existing
        .map(|item| item.pending().iter().filter(|id| *id != mutation_id).copied().collect())
        .unwrap_or_default()
}
