//! Optimistic state tracking
//!
//! Every node and edge carries the set of in-flight mutations editing it.
//! Marking and unmarking are by mutation identity, so a mutation that settles
//! late can never clear the marker of another mutation still in flight, and
//! repeated marks or unmarks are no-ops.

mod registry;

pub use registry::{InFlight, InFlightGuard, InFlightRegistry};

use crate::graph::Graph;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use uuid::Uuid;

/// Unique identifier for one mutation call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationId(Uuid);

impl MutationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for MutationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MutationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The set of mutations currently editing one node or edge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PendingSet(BTreeSet<MutationId>);

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `id` was not already present
    pub fn insert(&mut self, id: MutationId) -> bool {
        self.0.insert(id)
    }

    /// Returns true if `id` was present
    pub fn remove(&mut self, id: &MutationId) -> bool {
        self.0.remove(id)
    }

    pub fn contains(&self, id: &MutationId) -> bool {
        self.0.contains(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MutationId> {
        self.0.iter()
    }

    pub fn retain(&mut self, keep: impl FnMut(&MutationId) -> bool) {
        self.0.retain(keep)
    }
}

impl FromIterator<MutationId> for PendingSet {
    fn from_iter<I: IntoIterator<Item = MutationId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Anything that carries a pending-mutation set
pub trait Pending {
    fn pending(&self) -> &PendingSet;
    fn pending_mut(&mut self) -> &mut PendingSet;
}

/// Record that `id` is editing `entity`. Idempotent.
pub fn mark<P: Pending + ?Sized>(entity: &mut P, id: MutationId) -> bool {
    entity.pending_mut().insert(id)
}

/// Clear `id` from `entity`. Idempotent; a no-op if absent.
pub fn unmark<P: Pending + ?Sized>(entity: &mut P, id: &MutationId) -> bool {
    entity.pending_mut().remove(id)
}

pub fn is_pending<P: Pending + ?Sized>(entity: &P) -> bool {
    !entity.pending().is_empty()
}

pub fn pending_count<P: Pending + ?Sized>(entity: &P) -> usize {
    entity.pending().len()
}

/// Clear `id` from every node and edge in the graph
///
/// Returns how many markers were removed.
pub fn unmark_everywhere(graph: &mut Graph, id: &MutationId) -> usize {
    let nodes = graph.nodes.values_mut().map(|n| unmark(n, id)).filter(|hit| *hit).count();
    let edges = graph.edges.values_mut().map(|e| unmark(e, id)).filter(|hit| *hit).count();
    nodes + edges
}

/// Clear every marker whose mutation is no longer in flight
///
/// Used when a mutation's context was lost and no targeted cleanup is
/// possible: markers of live mutations survive. Returns how many were removed.
pub fn clear_stale(graph: &mut Graph, active: &HashSet<MutationId>) -> usize {
    let mut removed = 0;
    let mut sweep = |set: &mut PendingSet| {
        let before = set.len();
        set.retain(|id| active.contains(id));
        removed += before - set.len();
    };
    for node in graph.nodes.values_mut() {
        sweep(node.pending_mut());
    }
    for edge in graph.edges.values_mut() {
        sweep(edge.pending_mut());
    }
    removed
}
