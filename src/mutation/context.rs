//! Mutation context and the granular change journal
//!
//! A context lives from the start of one mutation until it settles. The
//! journal records, per node field and per edge, the state this mutation
//! found before it wrote. Rollback and reconcile are scoped to exactly what
//! the journal and the touched set name.

use super::request::OperationKind;
use crate::graph::{CacheKey, Edge, EdgeId, Graph, NodeId, PropertyValue};
use crate::optimistic::{InFlightGuard, MutationId};
use crate::schema::EntityType;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// Node and edge ids a mutation wrote to; the blast radius of its settle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TouchedIds {
    pub nodes: BTreeSet<NodeId>,
    pub edges: BTreeSet<EdgeId>,
}

impl TouchedIds {
    pub fn touch_node(&mut self, id: &NodeId) {
        self.nodes.insert(id.clone());
    }

    pub fn touch_edge(&mut self, id: &EdgeId) {
        self.edges.insert(id.clone());
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Follow a node id swap, including the edges it rewrote.
    pub fn rename(&mut self, from: &NodeId, to: &NodeId, edges: &[(EdgeId, EdgeId)]) {
        if self.nodes.remove(from) {
            self.nodes.insert(to.clone());
        }
        for (old, new) in edges {
            if self.edges.remove(old) {
                self.edges.insert(new.clone());
            }
        }
    }
}

/// What one mutation did to one field of one node.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldChange {
    /// The field was overwritten; `applied` is the value this mutation wrote
    Replaced {
        prior: Option<PropertyValue>,
        applied: Option<PropertyValue>,
    },
    /// Ids were added to or removed from an array field
    Membership {
        prior: Option<PropertyValue>,
        added: Vec<String>,
        /// Removed ids with the index they were removed from, in removal order
        removed: Vec<(String, usize)>,
    },
}

/// Granular before-state captured while a mutation applied optimistically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeJournal {
    pub fields: BTreeMap<NodeId, BTreeMap<String, FieldChange>>,
    /// Edge state before this mutation first wrote it; `None` if absent
    pub edges: BTreeMap<EdgeId, Option<Edge>>,
    /// The node a delete removed, as it was
    pub removed_node: Option<crate::graph::Node>,
}

impl ChangeJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an overwrite; the first prior recorded for a field wins.
    pub fn record_replace(
        &mut self,
        node: &NodeId,
        field: &str,
        prior: Option<PropertyValue>,
        applied: Option<PropertyValue>,
    ) {
        let changes = self.fields.entry(node.clone()).or_default();
        match changes.get_mut(field) {
            None => {
                changes.insert(field.to_string(), FieldChange::Replaced { prior, applied });
            }
            Some(FieldChange::Replaced { applied: current, .. }) => *current = applied,
            Some(FieldChange::Membership { prior: first, .. }) => {
                let first = first.clone();
                changes.insert(
                    field.to_string(),
                    FieldChange::Replaced {
                        prior: first,
                        applied,
                    },
                );
            }
        }
    }

    /// Record that `id` was appended to an array field.
    pub fn record_added(&mut self, node: &NodeId, field: &str, prior: Option<PropertyValue>, after: &PropertyValue, id: &str) {
        let changes = self.fields.entry(node.clone()).or_default();
        match changes.get_mut(field) {
            None => {
                changes.insert(
                    field.to_string(),
                    FieldChange::Membership {
                        prior,
                        added: vec![id.to_string()],
                        removed: Vec::new(),
                    },
                );
            }
            Some(FieldChange::Membership { added, .. }) => added.push(id.to_string()),
            Some(FieldChange::Replaced { applied, .. }) => *applied = Some(after.clone()),
        }
    }

    /// Record that `id` was removed from an array field at `index`.
    pub fn record_removed(
        &mut self,
        node: &NodeId,
        field: &str,
        prior: Option<PropertyValue>,
        after: &PropertyValue,
        id: &str,
        index: usize,
    ) {
        let changes = self.fields.entry(node.clone()).or_default();
        match changes.get_mut(field) {
            None => {
                changes.insert(
                    field.to_string(),
                    FieldChange::Membership {
                        prior,
                        added: Vec::new(),
                        removed: vec![(id.to_string(), index)],
                    },
                );
            }
            Some(FieldChange::Membership { removed, .. }) => removed.push((id.to_string(), index)),
            Some(FieldChange::Replaced { applied, .. }) => *applied = Some(after.clone()),
        }
    }

    /// Record an edge's state before its first write by this mutation.
    pub fn record_edge(&mut self, id: &EdgeId, prior: Option<Edge>) {
        self.edges.entry(id.clone()).or_insert(prior);
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.edges.is_empty() && self.removed_node.is_none()
    }
}

/// Everything one mutation needs to settle.
#[derive(Debug)]
pub struct MutationContext {
    pub mutation_id: MutationId,
    pub key: CacheKey,
    pub entity_type: EntityType,
    pub kind: OperationKind,
    /// The node this mutation is about; the temp id while a create is in flight
    pub node_id: NodeId,
    /// Placeholder id of a created node before the server assigns one
    pub temp_id: Option<NodeId>,
    /// Full cache copy taken before the optimistic patch
    pub snapshot: Graph,
    pub touched: TouchedIds,
    /// `None` until the optimistic patch has committed
    pub journal: Option<ChangeJournal>,
    /// Entity body sent to the server on create
    pub request_body: Option<crate::graph::Entity>,
    pub started_at: DateTime<Utc>,
    pub(crate) guard: InFlightGuard,
}

impl MutationContext {
    pub(crate) fn new(
        guard: InFlightGuard,
        key: CacheKey,
        entity_type: EntityType,
        kind: OperationKind,
        node_id: NodeId,
        snapshot: Graph,
    ) -> Self {
        Self {
            mutation_id: guard.id(),
            key,
            entity_type,
            kind,
            node_id,
            temp_id: None,
            snapshot,
            touched: TouchedIds::default(),
            journal: None,
            request_body: None,
            started_at: Utc::now(),
            guard,
        }
    }

    /// True if granular rollback state was captured
    pub fn has_granular_state(&self) -> bool {
        self.journal.is_some()
    }
}
