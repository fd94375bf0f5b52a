//! Edge representation derived from relationship fields

use super::node::NodeId;
use crate::optimistic::{Pending, PendingSet};
use crate::schema::RelationshipType;
use serde::{Deserialize, Serialize};

/// Unique identifier for an edge
///
/// Always `source::relationField::target`, so one relationship-field
/// instance maps to exactly one edge even when ids contain hyphens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(String);

impl EdgeId {
    pub const SEPARATOR: &'static str = "::";

    pub fn compose(source: &NodeId, relation_field: &str, target: &NodeId) -> Self {
        Self(format!(
            "{}{sep}{}{sep}{}",
            source,
            relation_field,
            target,
            sep = Self::SEPARATOR
        ))
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EdgeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A directed edge drawn by one entity's relationship field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub relationship_type: RelationshipType,
    /// The entity field that produced this edge
    pub relation_field: String,
    #[serde(default, skip_serializing_if = "PendingSet::is_empty")]
    pub pending_mutation_ids: PendingSet,
}

impl Edge {
    pub fn new(
        source: NodeId,
        relation_field: impl Into<String>,
        target: NodeId,
        relationship_type: RelationshipType,
    ) -> Self {
        let relation_field = relation_field.into();
        Self {
            id: EdgeId::compose(&source, &relation_field, &target),
            source,
            target,
            relationship_type,
            relation_field,
            pending_mutation_ids: PendingSet::new(),
        }
    }

    pub fn touches(&self, node: &NodeId) -> bool {
        &self.source == node || &self.target == node
    }

    /// Move an endpoint from `from` to `to`, recomputing the id.
    pub fn retarget(&mut self, from: &NodeId, to: &NodeId) {
        if &self.source == from {
            self.source = to.clone();
        }
        if &self.target == from {
            self.target = to.clone();
        }
        self.id = EdgeId::compose(&self.source, &self.relation_field, &self.target);
    }

    pub fn pending_count(&self) -> usize {
        self.pending_mutation_ids.len()
    }
}

impl Pending for Edge {
    fn pending(&self) -> &PendingSet {
        &self.pending_mutation_ids
    }

    fn pending_mut(&mut self) -> &mut PendingSet {
        &mut self.pending_mutation_ids
    }
}
