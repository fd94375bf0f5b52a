//! Node representation in the cached entity graph

use crate::optimistic::{Pending, PendingSet};
use crate::schema::EntityType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unique identifier for a node
///
/// Serializes as a plain string. Stable for the node's lifetime, except for
/// the temp-id swap when a created node receives its server id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Typed field values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<PropertyValue>),
    Object(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    /// An array of string ids.
    pub fn id_list<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Array(ids.into_iter().map(|id| Self::String(id.into())).collect())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// True if this value is `id` or an array containing `id`.
    pub fn references(&self, id: &str) -> bool {
        match self {
            Self::String(s) => s == id,
            Self::Array(items) => items.iter().any(|v| v.as_str() == Some(id)),
            _ => false,
        }
    }

    /// Rewrite every occurrence of `from` to `to`, collapsing duplicates in arrays.
    pub fn replace_id(&mut self, from: &str, to: &str) -> bool {
        match self {
            Self::String(s) if s == from => {
                *s = to.to_string();
                true
            }
            Self::Array(items) if items.iter().any(|v| v.as_str() == Some(from)) => {
                let mut rewritten: Vec<PropertyValue> = Vec::with_capacity(items.len());
                for item in items.drain(..) {
                    let item = match item {
                        Self::String(s) if s == from => Self::String(to.to_string()),
                        other => other,
                    };
                    if item.as_str().is_some() && rewritten.contains(&item) {
                        continue;
                    }
                    rewritten.push(item);
                }
                *items = rewritten;
                true
            }
            _ => false,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for PropertyValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Field name to value mapping owned by a node
pub type Entity = BTreeMap<String, PropertyValue>;

/// A node in the cached graph: one entity record plus its pending markers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub entity_type: EntityType,
    #[serde(default)]
    pub entity: Entity,
    /// Mutations currently editing this node
    #[serde(default, skip_serializing_if = "PendingSet::is_empty")]
    pub pending_mutation_ids: PendingSet,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, entity_type: EntityType) -> Self {
        Self {
            id: id.into(),
            entity_type,
            entity: Entity::new(),
            pending_mutation_ids: PendingSet::new(),
        }
    }

    /// Add a field to the node
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.entity.insert(key.into(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&PropertyValue> {
        self.entity.get(key)
    }

    pub fn pending_count(&self) -> usize {
        self.pending_mutation_ids.len()
    }
}

impl Pending for Node {
    fn pending(&self) -> &PendingSet {
        &self.pending_mutation_ids
    }

    fn pending_mut(&mut self) -> &mut PendingSet {
        &mut self.pending_mutation_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_serializes_as_string() {
        let id = NodeId::from_string("char-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"char-1\"");
    }

    #[test]
    fn node_round_trips_through_wire_shape() {
        let json = serde_json::json!({
            "id": "P1",
            "entityType": "puzzle",
            "entity": { "name": "Safe", "ownerId": "char-1", "rewardIds": ["E1"] }
        });
        let node: Node = serde_json::from_value(json).unwrap();
        assert_eq!(node.entity_type, EntityType::Puzzle);
        assert_eq!(node.field("ownerId"), Some(&PropertyValue::from("char-1")));
        assert_eq!(node.field("rewardIds"), Some(&PropertyValue::id_list(["E1"])));
        assert_eq!(node.pending_count(), 0);

        let out = serde_json::to_value(&node).unwrap();
        assert!(out.get("pendingMutationIds").is_none());
    }

    #[test]
    fn null_field_deserializes_as_null() {
        let node: Node = serde_json::from_value(serde_json::json!({
            "id": "E1", "entityType": "element", "entity": { "ownerId": null }
        }))
        .unwrap();
        assert_eq!(node.field("ownerId"), Some(&PropertyValue::Null));
    }

    #[test]
    fn replace_id_collapses_duplicates() {
        let mut value = PropertyValue::id_list(["temp-1", "E9", "E2"]);
        assert!(value.replace_id("temp-1", "E9"));
        assert_eq!(value, PropertyValue::id_list(["E9", "E2"]));

        let mut single = PropertyValue::from("temp-1");
        assert!(single.replace_id("temp-1", "E9"));
        assert_eq!(single, PropertyValue::from("E9"));
        assert!(!single.replace_id("temp-1", "E9"));
    }

    #[test]
    fn references_checks_single_and_array() {
        assert!(PropertyValue::from("a").references("a"));
        assert!(PropertyValue::id_list(["b", "a"]).references("a"));
        assert!(!PropertyValue::Null.references("a"));
    }
}
