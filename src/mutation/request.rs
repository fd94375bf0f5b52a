//! Mutation payloads
//!
//! - EntityPatch: partial entity where a field may be present but undefined
//! - ParentRelation: the parent field a created entity is attached to
//! - MutationRequest: one create, update or delete call

use crate::graph::{Entity, NodeId, PropertyValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The three kinds of mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// A partial entity update.
///
/// A field mapped to `None` was supplied but left undefined and never
/// overwrites the cached value. `Some(PropertyValue::Null)` clears the field.
/// On the wire only defined fields exist: an absent key is undefined and
/// `null` is an explicit clear.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Entity", into = "Entity")]
pub struct EntityPatch(BTreeMap<String, Option<PropertyValue>>);

impl EntityPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field
    pub fn set(mut self, field: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.0.insert(field.into(), Some(value.into()));
        self
    }

    /// Explicitly clear a field
    pub fn clear(mut self, field: impl Into<String>) -> Self {
        self.0.insert(field.into(), Some(PropertyValue::Null));
        self
    }

    /// Include a field without a value
    pub fn undefined(mut self, field: impl Into<String>) -> Self {
        self.0.insert(field.into(), None);
        self
    }

    /// `None` if the field is absent, `Some(None)` if present but undefined
    pub fn get(&self, field: &str) -> Option<Option<&PropertyValue>> {
        self.0.get(field).map(Option::as_ref)
    }

    /// Fields that carry a value, in name order
    pub fn defined(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.0
            .iter()
            .filter_map(|(k, v)| v.as_ref().map(|v| (k.as_str(), v)))
    }

    pub fn contains_defined(&self, field: &str) -> bool {
        matches!(self.0.get(field), Some(Some(_)))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The defined fields as an entity
    pub fn to_entity(&self) -> Entity {
        self.defined()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }
}

impl From<Entity> for EntityPatch {
    fn from(entity: Entity) -> Self {
        Self(entity.into_iter().map(|(k, v)| (k, Some(v))).collect())
    }
}

impl From<EntityPatch> for Entity {
    fn from(patch: EntityPatch) -> Self {
        patch
            .0
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect()
    }
}

/// Attach a created entity to an existing parent's relationship field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentRelation {
    pub parent_id: NodeId,
    pub field_key: String,
}

impl ParentRelation {
    pub fn new(parent_id: impl Into<NodeId>, field_key: impl Into<String>) -> Self {
        Self {
            parent_id: parent_id.into(),
            field_key: field_key.into(),
        }
    }
}

/// One mutation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum MutationRequest {
    Create {
        #[serde(default)]
        data: EntityPatch,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent: Option<ParentRelation>,
    },
    Update {
        id: NodeId,
        #[serde(default)]
        patch: EntityPatch,
    },
    Delete {
        id: NodeId,
    },
}

impl MutationRequest {
    pub fn create(data: EntityPatch) -> Self {
        Self::Create { data, parent: None }
    }

    pub fn create_under(data: EntityPatch, parent: ParentRelation) -> Self {
        Self::Create {
            data,
            parent: Some(parent),
        }
    }

    pub fn update(id: impl Into<NodeId>, patch: EntityPatch) -> Self {
        Self::Update {
            id: id.into(),
            patch,
        }
    }

    pub fn delete(id: impl Into<NodeId>) -> Self {
        Self::Delete { id: id.into() }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Create { .. } => OperationKind::Create,
            Self::Update { .. } => OperationKind::Update,
            Self::Delete { .. } => OperationKind::Delete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_fields_are_not_defined() {
        let patch = EntityPatch::new()
            .set("name", "Safe")
            .undefined("ownerId")
            .clear("lockedItemId");

        assert_eq!(patch.len(), 3);
        assert_eq!(patch.get("ownerId"), Some(None));
        assert_eq!(patch.get("lockedItemId"), Some(Some(&PropertyValue::Null)));
        assert!(!patch.contains_defined("ownerId"));

        let entity = patch.to_entity();
        assert_eq!(entity.len(), 2);
        assert!(!entity.contains_key("ownerId"));
    }

    #[test]
    fn wire_null_is_an_explicit_clear() {
        let patch: EntityPatch = serde_json::from_value(serde_json::json!({
            "ownerId": null,
            "name": "Safe"
        }))
        .unwrap();
        assert_eq!(patch.get("ownerId"), Some(Some(&PropertyValue::Null)));
        assert_eq!(patch.get("description"), None);
    }

    #[test]
    fn request_parses_tagged_op() {
        let req: MutationRequest = serde_json::from_value(serde_json::json!({
            "op": "create",
            "data": { "name": "Letter" },
            "parent": { "parentId": "C1", "fieldKey": "ownedElementIds" }
        }))
        .unwrap();
        assert_eq!(req.kind(), OperationKind::Create);
        match req {
            MutationRequest::Create { parent: Some(parent), .. } => {
                assert_eq!(parent.parent_id.as_str(), "C1");
                assert_eq!(parent.field_key, "ownedElementIds");
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }
}
