//! Entity schema: the static relationship table
//!
//! Every entity type declares its relationship fields explicitly. Each field
//! is single- or many-valued, names the entity type it points at, and may
//! name the field on that type that mirrors it. Fields that carry an edge
//! classification draw edges in the graph; the rest are mirrors kept in sync
//! without edges, so each bidirectional pair draws exactly one edge.

mod table;

use crate::graph::PropertyValue;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

pub use table::relation_fields;

/// Fields that are never relationships, whatever their name looks like.
pub const NON_RELATION_FIELDS: &[&str] = &[
    "id",
    "name",
    "version",
    "lastEdited",
    "createdAt",
    "updatedAt",
];

/// The closed set of entity types held in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Character,
    Element,
    Puzzle,
    Timeline,
}

impl EntityType {
    pub const ALL: [EntityType; 4] = [
        EntityType::Character,
        EntityType::Element,
        EntityType::Puzzle,
        EntityType::Timeline,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::Element => "element",
            Self::Puzzle => "puzzle",
            Self::Timeline => "timeline",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| SchemaError::UnknownEntityType(s.to_string()))
    }
}

/// Classification of the edge a relationship field draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipType {
    Ownership,
    Container,
    Requirement,
    Reward,
    Association,
    Timeline,
    Participation,
    Dependency,
    Unlock,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ownership => "ownership",
            Self::Container => "container",
            Self::Requirement => "requirement",
            Self::Reward => "reward",
            Self::Association => "association",
            Self::Timeline => "timeline",
            Self::Participation => "participation",
            Self::Dependency => "dependency",
            Self::Unlock => "unlock",
        }
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Single-valued ("…Id") or many-valued ("…Ids") relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Single,
    Many,
}

/// One relationship field in the schema table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationField {
    pub name: &'static str,
    pub cardinality: Cardinality,
    pub target: EntityType,
    /// Field on `target` that mirrors this one, if any
    pub inverse: Option<&'static str>,
    /// Edge drawn for each referenced id; `None` for mirror-only fields
    pub edge: Option<RelationshipType>,
}

impl RelationField {
    pub fn emits_edges(&self) -> bool {
        self.edge.is_some()
    }

    pub fn is_many(&self) -> bool {
        self.cardinality == Cardinality::Many
    }
}

/// Errors raised when a payload does not fit the relationship table.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),

    #[error("{entity_type} has no relationship field '{field}'")]
    UnknownRelation { entity_type: EntityType, field: String },

    #[error("field '{field}' expects {expected}")]
    WrongCardinality { field: String, expected: &'static str },

    #[error("field '{field}' holds a non-string id")]
    NonStringId { field: String },

    #[error("field '{field}' on {entity_type} points at {actual}, expected {expected}")]
    TargetMismatch {
        entity_type: EntityType,
        field: String,
        expected: EntityType,
        actual: EntityType,
    },
}

/// Look up a relationship field by name.
pub fn relation_field(entity_type: EntityType, name: &str) -> Option<&'static RelationField> {
    if NON_RELATION_FIELDS.contains(&name) {
        return None;
    }
    relation_fields(entity_type).iter().find(|f| f.name == name)
}

pub fn is_relationship_field(entity_type: EntityType, name: &str) -> bool {
    relation_field(entity_type, name).is_some()
}

/// The field definition on the target type that mirrors `field`.
pub fn inverse_of(field: &RelationField) -> Option<&'static RelationField> {
    field
        .inverse
        .and_then(|name| relation_field(field.target, name))
}

/// Read the ids held by a relationship value, rejecting malformed payloads.
///
/// `None` and `Null` both read as "no reference".
pub fn read_ids(field: &RelationField, value: Option<&PropertyValue>) -> Result<Vec<String>, SchemaError> {
    let value = match value {
        None | Some(PropertyValue::Null) => return Ok(Vec::new()),
        Some(v) => v,
    };
    match (field.cardinality, value) {
        (Cardinality::Single, PropertyValue::String(id)) => Ok(vec![id.clone()]),
        (Cardinality::Single, _) => Err(SchemaError::WrongCardinality {
            field: field.name.to_string(),
            expected: "a single id or null",
        }),
        (Cardinality::Many, PropertyValue::Array(items)) => {
            let mut ids: Vec<String> = Vec::with_capacity(items.len());
            for item in items {
                let id = item.as_str().ok_or_else(|| SchemaError::NonStringId {
                    field: field.name.to_string(),
                })?;
                if !ids.iter().any(|existing| existing == id) {
                    ids.push(id.to_string());
                }
            }
            Ok(ids)
        }
        (Cardinality::Many, _) => Err(SchemaError::WrongCardinality {
            field: field.name.to_string(),
            expected: "an array of ids or null",
        }),
    }
}

/// Lenient variant for values already in the cache: malformed entries are skipped.
pub fn cached_ids(field: &RelationField, value: Option<&PropertyValue>) -> Vec<String> {
    match value {
        Some(PropertyValue::String(id)) => vec![id.clone()],
        Some(PropertyValue::Array(items)) => {
            let mut ids: Vec<String> = Vec::new();
            for id in items.iter().filter_map(PropertyValue::as_str) {
                if !ids.iter().any(|existing| existing == id) {
                    ids.push(id.to_string());
                }
            }
            if field.cardinality == Cardinality::Single {
                ids.truncate(1);
            }
            ids
        }
        _ => Vec::new(),
    }
}
