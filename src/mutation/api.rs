//! Remote collaborators: the per-entity-type API and the graph source
//!
//! The transport behind these traits is out of scope; the coordinator only
//! needs their results and the tagged failure they report.

use super::delta::GraphDelta;
use super::request::EntityPatch;
use crate::graph::{CacheKey, Entity, Graph, NodeId};
use crate::schema::EntityType;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Tagged failure reported by a remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "lowercase")]
pub enum ApiError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// Remote state changed concurrently (optimistic concurrency check failed)
    #[error("version conflict: {0}")]
    Conflict(String),
    #[error("server error: {0}")]
    Server(String),
    #[error("validation failed: {0}")]
    Validation(String),
}

impl ApiError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// An entity record as returned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEntity {
    pub id: NodeId,
    #[serde(flatten)]
    pub fields: Entity,
}

impl ApiEntity {
    pub fn new(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            fields: Entity::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<crate::graph::PropertyValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// What a successful remote call returned: the entity, a delta, both or neither.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<ApiEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<GraphDelta>,
}

impl ApiResponse {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn entity(entity: ApiEntity) -> Self {
        Self {
            entity: Some(entity),
            delta: None,
        }
    }

    pub fn delta(delta: GraphDelta) -> Self {
        Self {
            entity: None,
            delta: Some(delta),
        }
    }

    pub fn with_delta(mut self, delta: GraphDelta) -> Self {
        self.delta = Some(delta);
        self
    }
}

/// The remote API for one entity type.
#[async_trait]
pub trait EntityApi: Send + Sync {
    fn entity_type(&self) -> EntityType;

    async fn create(&self, data: &Entity) -> Result<ApiResponse, ApiError>;

    async fn update(&self, id: &NodeId, patch: &EntityPatch) -> Result<ApiResponse, ApiError>;

    async fn delete(&self, id: &NodeId) -> Result<ApiResponse, ApiError>;
}

/// Source of full graph snapshots for background refreshes.
#[async_trait]
pub trait GraphSource: Send + Sync {
    async fn fetch(&self, key: &CacheKey) -> Result<Graph, ApiError>;
}

/// One registered API per entity type.
#[derive(Clone, Default)]
pub struct ApiRegistry {
    apis: HashMap<EntityType, Arc<dyn EntityApi>>,
}

impl ApiRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an API under its own entity type, replacing any previous one.
    pub fn register(&mut self, api: Arc<dyn EntityApi>) {
        self.apis.insert(api.entity_type(), api);
    }

    pub fn with(mut self, api: Arc<dyn EntityApi>) -> Self {
        self.register(api);
        self
    }

    pub fn get(&self, entity_type: EntityType) -> Option<Arc<dyn EntityApi>> {
        self.apis.get(&entity_type).cloned()
    }

    pub fn len(&self) -> usize {
        self.apis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apis.is_empty()
    }
}

impl std::fmt::Debug for ApiRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.apis.keys().collect();
        types.sort();
        f.debug_struct("ApiRegistry").field("entity_types", &types).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_wire_shape() {
        let err: ApiError = serde_json::from_value(serde_json::json!({
            "kind": "conflict",
            "message": "version 4 is stale"
        }))
        .unwrap();
        assert!(err.is_conflict());
        assert!(!err.is_retryable());
        assert!(ApiError::Network("timeout".into()).is_retryable());
    }

    #[test]
    fn api_entity_flattens_fields() {
        let entity: ApiEntity = serde_json::from_value(serde_json::json!({
            "id": "E9",
            "name": "Letter",
            "ownerId": "C1"
        }))
        .unwrap();
        assert_eq!(entity.id.as_str(), "E9");
        assert_eq!(entity.fields.len(), 2);
        assert!(!entity.fields.contains_key("id"));
    }

    struct NullApi(EntityType);

    #[async_trait]
    impl EntityApi for NullApi {
        fn entity_type(&self) -> EntityType {
            self.0
        }
        async fn create(&self, _data: &Entity) -> Result<ApiResponse, ApiError> {
            Ok(ApiResponse::empty())
        }
        async fn update(&self, _id: &NodeId, _patch: &EntityPatch) -> Result<ApiResponse, ApiError> {
            Ok(ApiResponse::empty())
        }
        async fn delete(&self, _id: &NodeId) -> Result<ApiResponse, ApiError> {
            Ok(ApiResponse::empty())
        }
    }

    #[test]
    fn registry_keys_by_entity_type() {
        let registry = ApiRegistry::new()
            .with(Arc::new(NullApi(EntityType::Puzzle)))
            .with(Arc::new(NullApi(EntityType::Puzzle)))
            .with(Arc::new(NullApi(EntityType::Element)));
        assert_eq!(registry.len(), 2);
        assert!(registry.get(EntityType::Puzzle).is_some());
        assert!(registry.get(EntityType::Timeline).is_none());
    }
}
