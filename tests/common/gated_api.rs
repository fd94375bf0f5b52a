//! Remote API mock whose calls block until the test answers them
//!
//! Every call is forwarded to a [`CallLog`] together with a oneshot
//! responder. The mutation stays in flight, with its optimistic patch in the
//! cache, until the test calls [`Call::succeed`] or [`Call::fail`].

use async_trait::async_trait;
use optigraph::{
    ApiError, ApiRegistry, ApiResponse, Entity, EntityApi, EntityPatch, EntityType, NodeId, OperationKind,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// One intercepted remote call.
pub struct Call {
    pub entity_type: EntityType,
    pub op: OperationKind,
    pub id: Option<NodeId>,
    /// Create body or the defined fields of an update patch
    pub body: Entity,
    respond: oneshot::Sender<Result<ApiResponse, ApiError>>,
}

impl Call {
    pub fn succeed(self, response: ApiResponse) {
        let _ = self.respond.send(Ok(response));
    }

    pub fn fail(self, error: ApiError) {
        let _ = self.respond.send(Err(error));
    }

    pub fn is_for(&self, id: &str) -> bool {
        self.id.as_ref().map_or(false, |own| own.as_str() == id)
    }
}

struct GatedApi {
    entity_type: EntityType,
    calls: mpsc::UnboundedSender<Call>,
}

impl GatedApi {
    async fn gate(&self, op: OperationKind, id: Option<NodeId>, body: Entity) -> Result<ApiResponse, ApiError> {
        let (respond, answer) = oneshot::channel();
        self.calls
            .send(Call {
                entity_type: self.entity_type,
                op,
                id,
                body,
                respond,
            })
            .map_err(|_| ApiError::Network("call log dropped".into()))?;
        answer
            .await
            .unwrap_or_else(|_| Err(ApiError::Network("call abandoned".into())))
    }
}

#[async_trait]
impl EntityApi for GatedApi {
    fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    async fn create(&self, data: &Entity) -> Result<ApiResponse, ApiError> {
        self.gate(OperationKind::Create, None, data.clone()).await
    }

    async fn update(&self, id: &NodeId, patch: &EntityPatch) -> Result<ApiResponse, ApiError> {
        self.gate(OperationKind::Update, Some(id.clone()), patch.to_entity()).await
    }

    async fn delete(&self, id: &NodeId) -> Result<ApiResponse, ApiError> {
        self.gate(OperationKind::Delete, Some(id.clone()), Entity::new()).await
    }
}

/// Receiving end of every gated API in a registry.
pub struct CallLog {
    rx: mpsc::UnboundedReceiver<Call>,
}

impl CallLog {
    /// Wait for the next remote call
    pub async fn next(&mut self) -> Call {
        tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("timed out waiting for a remote call")
            .expect("all APIs dropped")
    }

    /// Wait for `n` calls, in arrival order
    pub async fn take(&mut self, n: usize) -> Vec<Call> {
        let mut calls = Vec::with_capacity(n);
        for _ in 0..n {
            calls.push(self.next().await);
        }
        calls
    }

    pub fn is_idle(&mut self) -> bool {
        self.rx.try_recv().is_err()
    }
}

/// Remove and return the call for node `id`
pub fn pick(calls: &mut Vec<Call>, id: &str) -> Call {
    let index = calls
        .iter()
        .position(|c| c.is_for(id))
        .unwrap_or_else(|| panic!("no call for {}", id));
    calls.remove(index)
}

/// A registry with a gated API for every entity type, sharing one log.
pub fn gated_registry() -> (ApiRegistry, CallLog) {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut registry = ApiRegistry::new();
    for entity_type in EntityType::ALL {
        registry.register(Arc::new(GatedApi {
            entity_type,
            calls: tx.clone(),
        }));
    }
    (registry, CallLog { rx })
}
