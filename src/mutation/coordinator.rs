//! Mutation coordinator
//!
//! Runs one mutation through its lifecycle against a single cache key:
//!
//! 1. `begin`: validate locally, cancel stale reads, register the mutation,
//!    snapshot the cache and apply the optimistic patch in one write
//! 2. the remote call through the entity type's [`EntityApi`]
//! 3. `settle_success` or `settle_failure`: reconcile with the server's
//!    answer, or roll back exactly what this mutation touched
//!
//! [`MutationCoordinator::mutate`] drives all three. The phases are public
//! so hosts with their own transport can drive them separately.

use super::api::{ApiError, ApiRegistry, ApiResponse, GraphSource};
use super::context::{ChangeJournal, FieldChange, MutationContext, TouchedIds};
use super::delta::{apply_delta, DeltaSummary};
use super::error::MutationError;
use super::request::{EntityPatch, MutationRequest, OperationKind, ParentRelation};
use super::rollback::{roll_back, unmark_touched, RollbackPath};
use super::sync::{self, SyncScope};
use crate::config::EngineConfig;
use crate::graph::{CacheError, CacheEvent, CacheKey, Entity, Graph, GraphStore, Node, NodeId};
use crate::optimistic::{clear_stale, mark, unmark_everywhere, InFlightRegistry, MutationId};
use crate::schema::{inverse_of, relation_field, relation_fields, Cardinality, EntityType, SchemaError};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// How the cache was brought in line with a successful remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The server's delta was applied
    Delta(DeltaSummary),
    /// The returned entity was merged into the node
    Merged,
    /// A delete was confirmed; the optimistic removal stands
    Removed,
    /// Nothing came back; the optimistic state stands
    Unchanged,
}

/// Result of a settled mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome {
    pub mutation_id: MutationId,
    pub kind: OperationKind,
    /// Final id of the node; the server id for a create
    pub node_id: NodeId,
    pub reconciled: Reconciliation,
}

/// Coordinates optimistic mutations against one cache key.
pub struct MutationCoordinator {
    store: Arc<GraphStore>,
    apis: ApiRegistry,
    in_flight: Arc<InFlightRegistry>,
    config: EngineConfig,
    key: CacheKey,
}

impl MutationCoordinator {
    pub fn new(store: Arc<GraphStore>, apis: ApiRegistry) -> Self {
        Self::with_config(store, apis, EngineConfig::default())
    }

    pub fn with_config(store: Arc<GraphStore>, apis: ApiRegistry, config: EngineConfig) -> Self {
        Self {
            key: config.cache_key(),
            store,
            apis,
            in_flight: Arc::new(InFlightRegistry::new()),
            config,
        }
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    pub fn cache_key(&self) -> &CacheKey {
        &self.key
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn in_flight(&self) -> &Arc<InFlightRegistry> {
        &self.in_flight
    }

    /// Current cached graph (empty if nothing is cached yet)
    pub fn read(&self) -> Graph {
        self.store.get(&self.key).unwrap_or_default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.store.subscribe()
    }

    /// Run a mutation end to end.
    pub async fn mutate(
        &self,
        entity_type: EntityType,
        request: MutationRequest,
    ) -> Result<MutationOutcome, MutationError> {
        let api = self
            .apis
            .get(entity_type)
            .ok_or(MutationError::NoApi(entity_type))?;
        let ctx = self.begin(entity_type, &request)?;

        let result = match &request {
            MutationRequest::Create { .. } => {
                let body = ctx.request_body.clone().unwrap_or_default();
                api.create(&body).await
            }
            MutationRequest::Update { id, patch } => api.update(id, patch).await,
            MutationRequest::Delete { id } => api.delete(id).await,
        };

        match result {
            Ok(response) => self.settle_success(ctx, response),
            Err(error) => Err(self.settle_failure(ctx, error)),
        }
    }

    /// Validate and apply a mutation optimistically.
    ///
    /// A rejected request leaves the cache, the read tokens and the in-flight
    /// registry untouched.
    pub fn begin(&self, entity_type: EntityType, request: &MutationRequest) -> Result<MutationContext, MutationError> {
        self.validate(&self.read(), entity_type, request)?;
        self.store.cancel_reads(&self.key);

        let mutation_id = MutationId::new();
        let guard = self.in_flight.register(mutation_id, self.key.clone(), request.kind());
        let node_id = match request {
            MutationRequest::Create { .. } => {
                NodeId::from(format!("{}{}", self.config.temp_id_prefix, Uuid::new_v4()))
            }
            MutationRequest::Update { id, .. } | MutationRequest::Delete { id } => id.clone(),
        };

        let mut ctx = MutationContext::new(
            guard,
            self.key.clone(),
            entity_type,
            request.kind(),
            node_id,
            Graph::new(),
        );
        if request.kind() == OperationKind::Create {
            ctx.temp_id = Some(ctx.node_id.clone());
        }

        self.store.transform(&self.key, |graph| -> Result<(), MutationError> {
            ctx.snapshot = graph.clone();
            let mut touched = TouchedIds::default();
            let mut journal = ChangeJournal::new();
            let mut scope = SyncScope {
                mutation_id,
                touched: &mut touched,
                journal: &mut journal,
            };
            match request {
                MutationRequest::Create { data, parent } => {
                    apply_create(graph, &mut scope, entity_type, &ctx.node_id, data, parent.as_ref())?;
                    ctx.request_body = graph.get_node(&ctx.node_id).map(|n| n.entity.clone());
                }
                MutationRequest::Update { id, patch } => apply_update(graph, &mut scope, entity_type, id, patch)?,
                MutationRequest::Delete { id } => apply_delete(graph, &mut scope, id)?,
            }
            ctx.touched = touched;
            ctx.journal = Some(journal);
            Ok(())
        })?;

        tracing::debug!(
            mutation_id = %mutation_id,
            key = %self.key,
            node_id = %ctx.node_id,
            kind = %ctx.kind,
            nodes = ctx.touched.nodes.len(),
            edges = ctx.touched.edges.len(),
            "applied optimistic patch"
        );
        Ok(ctx)
    }

    /// Reconcile the cache with a successful remote call.
    ///
    /// Swaps a created node's temp id for the server id, applies the delta
    /// (or merges the returned entity) and clears this mutation's markers.
    /// Markers of other mutations are never cleared.
    pub fn settle_success(&self, ctx: MutationContext, response: ApiResponse) -> Result<MutationOutcome, MutationError> {
        let MutationContext {
            mutation_id,
            key,
            entity_type,
            kind,
            mut node_id,
            temp_id,
            mut touched,
            journal,
            guard,
            ..
        } = ctx;
        let journal = journal.unwrap_or_default();

        let reconciled = self.store.transform(&key, |graph| -> Result<Reconciliation, MutationError> {
            if let Some(temp) = &temp_id {
                if let Some(real) = server_id(&response, entity_type) {
                    if real != *temp {
                        let renamed = graph.rename_node(temp, &real);
                        touched.rename(temp, &real, &renamed);
                        node_id = real;
                    }
                }
            }

            let reconciled = if let Some(delta) = &response.delta {
                Reconciliation::Delta(apply_delta(graph, delta, &mutation_id))
            } else if kind == OperationKind::Delete {
                Reconciliation::Removed
            } else if let Some(entity) = &response.entity {
                let current = graph.get_node(&node_id).map(|n| n.entity.clone()).unwrap_or_default();
                let fields = confirmed_fields(kind, &node_id, temp_id.as_ref(), &entity.fields, &current, &journal);
                let mut scratch = ChangeJournal::new();
                let mut scope = SyncScope {
                    mutation_id,
                    touched: &mut touched,
                    journal: &mut scratch,
                };
                merge_entity(graph, &mut scope, entity_type, &node_id, fields);
                Reconciliation::Merged
            } else {
                Reconciliation::Unchanged
            };

            unmark_touched(graph, &touched, &mutation_id);
            Ok(reconciled)
        })?;
        drop(guard);

        tracing::info!(
            mutation_id = %mutation_id,
            key = %key,
            node_id = %node_id,
            kind = %kind,
            "mutation settled"
        );
        Ok(MutationOutcome {
            mutation_id,
            kind,
            node_id,
            reconciled,
        })
    }

    /// Settle a failed remote call and return the error to surface.
    ///
    /// A version conflict clears this mutation's markers, leaves the patch
    /// in place and asks subscribers to refresh. Every other failure rolls
    /// back the patch.
    pub fn settle_failure(&self, ctx: MutationContext, error: ApiError) -> MutationError {
        if let ApiError::Conflict(message) = &error {
            self.store
                .update(&ctx.key, |graph| unmark_touched(graph, &ctx.touched, &ctx.mutation_id));
            self.store.notify(CacheEvent::RefreshRequired {
                key: ctx.key.clone(),
                mutation_id: ctx.mutation_id,
            });
            tracing::warn!(
                mutation_id = %ctx.mutation_id,
                node_id = %ctx.node_id,
                "version conflict; cache needs a refresh"
            );
            return MutationError::VersionConflict {
                node_id: ctx.node_id.clone(),
                message: message.clone(),
            };
        }

        let in_flight = &self.in_flight;
        let path = self.store.update(&ctx.key, |graph| {
            let active = in_flight.active_ids();
            roll_back(graph, &ctx, &active)
        });
        tracing::warn!(
            mutation_id = %ctx.mutation_id,
            node_id = %ctx.node_id,
            kind = %ctx.kind,
            granular = path == RollbackPath::Granular,
            error = %error,
            "remote call failed; rolled back"
        );

        MutationError::Remote {
            kind: ctx.kind,
            node_id: ctx.node_id.clone(),
            source: error,
        }
    }

    /// Clear markers left behind by a mutation whose context was lost.
    ///
    /// With an id, that mutation's markers are cleared everywhere unless it
    /// is still in flight. Without one, every marker of a mutation no longer
    /// in flight is cleared. Returns how many markers were removed.
    pub fn recover_missing_context(&self, mutation_id: Option<MutationId>) -> usize {
        let cleared = match mutation_id {
            Some(id) if self.in_flight.is_active(&id) => {
                tracing::debug!(mutation_id = %id, "mutation still in flight; nothing to recover");
                return 0;
            }
            Some(id) => self.store.update(&self.key, |graph| unmark_everywhere(graph, &id)),
            None => {
                let in_flight = &self.in_flight;
                self.store
                    .update(&self.key, |graph| clear_stale(graph, &in_flight.active_ids()))
            }
        };
        if cleared > 0 {
            tracing::warn!(key = %self.key, cleared, "cleared markers of lost mutations");
        }
        cleared
    }

    /// Refetch the whole graph from `source`.
    ///
    /// The fetch is abandoned as soon as a mutation begins against the key,
    /// and its result is discarded if a mutation is still in flight. Returns
    /// true if the fetched graph was installed.
    pub async fn refresh(&self, source: &dyn GraphSource) -> Result<bool, MutationError> {
        let ticket = self.store.begin_read(&self.key);
        let fetched = tokio::select! {
            fetched = source.fetch(&self.key) => fetched,
            _ = ticket.cancelled() => {
                tracing::debug!(key = %self.key, "mutation started; abandoning refresh");
                self.store.notify(CacheEvent::ReadDiscarded { key: self.key.clone() });
                return Ok(false);
            }
        };
        let graph = fetched.map_err(|source| MutationError::Refresh {
            key: self.key.clone(),
            source,
        })?;

        if self.in_flight.active_for(&self.key) > 0 {
            tracing::debug!(key = %self.key, "mutations in flight; discarding refresh");
            self.store.notify(CacheEvent::ReadDiscarded { key: self.key.clone() });
            return Ok(false);
        }
        Ok(self.store.finish_read(ticket, graph))
    }

    fn validate(&self, graph: &Graph, entity_type: EntityType, request: &MutationRequest) -> Result<(), MutationError> {
        match request {
            MutationRequest::Create { data, parent } => {
                sync::validate(graph, entity_type, data)?;
                if let Some(parent) = parent {
                    validate_parent(graph, entity_type, data, parent)?;
                }
            }
            MutationRequest::Update { id, patch } => {
                require_node(graph, entity_type, id)?;
                if patch.get("id").flatten().map_or(false, |v| v.as_str() != Some(id.as_str())) {
                    return Err(MutationError::validation(format!("cannot change the id of {}", id)));
                }
                sync::validate(graph, entity_type, patch)?;
            }
            MutationRequest::Delete { id } => require_node(graph, entity_type, id)?,
        }
        Ok(())
    }
}

fn require_node(graph: &Graph, entity_type: EntityType, id: &NodeId) -> Result<(), MutationError> {
    let node = graph
        .get_node(id)
        .ok_or_else(|| MutationError::validation(format!("{} is not cached", id)))?;
    if node.entity_type != entity_type {
        return Err(MutationError::validation(format!(
            "{} is a {}, not a {}",
            id, node.entity_type, entity_type
        )));
    }
    Ok(())
}

fn validate_parent(
    graph: &Graph,
    entity_type: EntityType,
    data: &EntityPatch,
    parent: &ParentRelation,
) -> Result<(), MutationError> {
    let parent_node = graph
        .get_node(&parent.parent_id)
        .ok_or_else(|| MutationError::validation(format!("parent {} is not cached", parent.parent_id)))?;
    let field = relation_field(parent_node.entity_type, &parent.field_key).ok_or_else(|| {
        SchemaError::UnknownRelation {
            entity_type: parent_node.entity_type,
            field: parent.field_key.clone(),
        }
    })?;
    if field.target != entity_type {
        return Err(SchemaError::TargetMismatch {
            entity_type: parent_node.entity_type,
            field: field.name.to_string(),
            expected: field.target,
            actual: entity_type,
        }
        .into());
    }

    if let Some(inverse) = inverse_of(field) {
        if inverse.cardinality == Cardinality::Single {
            if let Some(Some(value)) = data.get(inverse.name) {
                if !value.is_null() && value.as_str() != Some(parent.parent_id.as_str()) {
                    return Err(MutationError::validation(format!(
                        "{} conflicts with parent {}",
                        inverse.name, parent.parent_id
                    )));
                }
            }
        }
    }
    Ok(())
}

fn apply_create(
    graph: &mut Graph,
    scope: &mut SyncScope<'_>,
    entity_type: EntityType,
    node_id: &NodeId,
    data: &EntityPatch,
    parent: Option<&ParentRelation>,
) -> Result<(), MutationError> {
    let plan = sync::plan(entity_type, node_id, &Entity::new(), data)?;

    let mut node = Node::new(node_id.clone(), entity_type);
    for (field, value) in data.defined().filter(|(field, _)| *field != "id") {
        node.entity.insert(field.to_string(), value.clone());
    }
    mark(&mut node, scope.mutation_id);
    graph.add_node(node);
    scope.touched.touch_node(node_id);

    sync::apply(graph, plan, scope);

    if let Some(parent) = parent {
        let parent_type = graph
            .get_node(&parent.parent_id)
            .map(|n| n.entity_type)
            .ok_or_else(|| CacheError::NodeNotFound(parent.parent_id.to_string()))?;
        let field = relation_field(parent_type, &parent.field_key).ok_or_else(|| SchemaError::UnknownRelation {
            entity_type: parent_type,
            field: parent.field_key.clone(),
        })?;
        sync::link(graph, scope, &parent.parent_id, field, node_id);
    }
    Ok(())
}

fn apply_update(
    graph: &mut Graph,
    scope: &mut SyncScope<'_>,
    entity_type: EntityType,
    id: &NodeId,
    patch: &EntityPatch,
) -> Result<(), MutationError> {
    let old = graph
        .get_node(id)
        .map(|n| n.entity.clone())
        .ok_or_else(|| CacheError::NodeNotFound(id.to_string()))?;
    let plan = sync::plan(entity_type, id, &old, patch)?;

    let node = graph
        .get_node_mut(id)
        .ok_or_else(|| CacheError::NodeNotFound(id.to_string()))?;
    for (field, value) in patch.defined().filter(|(field, _)| *field != "id") {
        let prior = node.entity.get(field).cloned();
        if prior.as_ref() != Some(value) {
            node.entity.insert(field.to_string(), value.clone());
            scope.journal.record_replace(id, field, prior, Some(value.clone()));
        }
    }
    mark(node, scope.mutation_id);
    scope.touched.touch_node(id);

    sync::apply(graph, plan, scope);
    Ok(())
}

fn apply_delete(graph: &mut Graph, scope: &mut SyncScope<'_>, id: &NodeId) -> Result<(), MutationError> {
    let removed = graph
        .get_node(id)
        .cloned()
        .ok_or_else(|| CacheError::NodeNotFound(id.to_string()))?;
    scope.journal.removed_node = Some(removed);
    scope.touched.touch_node(id);

    for edge_id in graph.edges_touching(id) {
        sync::remove_edge(graph, scope, &edge_id);
    }
    graph.remove_node(id);

    let referencing: Vec<_> = graph
        .nodes()
        .flat_map(|node| {
            relation_fields(node.entity_type)
                .iter()
                .filter(|field| node.field(field.name).map_or(false, |v| v.references(id.as_str())))
                .map(|field| (node.id.clone(), field))
                .collect::<Vec<_>>()
        })
        .collect();
    for (node_id, field) in referencing {
        sync::detach(graph, scope, &node_id, field, id);
    }
    Ok(())
}

/// The server's id for a created entity.
fn server_id(response: &ApiResponse, entity_type: EntityType) -> Option<NodeId> {
    response.entity.as_ref().map(|e| e.id.clone()).or_else(|| {
        response.delta.as_ref().and_then(|delta| {
            delta
                .nodes
                .created
                .iter()
                .find(|n| n.entity_type == entity_type)
                .map(|n| n.id.clone())
        })
    })
}

/// Server fields this mutation may write back.
///
/// A create takes everything the server returned. An update takes only the
/// fields it wrote itself, and only while `current` still holds its value;
/// a field a later mutation has since overwritten keeps the newer value.
fn confirmed_fields(
    kind: OperationKind,
    node_id: &NodeId,
    temp_id: Option<&NodeId>,
    returned: &Entity,
    current: &Entity,
    journal: &ChangeJournal,
) -> Entity {
    if kind == OperationKind::Create {
        return returned.clone();
    }
    let journal_key = temp_id.unwrap_or(node_id);
    let Some(changes) = journal.fields.get(journal_key) else {
        return Entity::new();
    };
    returned
        .iter()
        .filter(|(field, _)| match changes.get(field.as_str()) {
            Some(FieldChange::Replaced { applied, .. }) => current.get(field.as_str()) == applied.as_ref(),
            _ => false,
        })
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect()
}

/// Write server fields into a node, moving edges and inverses to match.
fn merge_entity(graph: &mut Graph, scope: &mut SyncScope<'_>, entity_type: EntityType, node_id: &NodeId, fields: Entity) {
    let Some(node) = graph.get_node(node_id) else {
        return;
    };
    let old = node.entity.clone();

    let mut patch = EntityPatch::new();
    for (field, value) in fields {
        if field != "id" && old.get(&field) != Some(&value) {
            patch = patch.set(field, value);
        }
    }
    if patch.is_empty() {
        return;
    }

    let plan = match sync::plan(entity_type, node_id, &old, &patch) {
        Ok(plan) => plan,
        Err(e) => {
            tracing::warn!(node_id = %node_id, error = %e, "server returned malformed relationships; skipping merge");
            return;
        }
    };
    if let Some(node) = graph.get_node_mut(node_id) {
        node.entity.extend(patch.to_entity());
    }
    sync::apply(graph, plan, scope);
}
