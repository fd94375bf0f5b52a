//! Relationship synchronizer
//!
//! Diffs old and new relationship-field values and derives:
//! - edge removals and additions on the entity being edited
//! - the paired attach/detach on each referenced entity's inverse field
//!
//! Planning is pure. Applying a plan writes into the graph under a
//! [`SyncScope`], which marks everything written as pending for the
//! mutation, adds it to the touched set and journals its before-state.

use super::context::{ChangeJournal, TouchedIds};
use super::request::EntityPatch;
use crate::graph::{Edge, EdgeId, Entity, Graph, Node, NodeId, PropertyValue};
use crate::optimistic::{mark, MutationId};
use crate::schema::{
    cached_ids, inverse_of, read_ids, relation_field, relation_fields, Cardinality, EntityType,
    RelationField, SchemaError,
};

/// Attach or detach one id on a relationship field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOp {
    Attach(NodeId),
    Detach(NodeId),
}

/// A write to the inverse field of a referenced entity.
#[derive(Debug, Clone, PartialEq)]
pub struct InverseUpdate {
    pub target: NodeId,
    pub field: &'static RelationField,
    pub op: LinkOp,
}

/// Edge and inverse-field changes implied by one payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncPlan {
    pub edge_removals: Vec<EdgeId>,
    pub edge_additions: Vec<Edge>,
    pub inverse_updates: Vec<InverseUpdate>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.edge_removals.is_empty() && self.edge_additions.is_empty() && self.inverse_updates.is_empty()
    }
}

/// The mutation a sync writes on behalf of.
pub struct SyncScope<'a> {
    pub mutation_id: MutationId,
    pub touched: &'a mut TouchedIds,
    pub journal: &'a mut ChangeJournal,
}

/// Diff `old` against the defined relationship fields of `patch`.
///
/// Undefined payload fields and non-relationship fields are ignored.
pub fn plan(
    entity_type: EntityType,
    source: &NodeId,
    old: &Entity,
    patch: &EntityPatch,
) -> Result<SyncPlan, SchemaError> {
    let mut plan = SyncPlan::default();

    for (name, value) in patch.defined() {
        let Some(field) = relation_field(entity_type, name) else {
            continue;
        };
        let before = cached_ids(field, old.get(name));
        let after = read_ids(field, Some(value))?;
        let inverse = inverse_of(field);

        for id in before.iter().filter(|id| !after.contains(id)) {
            let target = NodeId::from(id.as_str());
            if field.emits_edges() {
                plan.edge_removals.push(EdgeId::compose(source, field.name, &target));
            }
            if let Some(inverse) = inverse {
                plan.inverse_updates.push(InverseUpdate {
                    target,
                    field: inverse,
                    op: LinkOp::Detach(source.clone()),
                });
            }
        }

        for id in after.iter().filter(|id| !before.contains(id)) {
            let target = NodeId::from(id.as_str());
            if let Some(relationship) = field.edge {
                plan.edge_additions.push(Edge::new(
                    source.clone(),
                    field.name,
                    target.clone(),
                    relationship,
                ));
            }
            if let Some(inverse) = inverse {
                plan.inverse_updates.push(InverseUpdate {
                    target,
                    field: inverse,
                    op: LinkOp::Attach(source.clone()),
                });
            }
        }
    }

    Ok(plan)
}

/// Apply a plan to the graph.
pub fn apply(graph: &mut Graph, plan: SyncPlan, scope: &mut SyncScope<'_>) {
    for id in &plan.edge_removals {
        remove_edge(graph, scope, id);
    }
    for edge in plan.edge_additions {
        add_edge(graph, scope, edge);
    }
    for update in plan.inverse_updates {
        match &update.op {
            LinkOp::Attach(value) => attach(graph, scope, &update.target, update.field, value),
            LinkOp::Detach(value) => detach(graph, scope, &update.target, update.field, value),
        }
    }
}

/// Link `value` into `node`'s `field` and mirror it on the inverse side.
pub fn link(graph: &mut Graph, scope: &mut SyncScope<'_>, node: &NodeId, field: &RelationField, value: &NodeId) {
    attach(graph, scope, node, field, value);
    if let Some(inverse) = inverse_of(field) {
        attach(graph, scope, value, inverse, node);
    }
}

/// Put `value` into one node's relationship field.
///
/// A many field gains `value` once; a single field is overwritten, and the
/// value it displaced loses both its edge and its mirror entry pointing back
/// at `node_id`. Nodes absent from the cache are skipped.
pub fn attach(graph: &mut Graph, scope: &mut SyncScope<'_>, node_id: &NodeId, field: &RelationField, value: &NodeId) {
    let Some(node) = graph.get_node_mut(node_id) else {
        return;
    };
    if !owns_field(node, field) {
        tracing::debug!(node_id = %node_id, field = field.name, "skipping link on foreign entity type");
        return;
    }

    let prior = node.entity.get(field.name).cloned();
    let mut displaced: Option<NodeId> = None;
    let changed = match field.cardinality {
        Cardinality::Many => {
            let mut ids = match &prior {
                Some(PropertyValue::Array(items)) => items.clone(),
                _ => Vec::new(),
            };
            if ids.iter().any(|v| v.as_str() == Some(value.as_str())) {
                false
            } else {
                ids.push(PropertyValue::String(value.to_string()));
                let after = PropertyValue::Array(ids);
                node.entity.insert(field.name.to_string(), after.clone());
                scope.journal.record_added(node_id, field.name, prior, &after, value.as_str());
                true
            }
        }
        Cardinality::Single => {
            let new = PropertyValue::String(value.to_string());
            if prior.as_ref() == Some(&new) {
                false
            } else {
                displaced = prior.as_ref().and_then(PropertyValue::as_str).map(NodeId::from);
                node.entity.insert(field.name.to_string(), new.clone());
                scope.journal.record_replace(node_id, field.name, prior, Some(new));
                true
            }
        }
    };
    if !changed {
        return;
    }
    mark(node, scope.mutation_id);
    scope.touched.touch_node(node_id);

    if let Some(old) = &displaced {
        if let Some(mirror) = inverse_of(field) {
            detach(graph, scope, old, mirror, node_id);
        }
    }
    if let Some(relationship) = field.edge {
        if let Some(old) = displaced {
            remove_edge(graph, scope, &EdgeId::compose(node_id, field.name, &old));
        }
        add_edge(
            graph,
            scope,
            Edge::new(node_id.clone(), field.name, value.clone(), relationship),
        );
    }
}

/// Take `value` out of one node's relationship field.
///
/// A single field is cleared only if it still holds `value`.
pub fn detach(graph: &mut Graph, scope: &mut SyncScope<'_>, node_id: &NodeId, field: &RelationField, value: &NodeId) {
    let Some(node) = graph.get_node_mut(node_id) else {
        return;
    };
    if !owns_field(node, field) {
        return;
    }

    let prior = node.entity.get(field.name).cloned();
    let changed = match (field.cardinality, &prior) {
        (Cardinality::Many, Some(PropertyValue::Array(items))) => {
            match items.iter().position(|v| v.as_str() == Some(value.as_str())) {
                Some(index) => {
                    let mut ids = items.clone();
                    ids.remove(index);
                    let after = PropertyValue::Array(ids);
                    node.entity.insert(field.name.to_string(), after.clone());
                    scope
                        .journal
                        .record_removed(node_id, field.name, prior.clone(), &after, value.as_str(), index);
                    true
                }
                None => false,
            }
        }
        (Cardinality::Single, Some(PropertyValue::String(current))) if current == value.as_str() => {
            node.entity.insert(field.name.to_string(), PropertyValue::Null);
            scope
                .journal
                .record_replace(node_id, field.name, prior.clone(), Some(PropertyValue::Null));
            true
        }
        _ => false,
    };
    if !changed {
        return;
    }
    mark(node, scope.mutation_id);
    scope.touched.touch_node(node_id);

    if field.emits_edges() {
        remove_edge(graph, scope, &EdgeId::compose(node_id, field.name, value));
    }
}

/// Add an edge on behalf of the scope's mutation.
pub fn add_edge(graph: &mut Graph, scope: &mut SyncScope<'_>, mut edge: Edge) {
    let prior = graph.get_edge(&edge.id).cloned();
    scope.journal.record_edge(&edge.id, prior);
    scope.touched.touch_edge(&edge.id);
    mark(&mut edge, scope.mutation_id);
    graph.add_edge(edge);
}

/// Remove an edge on behalf of the scope's mutation; absent edges are ignored.
pub fn remove_edge(graph: &mut Graph, scope: &mut SyncScope<'_>, id: &EdgeId) {
    if let Some(prior) = graph.remove_edge(id) {
        scope.journal.record_edge(id, Some(prior));
        scope.touched.touch_edge(id);
    }
}

fn owns_field(node: &Node, field: &RelationField) -> bool {
    relation_field(node.entity_type, field.name).map_or(false, |own| own == field)
}

/// Check a payload's relationship values before anything is applied.
///
/// Rejects malformed values and references to cached nodes of the wrong type.
pub fn validate(graph: &Graph, entity_type: EntityType, patch: &EntityPatch) -> Result<(), SchemaError> {
    for (name, value) in patch.defined() {
        let Some(field) = relation_field(entity_type, name) else {
            continue;
        };
        for id in read_ids(field, Some(value))? {
            if let Some(target) = graph.get_node(&NodeId::from(id)) {
                if target.entity_type != field.target {
                    return Err(SchemaError::TargetMismatch {
                        entity_type,
                        field: field.name.to_string(),
                        expected: field.target,
                        actual: target.entity_type,
                    });
                }
            }
        }
    }
    Ok(())
}

/// Edges a node's own relationship fields draw.
pub fn derive_edges(node: &Node) -> Vec<Edge> {
    let mut edges = Vec::new();
    for field in relation_fields(node.entity_type) {
        let Some(relationship) = field.edge else {
            continue;
        };
        for id in cached_ids(field, node.entity.get(field.name)) {
            edges.push(Edge::new(node.id.clone(), field.name, NodeId::from(id), relationship));
        }
    }
    edges
}

/// Build a graph from entity records, deriving every edge from their fields.
pub fn build_graph(nodes: impl IntoIterator<Item = Node>) -> Graph {
    let mut graph = Graph::new();
    for node in nodes {
        for edge in derive_edges(&node) {
            graph.add_edge(edge);
        }
        graph.add_node(node);
    }
    graph
}
