//! Scoped rollback of a failed mutation
//!
//! Granular rollback replays the change journal backwards. A field is only
//! restored while it still holds the value this mutation wrote, so a later
//! mutation's write to the same field survives. Edges are then recomputed
//! from the restored fields, keeping markers of mutations still in flight.
//!
//! Without a journal the touched nodes and edges are restored wholesale from
//! the pre-mutation snapshot.

use super::context::{ChangeJournal, FieldChange, MutationContext, TouchedIds};
use super::request::OperationKind;
use crate::graph::{Entity, Graph, NodeId, PropertyValue};
use crate::optimistic::{unmark, MutationId, PendingSet};
use std::collections::{BTreeSet, HashSet};

/// How a rollback was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackPath {
    Granular,
    Snapshot,
}

/// Undo `ctx`'s optimistic patch. `active` holds the mutations still in flight.
pub(crate) fn roll_back(graph: &mut Graph, ctx: &MutationContext, active: &HashSet<MutationId>) -> RollbackPath {
    let own = ctx.mutation_id;
    let path = match (&ctx.journal, ctx.kind) {
        (Some(journal), OperationKind::Create) => {
            graph.remove_node_cascade(&ctx.node_id);
            undo(graph, journal, &own, active);
            RollbackPath::Granular
        }
        (Some(journal), OperationKind::Delete) => {
            if let Some(removed) = &journal.removed_node {
                if graph.get_node(&removed.id).is_none() {
                    let mut node = removed.clone();
                    node.pending_mutation_ids = surviving([&removed.pending_mutation_ids], &own, active);
                    graph.add_node(node);
                }
            }
            undo(graph, journal, &own, active);
            RollbackPath::Granular
        }
        (Some(journal), OperationKind::Update) if graph.get_node(&ctx.node_id).is_some() => {
            undo(graph, journal, &own, active);
            RollbackPath::Granular
        }
        _ => {
            restore_from_snapshot(graph, &ctx.snapshot, &ctx.touched, &ctx.node_id, &own, active);
            RollbackPath::Snapshot
        }
    };
    unmark_touched(graph, &ctx.touched, &own);
    path
}

/// Replay a journal backwards.
pub(crate) fn undo(graph: &mut Graph, journal: &ChangeJournal, own: &MutationId, active: &HashSet<MutationId>) {
    for (node_id, changes) in &journal.fields {
        let Some(node) = graph.get_node_mut(node_id) else {
            continue;
        };
        for (field, change) in changes {
            let restored = match change {
                FieldChange::Replaced { prior, applied } => {
                    if node.entity.get(field) != applied.as_ref() {
                        tracing::debug!(node_id = %node_id, field = %field, "field rewritten since; keeping newer value");
                        continue;
                    }
                    prior.clone()
                }
                FieldChange::Membership { prior, added, removed } => {
                    undo_membership(node.entity.get(field), prior, added, removed)
                }
            };
            write_field(&mut node.entity, field, restored);
        }
        unmark(node, own);
    }

    for (edge_id, prior) in &journal.edges {
        let current = graph.get_edge(edge_id).cloned();
        let Some(template) = prior.as_ref().or(current.as_ref()) else {
            continue;
        };
        if graph.references(&template.source, &template.relation_field, &template.target) {
            let mut edge = template.clone();
            let sets = prior
                .iter()
                .chain(current.iter())
                .map(|e| &e.pending_mutation_ids);
            edge.pending_mutation_ids = surviving(sets, own, active);
            graph.edges.insert(edge_id.clone(), edge);
        } else {
            graph.remove_edge(edge_id);
        }
    }
}

/// Remove what this mutation added, then put back what it removed.
///
/// Yields exactly `prior` when no other writer changed the membership.
fn undo_membership(
    current: Option<&PropertyValue>,
    prior: &Option<PropertyValue>,
    added: &[String],
    removed: &[(String, usize)],
) -> Option<PropertyValue> {
    let mut ids = match current {
        Some(PropertyValue::Array(items)) => items.clone(),
        _ => Vec::new(),
    };
    for id in added {
        ids.retain(|v| v.as_str() != Some(id.as_str()));
    }
    for (id, index) in removed.iter().rev() {
        if !ids.iter().any(|v| v.as_str() == Some(id.as_str())) {
            let at = (*index).min(ids.len());
            ids.insert(at, PropertyValue::String(id.clone()));
        }
    }

    let prior_ids: &[PropertyValue] = match prior {
        Some(PropertyValue::Array(items)) => items.as_slice(),
        _ => &[],
    };
    if ids.as_slice() == prior_ids {
        prior.clone()
    } else {
        Some(PropertyValue::Array(ids))
    }
}

fn write_field(entity: &mut Entity, field: &str, value: Option<PropertyValue>) {
    match value {
        Some(value) => {
            entity.insert(field.to_string(), value);
        }
        None => {
            entity.remove(field);
        }
    }
}

fn restore_from_snapshot(
    graph: &mut Graph,
    snapshot: &Graph,
    touched: &TouchedIds,
    primary: &NodeId,
    own: &MutationId,
    active: &HashSet<MutationId>,
) {
    tracing::warn!(node_id = %primary, "no granular rollback state; restoring from snapshot");

    let mut nodes: BTreeSet<NodeId> = touched.nodes.clone();
    nodes.insert(primary.clone());
    let mut edges = touched.edges.clone();
    edges.extend(snapshot.edges_touching(primary));

    for id in &nodes {
        match snapshot.get_node(id) {
            Some(node) => {
                let mut node = node.clone();
                node.pending_mutation_ids = surviving([&node.pending_mutation_ids], own, active);
                graph.add_node(node);
            }
            None => {
                graph.remove_node(id);
            }
        }
    }
    for id in &edges {
        match snapshot.get_edge(id) {
            Some(edge) => {
                let mut edge = edge.clone();
                edge.pending_mutation_ids = surviving([&edge.pending_mutation_ids], own, active);
                graph.edges.insert(id.clone(), edge);
            }
            None => {
                graph.remove_edge(id);
            }
        }
    }
}

/// Clear `own` from every touched node and edge still in the graph.
pub(crate) fn unmark_touched(graph: &mut Graph, touched: &TouchedIds, own: &MutationId) -> usize {
    let mut cleared = 0;
    for id in &touched.nodes {
        if let Some(node) = graph.get_node_mut(id) {
            cleared += usize::from(unmark(node, own));
        }
    }
    for id in &touched.edges {
        if let Some(edge) = graph.get_edge_mut(id) {
            cleared += usize::from(unmark(edge, own));
        }
    }
    cleared
}

/// Markers worth keeping on a restored item: live mutations other than `own`.
fn surviving<'a>(
    sets: impl IntoIterator<Item = &'a PendingSet>,
    own: &MutationId,
    active: &HashSet<MutationId>,
) -> PendingSet {
    sets.into_iter()
        .flat_map(PendingSet::iter)
        .filter(|id| *id != own && active.contains(*id))
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, EdgeId, Node};
    use crate::optimistic::mark;
    use crate::schema::{EntityType, RelationshipType};

    #[test]
    fn membership_undo_restores_prior_exactly() {
        let prior = Some(PropertyValue::id_list(["E1", "E2", "E3"]));
        let current = PropertyValue::id_list(["E1", "E3", "E4"]);
        let restored = undo_membership(
            Some(&current),
            &prior,
            &["E4".to_string()],
            &[("E2".to_string(), 1)],
        );
        assert_eq!(restored, prior);
    }

    #[test]
    fn membership_undo_keeps_foreign_additions() {
        let prior = Some(PropertyValue::id_list(["E1"]));
        let current = PropertyValue::id_list(["E1", "E4", "E9"]);
        let restored = undo_membership(Some(&current), &prior, &["E4".to_string()], &[]);
        assert_eq!(restored, Some(PropertyValue::id_list(["E1", "E9"])));
    }

    #[test]
    fn absent_prior_field_is_removed_again() {
        let restored = undo_membership(Some(&PropertyValue::id_list(["P9"])), &None, &["P9".to_string()], &[]);
        assert_eq!(restored, None);
    }

    #[test]
    fn replaced_field_survives_later_writer() {
        let own = MutationId::new();
        let mut graph = Graph::new();
        graph.add_node(Node::new("P1", EntityType::Puzzle).with_field("name", "later"));
        let mut journal = ChangeJournal::new();
        journal.record_replace(&NodeId::from("P1"), "name", Some("before".into()), Some("mine".into()));

        undo(&mut graph, &journal, &own, &HashSet::new());
        assert_eq!(graph.get_node(&NodeId::from("P1")).unwrap().field("name"), Some(&PropertyValue::from("later")));
    }

    #[test]
    fn restored_edge_keeps_live_markers_only() {
        let own = MutationId::new();
        let live = MutationId::new();
        let settled = MutationId::new();

        let mut graph = Graph::new();
        graph.add_node(Node::new("P1", EntityType::Puzzle).with_field("ownerId", "C1"));
        let mut prior = Edge::new(NodeId::from("P1"), "ownerId", NodeId::from("C1"), RelationshipType::Ownership);
        mark(&mut prior, live);
        mark(&mut prior, settled);

        let mut journal = ChangeJournal::new();
        journal.record_edge(&prior.id, Some(prior.clone()));
        let active: HashSet<MutationId> = [live, own].into_iter().collect();

        undo(&mut graph, &journal, &own, &active);

        let edge = graph.get_edge(&EdgeId::from("P1::ownerId::C1")).unwrap();
        assert!(edge.pending_mutation_ids.contains(&live));
        assert!(!edge.pending_mutation_ids.contains(&settled));
        assert_eq!(edge.pending_count(), 1);
    }

    #[test]
    fn edge_without_reference_is_removed() {
        let own = MutationId::new();
        let mut graph = Graph::new();
        graph.add_node(Node::new("P1", EntityType::Puzzle));
        let edge = Edge::new(NodeId::from("P1"), "ownerId", NodeId::from("C2"), RelationshipType::Ownership);
        graph.add_edge(edge.clone());

        let mut journal = ChangeJournal::new();
        journal.record_edge(&edge.id, None);
        undo(&mut graph, &journal, &own, &HashSet::new());

        assert_eq!(graph.edge_count(), 0);
    }
}
