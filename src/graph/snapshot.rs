//! Graph: the `{nodes, edges}` snapshot held under one cache key

use super::edge::{Edge, EdgeId};
use super::node::{Node, NodeId, PropertyValue};
use crate::schema::relation_fields;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The cached graph of entities and the edges their relationship fields draw
///
/// Serializes as `{ "nodes": [Node], "edges": [Edge] }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default, with = "keyed::nodes")]
    pub nodes: BTreeMap<NodeId, Node>,
    #[serde(default, with = "keyed::edges")]
    pub edges: BTreeMap<EdgeId, Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a node
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id.clone();
        self.nodes.insert(id.clone(), node);
        id
    }

    /// Add an edge
    ///
    /// An edge with the same composite id is the same relationship-field
    /// instance: its pending markers are merged into the existing edge instead
    /// of producing a duplicate. Returns true if the edge was new.
    pub fn add_edge(&mut self, edge: Edge) -> bool {
        match self.edges.get_mut(&edge.id) {
            Some(existing) => {
                for id in edge.pending_mutation_ids.iter() {
                    existing.pending_mutation_ids.insert(*id);
                }
                existing.relationship_type = edge.relationship_type;
                false
            }
            None => {
                self.edges.insert(edge.id.clone(), edge);
                true
            }
        }
    }

    pub fn get_node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn get_node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn get_edge(&self, id: &EdgeId) -> Option<&Edge> {
        self.edges.get(id)
    }

    pub fn get_edge_mut(&mut self, id: &EdgeId) -> Option<&mut Edge> {
        self.edges.get_mut(id)
    }

    /// Remove a node without touching its edges
    pub fn remove_node(&mut self, id: &NodeId) -> Option<Node> {
        self.nodes.remove(id)
    }

    pub fn remove_edge(&mut self, id: &EdgeId) -> Option<Edge> {
        self.edges.remove(id)
    }

    /// Remove a node and every edge touching it
    pub fn remove_node_cascade(&mut self, id: &NodeId) -> Option<(Node, Vec<Edge>)> {
        let node = self.nodes.remove(id)?;
        let touching = self.edges_touching(id);
        let removed = touching
            .iter()
            .filter_map(|edge_id| self.edges.remove(edge_id))
            .collect();
        Some((node, removed))
    }

    /// Ids of every edge with `id` as source or target
    pub fn edges_touching(&self, id: &NodeId) -> Vec<EdgeId> {
        self.edges
            .values()
            .filter(|e| e.touches(id))
            .map(|e| e.id.clone())
            .collect()
    }

    /// Swap a node id everywhere it appears
    ///
    /// Moves the node, rewrites edge endpoints (recomputing composite ids and
    /// merging collisions) and rewrites references held in other nodes'
    /// relationship fields. Returns the `(old, new)` id of every rewritten edge.
    pub fn rename_node(&mut self, from: &NodeId, to: &NodeId) -> Vec<(EdgeId, EdgeId)> {
        if from == to {
            return Vec::new();
        }

        if let Some(mut node) = self.nodes.remove(from) {
            node.id = to.clone();
            match self.nodes.get_mut(to) {
                Some(existing) => {
                    for (field, value) in node.entity {
                        existing.entity.entry(field).or_insert(value);
                    }
                    for id in node.pending_mutation_ids.iter() {
                        existing.pending_mutation_ids.insert(*id);
                    }
                }
                None => {
                    self.nodes.insert(to.clone(), node);
                }
            }
        }

        let mut renamed = Vec::new();
        for old_id in self.edges_touching(from) {
            if let Some(mut edge) = self.edges.remove(&old_id) {
                edge.retarget(from, to);
                renamed.push((old_id, edge.id.clone()));
                self.add_edge(edge);
            }
        }

        for node in self.nodes.values_mut() {
            for field in relation_fields(node.entity_type) {
                if let Some(value) = node.entity.get_mut(field.name) {
                    value.replace_id(from.as_str(), to.as_str());
                }
            }
        }

        renamed
    }

    /// True if `source`'s `field` currently references `target`
    pub fn references(&self, source: &NodeId, field: &str, target: &NodeId) -> bool {
        self.nodes
            .get(source)
            .and_then(|n| n.entity.get(field))
            .map(|v: &PropertyValue| v.references(target.as_str()))
            .unwrap_or(false)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Nodes and edges with at least one pending mutation
    pub fn pending_count(&self) -> usize {
        self.nodes.values().filter(|n| n.pending_count() > 0).count()
            + self.edges.values().filter(|e| e.pending_count() > 0).count()
    }
}

/// Serialize id-keyed maps as plain arrays; the key is recovered from each item.
mod keyed {
    macro_rules! keyed_list {
        ($module:ident, $key:ty, $item:ty) => {
            pub mod $module {
                use serde::{Deserialize, Deserializer, Serialize, Serializer};
                use std::collections::BTreeMap;

                pub fn serialize<S: Serializer>(
                    map: &BTreeMap<$key, $item>,
                    serializer: S,
                ) -> Result<S::Ok, S::Error> {
                    let items: Vec<&$item> = map.values().collect();
                    items.serialize(serializer)
                }

                pub fn deserialize<'de, D: Deserializer<'de>>(
                    deserializer: D,
                ) -> Result<BTreeMap<$key, $item>, D::Error> {
                    let items = Vec::<$item>::deserialize(deserializer)?;
                    Ok(items.into_iter().map(|item| (item.id.clone(), item)).collect())
                }
            }
        };
    }

    keyed_list!(nodes, crate::graph::NodeId, crate::graph::Node);
    keyed_list!(edges, crate::graph::EdgeId, crate::graph::Edge);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimistic::MutationId;
    use crate::schema::{EntityType, RelationshipType};

    fn owned_edge(owner: &str, element: &str) -> Edge {
        Edge::new(
            NodeId::from(owner),
            "ownedElementIds",
            NodeId::from(element),
            RelationshipType::Ownership,
        )
    }

    #[test]
    fn add_edge_merges_pending_for_same_id() {
        let mut graph = Graph::new();
        let a = MutationId::new();
        let b = MutationId::new();

        let mut first = owned_edge("C1", "E1");
        first.pending_mutation_ids.insert(a);
        assert!(graph.add_edge(first));

        let mut second = owned_edge("C1", "E1");
        second.pending_mutation_ids.insert(b);
        assert!(!graph.add_edge(second));

        assert_eq!(graph.edge_count(), 1);
        let edge = graph.get_edge(&EdgeId::from("C1::ownedElementIds::E1")).unwrap();
        assert_eq!(edge.pending_count(), 2);
    }

    #[test]
    fn remove_node_cascade_drops_touching_edges() {
        let mut graph = Graph::new();
        graph.add_node(Node::new("C1", EntityType::Character));
        graph.add_node(Node::new("E1", EntityType::Element));
        graph.add_node(Node::new("E2", EntityType::Element));
        graph.add_edge(owned_edge("C1", "E1"));
        graph.add_edge(owned_edge("C1", "E2"));

        let (node, edges) = graph.remove_node_cascade(&NodeId::from("E1")).unwrap();
        assert_eq!(node.id.as_str(), "E1");
        assert_eq!(edges.len(), 1);
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.remove_node_cascade(&NodeId::from("E1")).is_none());
    }

    #[test]
    fn rename_node_rewrites_edges_and_references() {
        let mut graph = Graph::new();
        graph.add_node(
            Node::new("C1", EntityType::Character)
                .with_field("ownedElementIds", PropertyValue::id_list(["temp-1"])),
        );
        graph.add_node(Node::new("temp-1", EntityType::Element).with_field("ownerId", "C1"));
        graph.add_edge(owned_edge("C1", "temp-1"));

        let renamed = graph.rename_node(&NodeId::from("temp-1"), &NodeId::from("E9"));

        assert_eq!(renamed.len(), 1);
        assert_eq!(renamed[0].1.as_str(), "C1::ownedElementIds::E9");
        assert!(graph.get_node(&NodeId::from("temp-1")).is_none());
        assert_eq!(graph.get_node(&NodeId::from("E9")).unwrap().id.as_str(), "E9");
        assert_eq!(
            graph.get_node(&NodeId::from("C1")).unwrap().field("ownedElementIds"),
            Some(&PropertyValue::id_list(["E9"]))
        );
    }

    #[test]
    fn graph_serializes_as_arrays() {
        let mut graph = Graph::new();
        graph.add_node(Node::new("C1", EntityType::Character));
        graph.add_node(Node::new("E1", EntityType::Element));
        graph.add_edge(owned_edge("C1", "E1"));

        let json = serde_json::to_value(&graph).unwrap();
        assert_eq!(json["nodes"].as_array().unwrap().len(), 2);
        assert_eq!(json["edges"][0]["id"], "C1::ownedElementIds::E1");

        let back: Graph = serde_json::from_value(json).unwrap();
        assert_eq!(back, graph);
    }
}
