//! Seed cache shared by the scenario tests
//!
//! ```text
//! char-1  owns E1, owns puzzle P1
//! char-2  involved in T1
//! P2      requires [E1, E2], rewards [E1, E3]
//! ```

use optigraph::mutation::build_graph;
use optigraph::{ApiRegistry, EntityType, Graph, GraphStore, MutationCoordinator, Node, PropertyValue};
use std::sync::Arc;

pub fn node(id: &str, entity_type: EntityType) -> Node {
    Node::new(id, entity_type)
}

pub fn seed_graph() -> Graph {
    build_graph([
        node("char-1", EntityType::Character)
            .with_field("name", "Marcus Blackwood")
            .with_field("characterPuzzleIds", PropertyValue::id_list(["P1"]))
            .with_field("ownedElementIds", PropertyValue::id_list(["E1"])),
        node("char-2", EntityType::Character)
            .with_field("name", "Sarah Chen")
            .with_field("eventIds", PropertyValue::id_list(["T1"])),
        node("P1", EntityType::Puzzle)
            .with_field("name", "Locked Safe")
            .with_field("ownerId", "char-1")
            .with_field("description", "A wall safe behind the portrait"),
        node("P2", EntityType::Puzzle)
            .with_field("name", "Cipher Wheel")
            .with_field("puzzleElementIds", PropertyValue::id_list(["E1", "E2"]))
            .with_field("rewardIds", PropertyValue::id_list(["E1", "E3"])),
        node("E1", EntityType::Element)
            .with_field("name", "Brass Key")
            .with_field("ownerId", "char-1")
            .with_field("requiredForPuzzleIds", PropertyValue::id_list(["P2"]))
            .with_field("rewardedByPuzzleIds", PropertyValue::id_list(["P2"])),
        node("E2", EntityType::Element)
            .with_field("name", "Cipher Key")
            .with_field("requiredForPuzzleIds", PropertyValue::id_list(["P2"])),
        node("E3", EntityType::Element)
            .with_field("name", "Ledger Page")
            .with_field("rewardedByPuzzleIds", PropertyValue::id_list(["P2"])),
        node("T1", EntityType::Timeline)
            .with_field("description", "Gala night")
            .with_field("charactersInvolvedIds", PropertyValue::id_list(["char-2"])),
    ])
}

/// A coordinator over a store seeded with [`seed_graph`]
pub fn coordinator(apis: ApiRegistry) -> Arc<MutationCoordinator> {
    let coordinator = MutationCoordinator::new(Arc::new(GraphStore::new()), apis);
    coordinator.store().replace(coordinator.cache_key(), seed_graph());
    Arc::new(coordinator)
}

/// Sorted edge ids of a graph
pub fn edge_ids(graph: &Graph) -> Vec<String> {
    graph.edges().map(|e| e.id.to_string()).collect()
}
