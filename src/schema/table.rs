//! Relationship table per entity type

use super::{Cardinality, EntityType, RelationField, RelationshipType};

const fn single(
    name: &'static str,
    target: EntityType,
    inverse: Option<&'static str>,
    edge: Option<RelationshipType>,
) -> RelationField {
    RelationField {
        name,
        cardinality: Cardinality::Single,
        target,
        inverse,
        edge,
    }
}

const fn many(
    name: &'static str,
    target: EntityType,
    inverse: Option<&'static str>,
    edge: Option<RelationshipType>,
) -> RelationField {
    RelationField {
        name,
        cardinality: Cardinality::Many,
        target,
        inverse,
        edge,
    }
}

const CHARACTER: &[RelationField] = &[
    many("ownedElementIds", EntityType::Element, Some("ownerId"), Some(RelationshipType::Ownership)),
    many("associatedElementIds", EntityType::Element, Some("associatedCharacterIds"), None),
    many("characterPuzzleIds", EntityType::Puzzle, Some("ownerId"), None),
    many("eventIds", EntityType::Timeline, Some("charactersInvolvedIds"), None),
];

const ELEMENT: &[RelationField] = &[
    single("ownerId", EntityType::Character, Some("ownedElementIds"), None),
    single("containerId", EntityType::Element, Some("contentIds"), None),
    many("contentIds", EntityType::Element, Some("containerId"), Some(RelationshipType::Container)),
    many("requiredForPuzzleIds", EntityType::Puzzle, Some("puzzleElementIds"), None),
    many("rewardedByPuzzleIds", EntityType::Puzzle, Some("rewardIds"), None),
    many(
        "associatedCharacterIds",
        EntityType::Character,
        Some("associatedElementIds"),
        Some(RelationshipType::Association),
    ),
    single("timelineEventId", EntityType::Timeline, Some("memoryEvidenceIds"), None),
];

const PUZZLE: &[RelationField] = &[
    single("ownerId", EntityType::Character, Some("characterPuzzleIds"), Some(RelationshipType::Ownership)),
    single("lockedItemId", EntityType::Element, None, Some(RelationshipType::Unlock)),
    many(
        "puzzleElementIds",
        EntityType::Element,
        Some("requiredForPuzzleIds"),
        Some(RelationshipType::Requirement),
    ),
    many("rewardIds", EntityType::Element, Some("rewardedByPuzzleIds"), Some(RelationshipType::Reward)),
    single("parentItemId", EntityType::Puzzle, Some("subPuzzleIds"), None),
    many("subPuzzleIds", EntityType::Puzzle, Some("parentItemId"), Some(RelationshipType::Dependency)),
];

const TIMELINE: &[RelationField] = &[
    many(
        "charactersInvolvedIds",
        EntityType::Character,
        Some("eventIds"),
        Some(RelationshipType::Participation),
    ),
    many(
        "memoryEvidenceIds",
        EntityType::Element,
        Some("timelineEventId"),
        Some(RelationshipType::Timeline),
    ),
];

/// All relationship fields declared for an entity type.
pub fn relation_fields(entity_type: EntityType) -> &'static [RelationField] {
    match entity_type {
        EntityType::Character => CHARACTER,
        EntityType::Element => ELEMENT,
        EntityType::Puzzle => PUZZLE,
        EntityType::Timeline => TIMELINE,
    }
}
