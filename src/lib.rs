//! Optigraph: optimistic mutations over a client-held entity graph
//!
//! Keeps a cached `{nodes, edges}` graph consistent while mutations are in
//! flight: edits are applied before the server answers, reconciled with the
//! server's reply, and rolled back exactly when a call fails.
//!
//! # Core Concepts
//!
//! - **Nodes**: entity records (characters, elements, puzzles, timeline events)
//! - **Edges**: drawn by relationship fields, one per referenced id
//! - **Schema**: a static table of relationship fields and their inverses
//! - **Pending markers**: every node and edge carries the ids of the
//!   mutations currently editing it
//!
//! # Example
//!
//! ```
//! use optigraph::{ApiRegistry, GraphStore, MutationCoordinator};
//! use std::sync::Arc;
//!
//! let coordinator = MutationCoordinator::new(Arc::new(GraphStore::new()), ApiRegistry::new());
//! assert_eq!(coordinator.read().node_count(), 0);
//! ```

pub mod config;
mod graph;
pub mod mutation;
pub mod optimistic;
pub mod scenario;
pub mod schema;

pub use config::{ConfigError, EngineConfig};
pub use graph::{
    CacheError, CacheEvent, CacheKey, CacheResult, CancellationToken, Edge, EdgeId, Entity, Graph, GraphStore, Node,
    NodeId, PropertyValue, ReadTicket, DEFAULT_EVENT_CAPACITY,
};
pub use mutation::{
    ApiEntity, ApiError, ApiRegistry, ApiResponse, EntityApi, EntityPatch, GraphDelta, GraphSource, MutationContext,
    MutationCoordinator, MutationError, MutationOutcome, MutationRequest, OperationKind, ParentRelation,
    Reconciliation,
};
pub use optimistic::{MutationId, PendingSet};
pub use schema::{EntityType, RelationshipType};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
