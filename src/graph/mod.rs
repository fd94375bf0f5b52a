//! Core graph data structures and the graph cache store

mod cancel;
mod edge;
mod events;
mod node;
mod snapshot;
mod store;


pub use cancel::{CancellationToken, ReadTicket};
pub use edge::{Edge, EdgeId};
pub use events::CacheEvent;
pub use node::{Entity, Node, NodeId, PropertyValue};
pub use snapshot::Graph;
pub use store::{CacheError, CacheKey, CacheResult, GraphStore, DEFAULT_EVENT_CAPACITY};
