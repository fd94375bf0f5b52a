//! Optimistic mutations: payloads, relationship sync, reconcile and rollback

mod api;
mod context;
mod coordinator;
mod delta;
mod error;
mod request;
mod rollback;
pub mod sync;

pub use api::{ApiEntity, ApiError, ApiRegistry, ApiResponse, EntityApi, GraphSource};
pub use context::{ChangeJournal, FieldChange, MutationContext, TouchedIds};
pub use coordinator::{MutationCoordinator, MutationOutcome, Reconciliation};
pub use delta::{apply_delta, ChangeSet, Deleted, DeltaSummary, GraphDelta};
pub use error::MutationError;
pub use request::{EntityPatch, MutationRequest, OperationKind, ParentRelation};
pub use rollback::RollbackPath;
pub use sync::{build_graph, derive_edges, SyncPlan};
