//! Errors surfaced by the mutation coordinator

use super::api::ApiError;
use super::request::OperationKind;
use crate::graph::{CacheError, CacheKey, NodeId};
use crate::schema::{EntityType, SchemaError};
use thiserror::Error;

/// Errors from one mutation.
///
/// Every variant is reported after the cache invariants have been restored:
/// validation errors happen before anything is applied, remote failures are
/// rolled back, and a version conflict is left in place for a refresh.
#[derive(Debug, Error)]
pub enum MutationError {
    /// Rejected locally before any snapshot or remote call
    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// The server reported concurrent remote changes; the cache needs a refresh
    #[error("version conflict on {node_id}: {message}")]
    VersionConflict { node_id: NodeId, message: String },

    /// The remote call failed and the optimistic patch was rolled back
    #[error("remote {kind} of {node_id} failed: {source}")]
    Remote {
        kind: OperationKind,
        node_id: NodeId,
        #[source]
        source: ApiError,
    },

    /// A background refresh could not fetch the graph; the cache is unchanged
    #[error("refresh of {key} failed: {source}")]
    Refresh {
        key: CacheKey,
        #[source]
        source: ApiError,
    },

    #[error("no API registered for entity type {0}")]
    NoApi(EntityType),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl MutationError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Network failures may be retried by the caller
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Remote { source, .. } | Self::Refresh { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::Schema(_)
                | Self::Remote {
                    source: ApiError::Validation(_),
                    ..
                }
        )
    }

    /// The remote failure behind this error, if any
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Remote { source, .. } | Self::Refresh { source, .. } => Some(source),
            _ => None,
        }
    }
}
