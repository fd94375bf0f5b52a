//! Cache events broadcast to subscribers

use super::store::CacheKey;
use crate::optimistic::MutationId;

/// Fired by the store whenever subscribers may need to re-read the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    /// The graph under `key` was replaced; `revision` increases monotonically
    Replaced { key: CacheKey, revision: u64 },
    /// A remote version conflict left the cache holding a guess the server
    /// rejected; the holder should refetch
    RefreshRequired {
        key: CacheKey,
        mutation_id: MutationId,
    },
    /// A background read resolved after a mutation started and was dropped
    ReadDiscarded { key: CacheKey },
}

impl CacheEvent {
    pub fn key(&self) -> &CacheKey {
        match self {
            Self::Replaced { key, .. } | Self::RefreshRequired { key, .. } | Self::ReadDiscarded { key } => key,
        }
    }
}
