//! Stale-read cancellation
//!
//! A background refresh of a cache key is issued a ticket when it starts.
//! Starting a mutation against that key cancels every outstanding ticket, so
//! a slow read that resolves afterwards is dropped instead of clobbering the
//! newer optimistic state. Mutations themselves are never cancelled.

use super::store::CacheKey;

pub use tokio_util::sync::CancellationToken;

/// Proof that a read of `key` started; redeemed with `GraphStore::finish_read`.
#[derive(Debug, Clone)]
pub struct ReadTicket {
    pub(crate) key: CacheKey,
    pub(crate) token: CancellationToken,
}

impl ReadTicket {
    pub(crate) fn new(key: CacheKey, token: CancellationToken) -> Self {
        Self { key, token }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// True once a mutation has started against the key since the read began.
    pub fn is_stale(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once a mutation starts against the key.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}
