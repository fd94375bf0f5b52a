//! GraphStore: the keyed cache holding graph snapshots
//!
//! Every write goes through [`GraphStore::transform`], which runs a closure
//! against the graph as it is at write time and commits the result as a new
//! revision. Subscribers are notified after each commit.

use super::cancel::{CancellationToken, ReadTicket};
use super::events::CacheEvent;
use super::snapshot::Graph;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use thiserror::Error;
use tokio::sync::broadcast;

/// Default broadcast capacity for cache events.
pub const DEFAULT_EVENT_CAPACITY: usize = 128;

/// Logical key a graph snapshot is cached under
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Errors that can occur reading the cache
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Graph not cached: {0}")]
    GraphNotFound(CacheKey),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, Default)]
struct Slot {
    graph: Graph,
    revision: u64,
}

/// The keyed graph cache
///
/// Holds one graph per cache key. Reads return clones; writes run through
/// `transform` so write ordering is auditable and each write sees the latest
/// committed graph.
#[derive(Debug)]
pub struct GraphStore {
    slots: DashMap<CacheKey, Slot>,
    /// Outstanding background reads per key
    reads: DashMap<CacheKey, CancellationToken>,
    events: broadcast::Sender<CacheEvent>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::with_event_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_event_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            slots: DashMap::new(),
            reads: DashMap::new(),
            events,
        }
    }

    /// Current graph under `key`, if one has been cached
    pub fn get(&self, key: &CacheKey) -> Option<Graph> {
        self.slots.get(key).map(|slot| slot.graph.clone())
    }

    /// Current graph under `key`, or an error if nothing is cached
    pub fn require(&self, key: &CacheKey) -> CacheResult<Graph> {
        self.get(key).ok_or_else(|| CacheError::GraphNotFound(key.clone()))
    }

    pub fn revision(&self, key: &CacheKey) -> u64 {
        self.slots.get(key).map(|slot| slot.revision).unwrap_or(0)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.slots.contains_key(key)
    }

    pub fn keys(&self) -> Vec<CacheKey> {
        self.slots.iter().map(|r| r.key().clone()).collect()
    }

    /// Replace the graph under `key` wholesale
    pub fn replace(&self, key: &CacheKey, graph: Graph) -> u64 {
        self.update(key, move |current| *current = graph);
        self.revision(key)
    }

    pub fn remove(&self, key: &CacheKey) -> Option<Graph> {
        self.reads.remove(key);
        self.slots.remove(key).map(|(_, slot)| slot.graph)
    }

    /// Run a write against the current graph under `key`
    ///
    /// The closure receives a working copy of the latest committed graph (an
    /// empty graph if none is cached). On `Ok` the copy is committed as a new
    /// revision and subscribers are notified; on `Err` the cache is untouched.
    /// The closure must not call back into the store.
    pub fn transform<R, E>(
        &self,
        key: &CacheKey,
        f: impl FnOnce(&mut Graph) -> Result<R, E>,
    ) -> Result<R, E> {
        let (result, revision) = {
            let mut slot = self.slots.entry(key.clone()).or_default();
            let mut working = slot.graph.clone();
            let result = f(&mut working)?;
            slot.graph = working;
            slot.revision += 1;
            (result, slot.revision)
        };
        self.notify(CacheEvent::Replaced {
            key: key.clone(),
            revision,
        });
        Ok(result)
    }

    /// Infallible form of [`GraphStore::transform`]
    pub fn update<R>(&self, key: &CacheKey, f: impl FnOnce(&mut Graph) -> R) -> R {
        match self.transform::<R, Infallible>(key, |graph| Ok(f(graph))) {
            Ok(result) => result,
            Err(never) => match never {},
        }
    }

    /// Subscribe to cache events
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    pub(crate) fn notify(&self, event: CacheEvent) {
        // No subscribers is the normal case outside a UI host
        let _ = self.events.send(event);
    }

    /// Register a background read of `key`
    pub fn begin_read(&self, key: &CacheKey) -> ReadTicket {
        let token = self
            .reads
            .entry(key.clone())
            .or_insert_with(CancellationToken::new)
            .clone();
        ReadTicket::new(key.clone(), token)
    }

    /// Cancel every read of `key` issued so far
    ///
    /// Reads begun afterwards receive a fresh token.
    pub fn cancel_reads(&self, key: &CacheKey) {
        if let Some((_, token)) = self.reads.remove(key) {
            token.cancel();
        }
    }

    /// Install the result of a background read unless it went stale
    ///
    /// Returns true if the graph was installed.
    pub fn finish_read(&self, ticket: ReadTicket, graph: Graph) -> bool {
        if ticket.is_stale() {
            tracing::debug!(key = %ticket.key, "discarding stale read");
            self.notify(CacheEvent::ReadDiscarded { key: ticket.key });
            return false;
        }
        self.replace(&ticket.key, graph);
        true
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}
