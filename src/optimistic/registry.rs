//! Registry of mutations currently in flight

use super::MutationId;
use crate::graph::CacheKey;
use crate::mutation::OperationKind;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// What the registry knows about one in-flight mutation.
#[derive(Debug, Clone)]
pub struct InFlight {
    pub key: CacheKey,
    pub kind: OperationKind,
    pub started_at: DateTime<Utc>,
}

/// Mutations that have started and not yet settled.
///
/// Entries are removed when their [`InFlightGuard`] drops, which covers both
/// normal settlement and a mutation future dropped mid-flight.
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    active: Mutex<HashMap<MutationId, InFlight>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<MutationId, InFlight>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a mutation; it stays active until the guard drops.
    pub fn register(self: &Arc<Self>, id: MutationId, key: CacheKey, kind: OperationKind) -> InFlightGuard {
        self.lock().insert(
            id,
            InFlight {
                key,
                kind,
                started_at: Utc::now(),
            },
        );
        InFlightGuard {
            registry: Arc::clone(self),
            id,
        }
    }

    pub fn is_active(&self, id: &MutationId) -> bool {
        self.lock().contains_key(id)
    }

    pub fn get(&self, id: &MutationId) -> Option<InFlight> {
        self.lock().get(id).cloned()
    }

    pub fn active_ids(&self) -> HashSet<MutationId> {
        self.lock().keys().copied().collect()
    }

    /// Active mutations against one cache key
    pub fn active_for(&self, key: &CacheKey) -> usize {
        self.lock().values().filter(|m| &m.key == key).count()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn complete(&self, id: &MutationId) {
        self.lock().remove(id);
    }
}

/// Keeps a mutation registered as in flight for as long as it lives.
#[derive(Debug)]
pub struct InFlightGuard {
    registry: Arc<InFlightRegistry>,
    id: MutationId,
}

impl InFlightGuard {
    pub fn id(&self) -> MutationId {
        self.id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.complete(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_drop_completes_mutation() {
        let registry = Arc::new(InFlightRegistry::new());
        let id = MutationId::new();
        let guard = registry.register(id, CacheKey::from("graph"), OperationKind::Update);

        assert!(registry.is_active(&id));
        assert_eq!(registry.active_for(&CacheKey::from("graph")), 1);
        assert_eq!(registry.active_for(&CacheKey::from("other")), 0);

        drop(guard);
        assert!(!registry.is_active(&id));
        assert!(registry.is_empty());
    }

    #[test]
    fn active_ids_lists_every_live_mutation() {
        let registry = Arc::new(InFlightRegistry::new());
        let a = registry.register(MutationId::new(), CacheKey::from("graph"), OperationKind::Create);
        let b = registry.register(MutationId::new(), CacheKey::from("graph"), OperationKind::Delete);

        let ids = registry.active_ids();
        assert!(ids.contains(&a.id()));
        assert!(ids.contains(&b.id()));
        assert_eq!(registry.get(&b.id()).unwrap().kind, OperationKind::Delete);
    }
}
