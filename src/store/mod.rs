//! Identity-keyed cache store
//!
//! General-purpose get-or-create map for callers that have no static token:
//! typically the request or pass object itself is the key. Keys are compared
//! by identity (see [`IdentityKey`]), values are type-erased and downcast on
//! the way out.
//!
//! Reads never block other keys. A miss runs the factory without holding
//! any lock, then publishes through the map's entry API: when several
//! threads race on one key, the first insert wins and every racer gets the
//! winner back. Losing values are dropped.

mod identity;

pub use identity::IdentityKey;

use crate::error::{BoxError, CacheError, CacheResult};
use crate::registry::stats::CacheCounters;
use dashmap::DashMap;
use std::any::{type_name, Any};
use std::sync::Arc;
use tracing::{trace, warn};

type Value = Arc<dyn Any + Send + Sync>;

/// Concurrent identity-keyed map with atomic get-or-create
#[derive(Default)]
pub struct IdentityKeyedStore {
    entries: DashMap<IdentityKey, Value>,
    counters: Arc<CacheCounters>,
}

impl IdentityKeyedStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_counters(counters: Arc<CacheCounters>) -> Self {
        Self {
            entries: DashMap::new(),
            counters,
        }
    }

    /// Get the value for `key`, creating it with `factory` on a miss.
    ///
    /// Under contention `factory` may run on several threads; exactly one
    /// result is published and returned to all of them. If `factory` fails
    /// nothing is stored and a later call may retry.
    pub fn get_or_create<K, V, F, E>(&self, key: &Arc<K>, factory: F) -> CacheResult<Arc<V>>
    where
        K: Any + Send + Sync,
        V: Any + Send + Sync,
        F: FnOnce() -> Result<V, E>,
        E: Into<BoxError>,
    {
        let key = IdentityKey::new(key);
        if let Some(existing) = self.lookup(&key) {
            self.counters.record_hit();
            return downcast(existing);
        }

        self.counters.record_miss();
        let created: Value = match factory() {
            Ok(value) => Arc::new(value),
            Err(e) => {
                self.counters.record_failure();
                let err = CacheError::factory(type_name::<V>(), e);
                warn!("Identity cache construction failed for {:?}: {}", key, err);
                return Err(err);
            }
        };
        self.counters.record_construction();

        let winner = Arc::clone(
            self.entries
                .entry(key.clone())
                .or_insert_with(|| Arc::clone(&created))
                .value(),
        );
        if !Arc::ptr_eq(&winner, &created) {
            trace!("Discarding duplicate value for {:?}", key);
            self.counters.record_discard();
        }
        downcast(winner)
    }

    /// Get the value for `key` without creating one
    pub fn get<K, V>(&self, key: &Arc<K>) -> CacheResult<Option<Arc<V>>>
    where
        K: Any + Send + Sync,
        V: Any + Send + Sync,
    {
        self.lookup(&IdentityKey::new(key))
            .map(downcast)
            .transpose()
    }

    /// Check whether a value was published for `key`
    pub fn contains_key<K: Any + Send + Sync>(&self, key: &Arc<K>) -> bool {
        self.entries.contains_key(&IdentityKey::new(key))
    }

    /// Number of published entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing was published yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, key: &IdentityKey) -> Option<Value> {
        // Clone out so the shard read guard is released before returning
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }
}

fn downcast<V: Any + Send + Sync>(value: Value) -> CacheResult<Arc<V>> {
    value.downcast::<V>().map_err(|_| CacheError::TypeMismatch {
        expected: type_name::<V>(),
    })
}
