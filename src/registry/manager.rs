//! Owner-scoped cache manager

use super::dispose::{DisposeListener, DisposeSignal};
use super::slots::{LocalSlots, SharedSlots, Slot};
use super::stats::{CacheCounters, CacheStats};
use super::token::{self, default_factory, CacheFactory, CacheMode, CacheToken};
use crate::config::schema::{ConstructionStrategy, ManagerConfig};
use crate::error::{BoxError, CacheError, CacheResult};
use crate::store::IdentityKeyedStore;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManagerId(u64);

impl ManagerId {
    fn next() -> Self {
        Self(NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ManagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-owner registry of lazily created caches.
///
/// One manager exists per logical owner (an analysis session, a render
/// pass). Cache kinds are registered once per process with
/// [`register_type`](Self::register_type); every manager then holds at
/// most one instance per shared token, and one per thread for
/// thread-local tokens. Ad-hoc caches keyed by an object go through
/// [`get_or_create`](Self::get_or_create).
///
/// The manager does not own the resources of cached values. When the owner
/// is done it calls [`dispose`](Self::dispose) (or drops the manager) and
/// collaborators subscribed through [`on_disposed`](Self::on_disposed)
/// release whatever they tied to it.
pub struct CacheManager {
    id: ManagerId,
    label: Option<String>,
    strategy: ConstructionStrategy,
    store: IdentityKeyedStore,
    shared: SharedSlots,
    local: LocalSlots,
    counters: Arc<CacheCounters>,
    disposed: DisposeSignal<CacheManager>,
}

impl CacheManager {
    /// Register a cache type constructed with `T::default()`.
    ///
    /// Causes every manager to reserve a slot for `T` in the given mode.
    /// Call it once per cache kind, typically while the process starts,
    /// and keep the token in a static.
    pub fn register_type<T>(mode: CacheMode) -> CacheToken<T>
    where
        T: Default + Send + Sync + 'static,
    {
        Self::register_type_with(mode, default_factory::<T>)
    }

    /// Register a cache type with a fallible constructor
    pub fn register_type_with<T>(mode: CacheMode, factory: CacheFactory<T>) -> CacheToken<T>
    where
        T: Send + Sync + 'static,
    {
        CacheToken::new(mode, token::allocate_index(mode), factory)
    }

    /// Number of cache types registered so far in `mode`
    pub fn registered_count(mode: CacheMode) -> usize {
        token::issued(mode)
    }

    /// Create a manager with default settings
    pub fn new() -> Self {
        Self::with_config(&ManagerConfig::default())
    }

    /// Create a manager from configuration
    pub fn with_config(config: &ManagerConfig) -> Self {
        let counters = Arc::new(CacheCounters::default());
        let manager = Self {
            id: ManagerId::next(),
            label: config.label.clone(),
            strategy: config.construction,
            store: IdentityKeyedStore::with_counters(Arc::clone(&counters)),
            shared: SharedSlots::new(),
            local: LocalSlots::new(),
            counters,
            disposed: DisposeSignal::new(),
        };
        debug!(
            "Created cache manager {} ({}, {:?})",
            manager.id,
            manager.label(),
            manager.strategy
        );
        manager
    }

    /// Process-unique id of this manager
    pub fn id(&self) -> ManagerId {
        self.id
    }

    /// Label used in logs, `"unnamed"` if none was configured
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or("unnamed")
    }

    /// Construction strategy for shared-mode misses
    pub fn strategy(&self) -> ConstructionStrategy {
        self.strategy
    }

    /// Get the cache instance for `token`, creating it on first access.
    ///
    /// Shared tokens yield the same instance to every thread using this
    /// manager. Thread-local tokens yield one instance per calling thread.
    pub fn get<T>(&self, token: &CacheToken<T>) -> CacheResult<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let (mode, factory) = token.resolve()?;
        let index = token.index();

        let cached = match mode {
            CacheMode::Shared => self.shared.load(index),
            CacheMode::ThreadLocal => self.local.load(index),
        };
        if let Some(slot) = cached {
            self.counters.record_hit();
            return downcast(slot, token);
        }

        self.counters.record_miss();
        let slot = match (mode, self.strategy) {
            (CacheMode::Shared, ConstructionStrategy::Speculative) => {
                let value = self.construct(token, factory)?;
                let (visible, won) = self.shared.publish(index, value, &self.counters);
                if !won {
                    trace!(
                        "Manager {} discarding speculative {}",
                        self.id,
                        token.cache_name()
                    );
                    self.counters.record_discard();
                }
                visible
            }
            (CacheMode::Shared, ConstructionStrategy::Locked) => {
                self.shared
                    .get_or_try_init(index, &self.counters, || self.construct(token, factory))?
            }
            (CacheMode::ThreadLocal, _) => {
                let value = self.construct(token, factory)?;
                let (visible, won) = self.local.publish(index, value, &self.counters);
                if !won {
                    self.counters.record_discard();
                }
                visible
            }
        };
        downcast(slot, token)
    }

    /// Get the value cached for `key`, creating it with `factory` on a miss.
    ///
    /// `key` is compared by identity; see [`IdentityKeyedStore`].
    pub fn get_or_create<K, V, F, E>(&self, key: &Arc<K>, factory: F) -> CacheResult<Arc<V>>
    where
        K: Any + Send + Sync,
        V: Any + Send + Sync,
        F: FnOnce() -> Result<V, E>,
        E: Into<BoxError>,
    {
        self.store.get_or_create(key, factory)
    }

    /// Identity-keyed store of this manager
    pub fn store(&self) -> &IdentityKeyedStore {
        &self.store
    }

    /// Subscribe to the disposal notification.
    ///
    /// Returns false if the manager was already disposed; the listener is
    /// then dropped without being called.
    pub fn on_disposed<F>(&self, listener: F) -> bool
    where
        F: FnOnce(&CacheManager) + Send + 'static,
    {
        let listener: DisposeListener<CacheManager> = Box::new(listener);
        let accepted = self.disposed.subscribe(listener);
        if !accepted {
            warn!(
                "Manager {} already disposed, listener not registered",
                self.id
            );
        }
        accepted
    }

    /// Notify disposal listeners. Only the first call has an effect.
    ///
    /// Cached instances stay reachable; disposal only tells collaborators
    /// that the owner is finished with this manager.
    pub fn dispose(&self) {
        if let Some(notified) = self.disposed.notify(self) {
            info!(
                "Disposed cache manager {} ({}), {} listener(s) notified",
                self.id,
                self.label(),
                notified
            );
        }
    }

    /// Check whether [`dispose`](Self::dispose) has run
    pub fn is_disposed(&self) -> bool {
        self.disposed.has_fired()
    }

    /// Snapshot of this manager's access counters
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    /// Current length of the shared slot array
    pub fn shared_capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Length of the calling thread's slot array, if it has one
    pub fn thread_local_capacity(&self) -> Option<usize> {
        self.local.capacity()
    }

    fn construct<T>(&self, token: &CacheToken<T>, factory: CacheFactory<T>) -> CacheResult<Slot>
    where
        T: Send + Sync + 'static,
    {
        match factory() {
            Ok(value) => {
                self.counters.record_construction();
                Ok(Arc::new(value))
            }
            Err(e) => {
                self.counters.record_failure();
                let err = CacheError::factory(token.cache_name(), e);
                warn!("Manager {}: {}", self.id, err);
                Err(err)
            }
        }
    }
}

fn downcast<T: Send + Sync + 'static>(slot: Slot, token: &CacheToken<T>) -> CacheResult<Arc<T>> {
    slot.downcast::<T>().map_err(|_| token.invalid())
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("strategy", &self.strategy)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Barrier, Mutex};

    #[derive(Debug, Default)]
    struct Layout {
        rows: Mutex<Vec<u32>>,
    }

    #[test]
    fn shared_get_returns_same_instance() {
        let token = CacheManager::register_type::<Layout>(CacheMode::Shared);
        let manager = CacheManager::new();

        let a = manager.get(&token).unwrap();
        a.rows.lock().unwrap().push(1);
        let b = manager.get(&token).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(*b.rows.lock().unwrap(), vec![1]);
    }

    #[test]
    fn managers_do_not_share_instances() {
        let token = CacheManager::register_type::<Layout>(CacheMode::Shared);
        let first = CacheManager::new();
        let second = CacheManager::new();

        let a = first.get(&token).unwrap();
        let b = second.get(&token).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn default_token_is_rejected_without_growth() {
        let manager = CacheManager::new();
        let before = manager.shared_capacity();

        let err = manager.get(&CacheToken::<Layout>::default()).unwrap_err();
        assert!(matches!(err, CacheError::InvalidToken { index: 0, .. }));
        assert_eq!(manager.shared_capacity(), before);
        assert!(manager.thread_local_capacity().is_none());
        assert_eq!(manager.stats().misses, 0);
    }

    static FLAKY_CALLS: AtomicUsize = AtomicUsize::new(0);

    #[derive(Debug)]
    struct Flaky(usize);

    fn flaky() -> Result<Flaky, BoxError> {
        let call = FLAKY_CALLS.fetch_add(1, Ordering::SeqCst);
        if call == 0 {
            Err("first attempt fails".into())
        } else {
            Ok(Flaky(call))
        }
    }

    #[test]
    fn factory_failure_leaves_slot_empty() {
        let token = CacheManager::register_type_with(CacheMode::Shared, flaky);
        let manager = CacheManager::new();

        let err = manager.get(&token).unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, CacheError::FactoryFailure { .. }));

        let value = manager.get(&token).unwrap();
        assert_eq!(value.0, 1);
        assert_eq!(manager.stats().failures, 1);
    }

    #[test]
    fn thread_local_instances_are_per_thread() {
        let token = CacheManager::register_type::<Layout>(CacheMode::ThreadLocal);
        let manager = CacheManager::new();

        let mine = manager.get(&token).unwrap();
        assert!(Arc::ptr_eq(&mine, &manager.get(&token).unwrap()));

        let theirs =
            std::thread::scope(|s| s.spawn(|| manager.get(&token).unwrap()).join().unwrap());
        assert!(!Arc::ptr_eq(&mine, &theirs));
    }

    static LOCKED_BUILDS: AtomicUsize = AtomicUsize::new(0);

    fn counted() -> Result<usize, BoxError> {
        Ok(LOCKED_BUILDS.fetch_add(1, Ordering::SeqCst))
    }

    #[test]
    fn locked_strategy_constructs_once() {
        const THREADS: usize = 8;
        let token = CacheManager::register_type_with(CacheMode::Shared, counted);
        let manager = CacheManager::with_config(&ManagerConfig {
            construction: ConstructionStrategy::Locked,
            label: Some("locked".to_string()),
        });
        let barrier = Barrier::new(THREADS);

        std::thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    barrier.wait();
                    manager.get(&token).unwrap();
                });
            }
        });

        assert_eq!(LOCKED_BUILDS.load(Ordering::SeqCst), 1);
        assert_eq!(manager.stats().constructions, 1);
        assert_eq!(manager.stats().discarded, 0);
    }

    #[test]
    fn dispose_notifies_once_and_on_drop_is_noop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let manager = CacheManager::new();
        let seen = Arc::clone(&calls);
        assert!(manager.on_disposed(move |m| {
            assert!(m.is_disposed());
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        manager.dispose();
        manager.dispose();
        assert!(!manager.on_disposed(|_| {}));
        drop(manager);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_disposes() {
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let manager = CacheManager::new();
            let seen = Arc::clone(&calls);
            manager.on_disposed(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cached_values_survive_dispose() {
        let token = CacheManager::register_type::<Layout>(CacheMode::Shared);
        let manager = CacheManager::new();
        let before = manager.get(&token).unwrap();
        manager.dispose();
        assert!(Arc::ptr_eq(&before, &manager.get(&token).unwrap()));
    }
}
