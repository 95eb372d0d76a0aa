//! Growable slot arrays backing token lookups
//!
//! Shared slots are a versioned array: readers load the current snapshot
//! through [`ArcSwap`] without locking, writers hold the manager lock,
//! copy into a larger array when needed and publish the new snapshot.
//! Each slot is a [`OnceLock`] so a published value is never replaced.
//!
//! Thread-local slots live in one plain `Vec` per thread and need no
//! synchronization at all.

use super::stats::CacheCounters;
use super::token::{self, CacheMode};
use crate::error::CacheResult;
use arc_swap::ArcSwap;
use parking_lot::ReentrantMutex;
use std::any::Any;
use std::cell::RefCell;
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};
use thread_local::ThreadLocal;
use tracing::{debug, trace};

/// Type-erased cache instance stored in a slot
pub(crate) type Slot = Arc<dyn Any + Send + Sync>;

/// Length needed so `index` and every index issued so far fit
fn target_len(mode: CacheMode, index: usize) -> usize {
    (index + 1).max(token::issued(mode) + 1)
}

/// Immutable-length array of write-once slots
struct SlotArray {
    slots: Box<[OnceLock<Slot>]>,
}

impl SlotArray {
    fn with_len(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| OnceLock::new()).collect(),
        }
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    fn get(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index).and_then(OnceLock::get)
    }

    /// Copy into a new array of `len` slots, keeping every published value
    fn grown_to(&self, len: usize) -> Self {
        let slots = (0..len)
            .map(|i| match self.get(i) {
                Some(value) => OnceLock::from(Arc::clone(value)),
                None => OnceLock::new(),
            })
            .collect();
        Self { slots }
    }
}

/// Shared-mode slots of one manager
pub(crate) struct SharedSlots {
    current: ArcSwap<SlotArray>,
    lock: ReentrantMutex<()>,
}

impl SharedSlots {
    /// Create slots sized for every shared token registered so far
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(SlotArray::with_len(
                token::issued(CacheMode::Shared) + 1,
            )),
            lock: ReentrantMutex::new(()),
        }
    }

    /// Lock-free lookup
    pub fn load(&self, index: usize) -> Option<Slot> {
        let array = self.current.load();
        if index < array.len() {
            array.get(index).cloned()
        } else {
            None
        }
    }

    /// Current array length
    pub fn capacity(&self) -> usize {
        self.current.load().len()
    }

    /// Publish `value` at `index` unless another thread won the race.
    ///
    /// Returns the value every caller will observe from now on and whether
    /// it is the one passed in.
    pub fn publish(&self, index: usize, value: Slot, counters: &CacheCounters) -> (Slot, bool) {
        let _guard = self.lock.lock();
        self.publish_locked(index, value, counters)
    }

    /// Look up `index`, constructing the value while holding the lock.
    ///
    /// `build` runs at most once per published value. It may look up other
    /// shared tokens on the same manager from the same thread.
    pub fn get_or_try_init<F>(
        &self,
        index: usize,
        counters: &CacheCounters,
        build: F,
    ) -> CacheResult<Slot>
    where
        F: FnOnce() -> CacheResult<Slot>,
    {
        let _guard = self.lock.lock();
        if let Some(existing) = self.current.load().get(index) {
            return Ok(Arc::clone(existing));
        }

        let value = build()?;
        // `build` may have grown the array re-entrantly, so publish into the
        // current snapshot rather than the one checked above
        let (visible, _) = self.publish_locked(index, value, counters);
        Ok(visible)
    }

    fn publish_locked(&self, index: usize, value: Slot, counters: &CacheCounters) -> (Slot, bool) {
        let array = self.writable(index, counters);
        let slot = &array.slots[index];
        match slot.get() {
            Some(existing) => (Arc::clone(existing), false),
            None => {
                let visible = Arc::clone(slot.get_or_init(|| value));
                (visible, true)
            }
        }
    }

    /// Current array, grown first if `index` does not fit. Lock must be held.
    fn writable(&self, index: usize, counters: &CacheCounters) -> Arc<SlotArray> {
        let array = self.current.load_full();
        if index < array.len() {
            return array;
        }

        let len = target_len(CacheMode::Shared, index);
        debug!("Growing shared slot array from {} to {}", array.len(), len);
        let grown = Arc::new(array.grown_to(len));
        self.current.store(Arc::clone(&grown));
        counters.record_grow();
        grown
    }
}

/// One thread's slots, tagged with the thread that filled them
struct LocalArray {
    owner: ThreadId,
    slots: Vec<Option<Slot>>,
}

impl LocalArray {
    fn for_current() -> Self {
        let len = token::issued(CacheMode::ThreadLocal) + 1;
        trace!("Allocating thread-local slot array of {}", len);
        Self {
            owner: thread::current().id(),
            slots: vec![None; len],
        }
    }

    /// Take over an entry left behind by an exited thread whose storage id
    /// was recycled. Its instances must never leak to the new thread.
    fn claim(&mut self) {
        let current = thread::current().id();
        if self.owner != current {
            debug!("Resetting thread-local slots inherited from {:?}", self.owner);
            *self = Self::for_current();
        }
    }
}

/// Thread-local-mode slots of one manager
pub(crate) struct LocalSlots {
    per_thread: ThreadLocal<RefCell<LocalArray>>,
}

impl LocalSlots {
    pub fn new() -> Self {
        Self {
            per_thread: ThreadLocal::new(),
        }
    }

    fn with_array<R>(&self, f: impl FnOnce(&mut LocalArray) -> R) -> R {
        let cell = self
            .per_thread
            .get_or(|| RefCell::new(LocalArray::for_current()));
        let mut array = cell.borrow_mut();
        array.claim();
        f(&mut array)
    }

    /// Lookup in the calling thread's array
    pub fn load(&self, index: usize) -> Option<Slot> {
        self.with_array(|array| array.slots.get(index).cloned().flatten())
    }

    /// Store `value` at `index` in the calling thread's array.
    ///
    /// The borrow is only held here, never while a constructor runs, so a
    /// constructor that re-enters the manager finds its own results. If it
    /// already filled this slot, that value stays and is returned.
    pub fn publish(&self, index: usize, value: Slot, counters: &CacheCounters) -> (Slot, bool) {
        self.with_array(|array| {
            if index >= array.slots.len() {
                let len = target_len(CacheMode::ThreadLocal, index);
                debug!(
                    "Growing thread-local slot array from {} to {}",
                    array.slots.len(),
                    len
                );
                array.slots.resize(len, None);
                counters.record_grow();
            }

            match &array.slots[index] {
                Some(existing) => (Arc::clone(existing), false),
                None => {
                    array.slots[index] = Some(Arc::clone(&value));
                    (value, true)
                }
            }
        })
    }

    /// Length of the calling thread's array, if it has one
    pub fn capacity(&self) -> Option<usize> {
        let current = thread::current().id();
        self.per_thread
            .get()
            .map(|cell| cell.borrow())
            .filter(|array| array.owner == current)
            .map(|array| array.slots.len())
    }
}
