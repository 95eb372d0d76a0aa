//! Identity-compared map keys

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Map key that compares by allocation identity, never by value.
///
/// Two keys are equal only when they point at the same `Arc` allocation;
/// structurally equal objects in different allocations are different keys.
/// The key holds a strong reference, so the address it compares by cannot
/// be freed and reused while the key is alive.
#[derive(Clone)]
pub struct IdentityKey {
    target: Arc<dyn Any + Send + Sync>,
}

impl IdentityKey {
    /// Wrap a shared object as an identity key
    pub fn new<K: Any + Send + Sync>(key: &Arc<K>) -> Self {
        Self {
            target: Arc::clone(key) as Arc<dyn Any + Send + Sync>,
        }
    }

    /// Address of the keyed allocation
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.target) as *const () as usize
    }

    /// Check whether this key refers to `other`'s allocation
    pub fn is<K: Any + Send + Sync>(&self, other: &Arc<K>) -> bool {
        self.addr() == Arc::as_ptr(other) as *const () as usize
    }
}

impl PartialEq for IdentityKey {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for IdentityKey {}

impl Hash for IdentityKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityKey({:#x})", self.addr())
    }
}
