//! Token-addressed cache registry
//!
//! Cache kinds are registered once per process and receive a
//! [`CacheToken`]. Each [`CacheManager`] then resolves a token to its own
//! instance of that cache in one of two modes:
//!
//! | Mode | Instances | Hit path | Miss path |
//! |------|-----------|----------|-----------|
//! | Shared | one per manager | lock-free snapshot load | manager lock, double-checked |
//! | ThreadLocal | one per manager per thread | per-thread array | no lock |
//!
//! Slot indices are dense within each mode and start at 1; index 0 and the
//! default token are never valid. Slot arrays grow when a token registered
//! after the manager was created is first used, and never shrink.

mod dispose;
pub mod manager;
mod slots;
pub mod stats;
pub mod token;

pub use dispose::DisposeListener;
pub use manager::{CacheManager, ManagerId};
pub use stats::{CacheCounters, CacheStats};
pub use token::{CacheFactory, CacheMode, CacheToken};
