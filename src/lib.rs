//! cachereg - owner-scoped cache registry
//!
//! Lazily creates one instance of each registered cache kind per owner
//! (or per owner and thread), with a lock-free hit path, plus an
//! identity-keyed store for ad-hoc caches and a one-shot disposal
//! notification for owner teardown.

pub mod cli;
pub mod config;
pub mod error;
pub mod registry;
pub mod store;
pub mod ui;

pub use error::{BoxError, CacheError, CacheResult};
pub use registry::{CacheManager, CacheMode, CacheStats, CacheToken, ManagerId};
pub use store::{IdentityKey, IdentityKeyedStore};
