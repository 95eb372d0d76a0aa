//! Cache type tokens and process-wide slot allocation

use crate::error::{BoxError, CacheError, CacheResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Allocation mode of a registered cache type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum CacheMode {
    /// One instance per manager, visible to every thread
    Shared = 1,
    /// One instance per manager per thread
    ThreadLocal = 2,
}

impl CacheMode {
    /// Get the mode name as used on the command line and in config files
    pub fn name(&self) -> &'static str {
        match self {
            CacheMode::Shared => "shared",
            CacheMode::ThreadLocal => "thread-local",
        }
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CacheMode {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "shared" => Ok(CacheMode::Shared),
            "thread-local" | "thread_local" | "threadlocal" => Ok(CacheMode::ThreadLocal),
            _ => Err(CacheError::InvalidArgument(format!(
                "unknown cache mode: {}",
                s
            ))),
        }
    }
}

impl TryFrom<u8> for CacheMode {
    type Error = CacheError;

    // 0 never decodes to a mode
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(CacheMode::Shared),
            2 => Ok(CacheMode::ThreadLocal),
            other => Err(CacheError::InvalidArgument(format!(
                "invalid value for cache mode: {}",
                other
            ))),
        }
    }
}

static NEXT_SHARED_INDEX: AtomicUsize = AtomicUsize::new(0);
static NEXT_THREAD_LOCAL_INDEX: AtomicUsize = AtomicUsize::new(0);

fn counter(mode: CacheMode) -> &'static AtomicUsize {
    match mode {
        CacheMode::Shared => &NEXT_SHARED_INDEX,
        CacheMode::ThreadLocal => &NEXT_THREAD_LOCAL_INDEX,
    }
}

/// Allocate the next slot index for `mode`. Indices start at 1.
pub(crate) fn allocate_index(mode: CacheMode) -> usize {
    counter(mode).fetch_add(1, Ordering::AcqRel) + 1
}

/// Highest slot index issued so far for `mode`
pub(crate) fn issued(mode: CacheMode) -> usize {
    counter(mode).load(Ordering::Acquire)
}

/// Constructor stored in a token
pub type CacheFactory<T> = fn() -> Result<T, BoxError>;

pub(crate) fn default_factory<T: Default>() -> Result<T, BoxError> {
    Ok(T::default())
}

/// Handle to a registered cache type.
///
/// Tokens are created once per cache kind, usually at startup, through
/// [`CacheManager::register_type`](super::CacheManager::register_type) and
/// are valid for every manager in the process. `CacheToken::default()` is
/// an unregistered token; looking it up fails with
/// [`CacheError::InvalidToken`].
pub struct CacheToken<T> {
    mode: Option<CacheMode>,
    index: usize,
    factory: Option<CacheFactory<T>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> CacheToken<T> {
    pub(crate) fn new(mode: CacheMode, index: usize, factory: CacheFactory<T>) -> Self {
        debug!(
            "Registered {} cache {} at slot {}",
            mode,
            std::any::type_name::<T>(),
            index
        );
        Self {
            mode: Some(mode),
            index,
            factory: Some(factory),
            _marker: PhantomData,
        }
    }

    /// Allocation mode, `None` for an unregistered token
    pub fn mode(&self) -> Option<CacheMode> {
        self.mode
    }

    /// Slot index within the token's mode
    pub fn index(&self) -> usize {
        self.index
    }

    /// Name of the cached type, used in logs and errors
    pub fn cache_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    /// Resolve the token into its mode and constructor.
    ///
    /// Fails for the default token and for indices never issued in the
    /// token's mode.
    pub(crate) fn resolve(&self) -> CacheResult<(CacheMode, CacheFactory<T>)> {
        match (self.mode, self.factory) {
            (Some(mode), Some(factory)) if self.index != 0 && self.index <= issued(mode) => {
                Ok((mode, factory))
            }
            _ => Err(self.invalid()),
        }
    }

    pub(crate) fn invalid(&self) -> CacheError {
        CacheError::InvalidToken {
            mode: self.mode.map_or("none", |m| m.name()).to_string(),
            index: self.index,
        }
    }
}

impl<T> Default for CacheToken<T> {
    fn default() -> Self {
        Self {
            mode: None,
            index: 0,
            factory: None,
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for CacheToken<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for CacheToken<T> {}

impl<T> fmt::Debug for CacheToken<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheToken")
            .field("cache", &self.cache_name())
            .field("mode", &self.mode)
            .field("index", &self.index)
            .finish()
    }
}

impl<T> PartialEq for CacheToken<T> {
    fn eq(&self, other: &Self) -> bool {
        self.mode == other.mode && self.index == other.index
    }
}

impl<T> Eq for CacheToken<T> {}
