//! Error types for cachereg
//!
//! All modules use `CacheResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Boxed error returned by cache constructors
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for cachereg operations
pub type CacheResult<T> = Result<T, CacheError>;

/// All errors that can occur in cachereg
#[derive(Error, Debug)]
pub enum CacheError {
    // Registry errors
    #[error("Invalid cache token (mode: {mode}, index: {index})")]
    InvalidToken { mode: String, index: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to construct cache {cache}: {source}")]
    FactoryFailure {
        cache: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("Cached value is not of type {expected}")]
    TypeMismatch { expected: &'static str },

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl CacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Wrap a constructor failure for the named cache
    pub fn factory(cache: &'static str, source: impl Into<BoxError>) -> Self {
        Self::FactoryFailure {
            cache,
            source: source.into(),
        }
    }

    /// Check if error is retryable
    ///
    /// A failed constructor leaves its slot empty, so the same lookup may
    /// succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::FactoryFailure { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::InvalidToken { .. } => {
                Some("Obtain tokens from CacheManager::register_type, never Default")
            }
            Self::InvalidArgument(_) => Some("Valid cache modes: shared, thread-local"),
            Self::ConfigInvalid { .. } => Some("Run: cachereg config init --force"),
            _ => None,
        }
    }
}
