//! Store error taxonomy
//!
//! Every fallible operation in the crate returns [`StoreError`]. Cache misses are
//! never errors: they surface as `Ok(None)` so "absent" stays distinguishable from
//! a value that exists but cannot be decoded.

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the store, its pool and the adapters built on top of it
#[derive(Debug, Error)]
pub enum StoreError {
    /// Invalid or missing configuration (fatal, raised at initialization)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No pooled connection became available within the configured wait bound
    #[error("connection pool exhausted after waiting {waited_ms}ms")]
    PoolExhausted { waited_ms: u64 },

    /// The pool has been shut down
    #[error("connection pool is closed")]
    PoolClosed,

    /// A value could not be encoded by the codec
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Stored bytes could not be decoded into the requested type
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// Connectivity or protocol failure reported by the remote store
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A single round-trip exceeded the per-call deadline
    #[error("store command timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Caller supplied an argument the store cannot act on
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Session lookup by id found nothing
    #[error("unknown session: {0}")]
    UnknownSession(String),
}

impl StoreError {
    /// Whether the error came from the connection itself (as opposed to the
    /// caller's data), meaning the connection must not be reused.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout { .. })
    }

    /// Whether retrying the same call later may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::PoolExhausted { .. } | Self::Unavailable(_) | Self::Timeout { .. }
        )
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        Self::Unavailable(err.to_string())
    }
}
