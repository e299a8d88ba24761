//! Store Traits
//!
//! This module defines the seams of the crate:
//!
//! - `CacheCodec`: pluggable value serialization
//! - `StoreConnection`: one live connection speaking the key-value command set
//! - `ConnectionFactory`: opens new connections for the pool
//! - `Cache`: the cache capability exposed to the host framework
//! - `SessionRepository`: the session persistence capability exposed to the host
//!
//! # Example: Custom Connection Backend
//!
//! ```rust,ignore
//! use redis_security_store::{ConnectionFactory, StoreConnection, async_trait};
//! use redis_security_store::Result;
//!
//! struct MyFactory;
//!
//! #[async_trait]
//! impl ConnectionFactory for MyFactory {
//!     async fn connect(&self) -> Result<Box<dyn StoreConnection>> {
//!         // Open a connection to your store
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "my-store"
//!     }
//! }
//! ```

use crate::error::Result;
use crate::session::Session;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;

/// Trait for stored value serialization/deserialization
///
/// Stored values carry no type tag: the expected type is fixed by the caller's
/// generic parameter, and a mismatch surfaces as
/// [`StoreError::Deserialization`](crate::StoreError::Deserialization).
///
/// # Example: Custom Codec
///
/// ```rust,ignore
/// use redis_security_store::{CacheCodec, Result, StoreError};
/// use serde::{Serialize, de::DeserializeOwned};
///
/// #[derive(Debug)]
/// struct MyCodec;
///
/// impl CacheCodec for MyCodec {
///     fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
///         mycodec::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))
///     }
///
///     fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
///         mycodec::from_slice(bytes).map_err(|e| StoreError::Deserialization(e.to_string()))
///     }
///
///     fn name(&self) -> &'static str {
///         "mycodec"
///     }
/// }
/// ```
pub trait CacheCodec: Send + Sync + Debug {
    /// Serialize a value to bytes
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Serialization` if the value cannot be encoded.
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>>;

    /// Deserialize bytes to a value
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Deserialization` if the bytes are truncated, corrupted
    /// or do not describe a `T`.
    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;

    /// Name of the codec, used in logs
    fn name(&self) -> &'static str;
}

/// A live connection to the key-value store
///
/// Connections are owned by the pool and leased to one caller at a time, so
/// per-connection state (authentication, selected database) belongs to whoever
/// holds the lease. The pool reissues `auth` and `select` on every borrow.
///
/// Every method is one request/response round-trip.
#[async_trait]
pub trait StoreConnection: Send {
    /// AUTH with the configured credential
    async fn auth(&mut self, password: &str) -> Result<()>;

    /// SELECT a database index
    async fn select(&mut self, database: u32) -> Result<()>;

    /// PING, used to validate idle connections
    async fn ping(&mut self) -> Result<()>;

    /// GET; `None` when the key is absent
    async fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// SET without expiration
    async fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// SET with EX: write and expiry in a single atomic command
    async fn set_ex(&mut self, key: &[u8], value: &[u8], seconds: u64) -> Result<()>;

    /// EXPIRE; `false` when the key does not exist
    async fn expire(&mut self, key: &[u8], seconds: u64) -> Result<bool>;

    /// DEL of one or more keys; returns how many existed
    async fn del(&mut self, keys: &[Vec<u8>]) -> Result<u64>;

    /// EXISTS
    async fn exists(&mut self, key: &[u8]) -> Result<bool>;

    /// Every key matching a glob pattern (full keyspace iteration)
    async fn scan_match(&mut self, pattern: &[u8]) -> Result<Vec<Vec<u8>>>;

    /// FLUSHDB of the selected database
    async fn flush_db(&mut self) -> Result<()>;

    /// DBSIZE of the selected database
    async fn db_size(&mut self) -> Result<u64>;

    /// HSET of several fields at once
    async fn hset(&mut self, key: &[u8], fields: &[(Vec<u8>, Vec<u8>)]) -> Result<()>;

    /// HGETALL; empty when the key is absent
    async fn hgetall(&mut self, key: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// HDEL; returns how many fields were removed
    async fn hdel(&mut self, key: &[u8], fields: &[Vec<u8>]) -> Result<u64>;

    /// LPUSH values in order (each lands at the head); returns the new length
    async fn lpush(&mut self, key: &[u8], values: &[Vec<u8>]) -> Result<u64>;

    /// LRANGE with inclusive, possibly negative, bounds
    async fn lrange(&mut self, key: &[u8], start: i64, stop: i64) -> Result<Vec<Vec<u8>>>;
}

/// Opens connections for the pool
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Open a fresh, unauthenticated connection
    async fn connect(&self) -> Result<Box<dyn StoreConnection>>;

    /// Name of the backend, used in logs
    fn name(&self) -> &'static str {
        "unknown"
    }
}

/// Cache capability consumed by the host framework
///
/// Misses are `Ok(None)`. Enumeration (`keys`, `values`, `size`) walks the whole
/// keyspace and is meant for administration, not request paths.
#[async_trait]
pub trait Cache<K, V>: Send + Sync {
    /// Value cached under `key`
    async fn get(&self, key: &K) -> Result<Option<V>>;

    /// Cache `value` under `key`, returning the value it replaced
    async fn put(&self, key: K, value: V) -> Result<Option<V>>;

    /// Remove `key`, returning the value it held
    async fn remove(&self, key: &K) -> Result<Option<V>>;

    /// Remove every entry of this cache
    async fn clear(&self) -> Result<()>;

    /// Number of entries in this cache
    async fn size(&self) -> Result<usize>;

    /// Keys of this cache
    async fn keys(&self) -> Result<Vec<K>>;

    /// Values of this cache
    async fn values(&self) -> Result<Vec<V>>;
}

/// Session persistence capability consumed by the host framework
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persist a session, expiring it after the session's own timeout
    async fn save_session(&self, session: &Session) -> Result<()>;

    /// Delete a session by id
    async fn delete_session(&self, session_id: &str) -> Result<()>;

    /// Load a session by id
    async fn get_session(&self, session_id: &str) -> Result<Option<Session>>;

    /// Every stored session
    async fn get_all_sessions(&self) -> Result<Vec<Session>>;
}
