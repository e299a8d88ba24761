//! Key-Value Store - Pooled Store Operations
//!
//! The central manager every adapter goes through. It owns the connection pool
//! and exposes two families of operations:
//!
//! - **Byte operations** on the cache database (`cache_database`, default 1):
//!   the namespaced cache and session entries live here.
//! - **Typed operations** on the general store database (`store_database`,
//!   default 0): objects, hashes and lists encoded field by field with the codec.
//!
//! Every operation leases a connection, runs its round-trips under the per-call
//! deadline and hands the connection back. On failure the lease is dropped
//! instead, which closes the connection rather than returning it to the pool.
//!
//! # Atomicity
//!
//! Single commands are atomic. Writes with a TTL use one `SET ... EX`. Pattern
//! operations are not: `delete_by_pattern` deletes the snapshot its scan saw, so
//! a key written after the scan survives and a key removed concurrently is
//! simply not counted.

use crate::codecs::JsonCodec;
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::pool::{ConnectionPool, PoolSettings, PoolStats, PooledConnection, with_deadline};
use crate::traits::{CacheCodec, ConnectionFactory};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Longest TTL the store accepts, in seconds (expiry is kept in milliseconds as an `i64`)
pub const MAX_TTL_SECS: u64 = i64::MAX.unsigned_abs() / 1000;

/// Pooled key-value store manager
///
/// Construct it once, share it behind an `Arc`, and call
/// [`shutdown`](Self::shutdown) when the host stops. The pool is created by
/// [`initialize`](Self::initialize), or lazily by the first operation.
///
/// # Example
///
/// ```rust,no_run
/// use redis_security_store::backends::RedisConnectionFactory;
/// use redis_security_store::{KeyValueStore, StoreConfig};
/// use std::sync::Arc;
///
/// # async fn example() -> redis_security_store::Result<()> {
/// let config = StoreConfig::from_env()?;
/// let factory = Arc::new(RedisConnectionFactory::new(&config)?);
/// let store = KeyValueStore::new(config, factory);
/// store.initialize().await?;
///
/// store.set_with_ttl(b"token:42", b"opaque", 60).await?;
/// assert!(store.exists(b"token:42").await?);
///
/// store.set_object("settings", &vec!["a", "b"]).await?;
/// let settings: Option<Vec<String>> = store.get_object("settings").await?;
/// # Ok(())
/// # }
/// ```
pub struct KeyValueStore<C: CacheCodec = JsonCodec> {
    config: StoreConfig,
    factory: Arc<dyn ConnectionFactory>,
    codec: C,
    pool: OnceCell<ConnectionPool>,
}

impl KeyValueStore<JsonCodec> {
    /// Create a store using the JSON codec
    #[must_use]
    pub fn new(config: StoreConfig, factory: Arc<dyn ConnectionFactory>) -> Self {
        Self::with_codec(config, factory, JsonCodec)
    }
}

impl<C: CacheCodec> KeyValueStore<C> {
    /// Create a store with a custom codec
    #[must_use]
    pub fn with_codec(config: StoreConfig, factory: Arc<dyn ConnectionFactory>, codec: C) -> Self {
        Self {
            config,
            factory,
            codec,
            pool: OnceCell::new(),
        }
    }

    /// Create the connection pool; later calls return the same pool
    ///
    /// Safe to call concurrently: exactly one caller builds the pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Configuration`] when the host is unset, the port is
    /// zero or `max_active` is zero.
    pub async fn initialize(&self) -> Result<&ConnectionPool> {
        self.pool
            .get_or_try_init(|| async {
                self.config.validate()?;
                info!(
                    host = %self.config.host,
                    port = self.config.port,
                    cache_database = self.config.cache_database,
                    store_database = self.config.store_database,
                    codec = self.codec.name(),
                    "Initializing key-value store"
                );
                Ok(ConnectionPool::new(
                    Arc::clone(&self.factory),
                    PoolSettings::from_config(&self.config),
                ))
            })
            .await
    }

    /// Close the pool; subsequent operations fail with [`StoreError::PoolClosed`]
    pub fn shutdown(&self) {
        if let Some(pool) = self.pool.get() {
            pool.close();
        }
    }

    /// Whether the store answers a PING on the cache database
    pub async fn health_check(&self) -> bool {
        let result = async {
            let mut conn = self.lease(self.config.cache_database).await?;
            self.call(conn.ping()).await?;
            conn.release().await;
            Ok::<(), StoreError>(())
        }
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Store health check failed");
                false
            }
        }
    }

    /// Pool usage, `None` before initialization
    #[must_use]
    pub fn pool_stats(&self) -> Option<PoolStats> {
        self.pool.get().map(ConnectionPool::stats)
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    #[must_use]
    pub fn codec(&self) -> &C {
        &self.codec
    }

    async fn lease(&self, database: u32) -> Result<PooledConnection> {
        self.initialize().await?.borrow(database).await
    }

    async fn call<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        with_deadline(self.config.command_timeout(), fut).await
    }

    // ===== Cache database: raw bytes =====

    /// Value stored under `key`
    ///
    /// # Errors
    ///
    /// Pool or store failures.
    pub async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut conn = self.lease(self.config.cache_database).await?;
        let value = self.call(conn.get(key)).await?;
        conn.release().await;
        debug!(key = %show(key), hit = value.is_some(), "[Store] GET");
        Ok(value)
    }

    /// Write `value` under `key` with the configured `default_ttl`
    ///
    /// # Errors
    ///
    /// Pool or store failures.
    pub async fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.set_with_ttl(key, value, self.config.default_ttl).await
    }

    /// Write `value` under `key`, expiring after `ttl_secs` (0 = never)
    ///
    /// A nonzero TTL is applied in the same command as the write, so the key
    /// can never be left behind without its expiry.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidArgument`] for a TTL above [`MAX_TTL_SECS`], or
    /// pool/store failures.
    pub async fn set_with_ttl(&self, key: &[u8], value: &[u8], ttl_secs: u64) -> Result<()> {
        check_ttl(ttl_secs)?;
        let mut conn = self.lease(self.config.cache_database).await?;
        if ttl_secs > 0 {
            self.call(conn.set_ex(key, value, ttl_secs)).await?;
        } else {
            self.call(conn.set(key, value)).await?;
        }
        conn.release().await;
        debug!(key = %show(key), ttl_secs = ttl_secs, bytes = value.len(), "[Store] SET");
        Ok(())
    }

    /// Delete `key`; deleting an absent key is not an error
    ///
    /// Returns whether the key existed.
    ///
    /// # Errors
    ///
    /// Pool or store failures.
    pub async fn delete(&self, key: &[u8]) -> Result<bool> {
        let mut conn = self.lease(self.config.cache_database).await?;
        let removed = self.call(conn.del(&[key.to_vec()])).await?;
        conn.release().await;
        debug!(key = %show(key), existed = removed > 0, "[Store] DEL");
        Ok(removed > 0)
    }

    /// Whether `key` exists
    ///
    /// # Errors
    ///
    /// Pool or store failures.
    pub async fn exists(&self, key: &[u8]) -> Result<bool> {
        let mut conn = self.lease(self.config.cache_database).await?;
        let exists = self.call(conn.exists(key)).await?;
        conn.release().await;
        Ok(exists)
    }

    /// Expire `key` after `seconds`; `false` if the key does not exist
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidArgument`] for `seconds == 0`, which some stores
    /// treat as "expire now", or above [`MAX_TTL_SECS`]; otherwise pool or
    /// store failures.
    pub async fn expire(&self, key: &[u8], seconds: u64) -> Result<bool> {
        self.expire_in(self.config.cache_database, key, seconds).await
    }

    /// Every key matching a glob `pattern` (`*`, `?`, `[...]`)
    ///
    /// **Expensive**: iterates the whole database, O(total keys). Meant for
    /// administration and enumeration, never for request hot paths.
    ///
    /// # Errors
    ///
    /// Pool or store failures.
    pub async fn keys_by_pattern(&self, pattern: &str) -> Result<HashSet<Vec<u8>>> {
        let mut conn = self.lease(self.config.cache_database).await?;
        let keys = self.call(conn.scan_match(pattern.as_bytes())).await?;
        conn.release().await;
        let keys: HashSet<Vec<u8>> = keys.into_iter().collect();
        debug!(pattern = %pattern, count = keys.len(), "[Store] Scanned keys matching pattern");
        Ok(keys)
    }

    /// Key/value pairs for every key matching `pattern`
    ///
    /// Same cost as [`keys_by_pattern`](Self::keys_by_pattern) plus one GET per
    /// key. Keys that disappear between the scan and their GET are left out.
    ///
    /// # Errors
    ///
    /// Pool or store failures.
    pub async fn entries_by_pattern(&self, pattern: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut conn = self.lease(self.config.cache_database).await?;
        let mut keys = self.call(conn.scan_match(pattern.as_bytes())).await?;
        keys.sort_unstable();
        keys.dedup();

        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.call(conn.get(&key)).await? {
                entries.push((key, value));
            }
        }
        conn.release().await;
        debug!(pattern = %pattern, count = entries.len(), "[Store] Loaded entries matching pattern");
        Ok(entries)
    }

    /// Delete every key matching `pattern`; returns how many were removed
    ///
    /// Not atomic: see the module documentation.
    ///
    /// # Errors
    ///
    /// Pool or store failures.
    pub async fn delete_by_pattern(&self, pattern: &str) -> Result<u64> {
        let mut conn = self.lease(self.config.cache_database).await?;
        let keys = self.call(conn.scan_match(pattern.as_bytes())).await?;
        let removed = if keys.is_empty() {
            0
        } else {
            self.call(conn.del(&keys)).await?
        };
        conn.release().await;
        debug!(pattern = %pattern, scanned = keys.len(), removed = removed, "[Store] Deleted keys matching pattern");
        Ok(removed)
    }

    /// Number of keys matching `pattern` (one scan)
    ///
    /// # Errors
    ///
    /// Pool or store failures.
    pub async fn size(&self, pattern: &str) -> Result<usize> {
        Ok(self.keys_by_pattern(pattern).await?.len())
    }

    /// Number of keys in the whole cache database
    ///
    /// # Errors
    ///
    /// Pool or store failures.
    pub async fn db_size(&self) -> Result<u64> {
        let mut conn = self.lease(self.config.cache_database).await?;
        let size = self.call(conn.db_size()).await?;
        conn.release().await;
        Ok(size)
    }

    /// **Destructive**: delete every key in the cache database
    ///
    /// This also wipes any unrelated data sharing the database index; give the
    /// store a dedicated `cache_database`.
    ///
    /// # Errors
    ///
    /// Pool or store failures.
    pub async fn flush_all(&self) -> Result<()> {
        let mut conn = self.lease(self.config.cache_database).await?;
        self.call(conn.flush_db()).await?;
        conn.release().await;
        warn!(database = self.config.cache_database, "[Store] Flushed cache database");
        Ok(())
    }

    // ===== Store database: typed objects =====

    /// Encode `value` and store it under `key`
    ///
    /// # Errors
    ///
    /// [`StoreError::Serialization`] if encoding fails, or pool/store failures.
    pub async fn set_object<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = self.codec.serialize(value)?;
        let mut conn = self.lease(self.config.store_database).await?;
        self.call(conn.set(key.as_bytes(), &bytes)).await?;
        conn.release().await;
        debug!(key = %key, bytes = bytes.len(), "[Store] Stored object");
        Ok(())
    }

    /// Load and decode the object stored under `key`
    ///
    /// `Ok(None)` means absent; undecodable bytes are an error, not a miss.
    ///
    /// # Errors
    ///
    /// [`StoreError::Deserialization`] if the bytes do not decode as `T`, or
    /// pool/store failures.
    pub async fn get_object<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.lease(self.config.store_database).await?;
        let bytes = self.call(conn.get(key.as_bytes())).await?;
        conn.release().await;
        bytes.map(|b| self.codec.deserialize(&b)).transpose()
    }

    /// Delete an object; returns whether it existed
    ///
    /// # Errors
    ///
    /// Pool or store failures.
    pub async fn delete_object(&self, key: &str) -> Result<bool> {
        let mut conn = self.lease(self.config.store_database).await?;
        let removed = self.call(conn.del(&[key.as_bytes().to_vec()])).await?;
        conn.release().await;
        Ok(removed > 0)
    }

    /// Whether an object exists
    ///
    /// # Errors
    ///
    /// Pool or store failures.
    pub async fn object_exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.lease(self.config.store_database).await?;
        let exists = self.call(conn.exists(key.as_bytes())).await?;
        conn.release().await;
        Ok(exists)
    }

    /// Expire an object after `seconds`
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidArgument`] for `seconds == 0` or above
    /// [`MAX_TTL_SECS`], or pool/store failures.
    pub async fn object_expire(&self, key: &str, seconds: u64) -> Result<bool> {
        self.expire_in(self.config.store_database, key.as_bytes(), seconds).await
    }

    /// Write every entry of `fields` into the hash at `key`
    ///
    /// Fields already in the hash but absent from `fields` are kept. Each value
    /// is encoded independently.
    ///
    /// # Errors
    ///
    /// [`StoreError::Serialization`] if a value fails to encode (nothing is
    /// written), or pool/store failures.
    pub async fn hash_set<T: Serialize>(&self, key: &str, fields: &HashMap<String, T>) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let encoded = fields
            .iter()
            .map(|(field, value)| -> Result<(Vec<u8>, Vec<u8>)> {
                Ok((field.as_bytes().to_vec(), self.codec.serialize(value)?))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut conn = self.lease(self.config.store_database).await?;
        self.call(conn.hset(key.as_bytes(), &encoded)).await?;
        conn.release().await;
        debug!(key = %key, fields = encoded.len(), "[Store] HSET");
        Ok(())
    }

    /// Every field of the hash at `key`, decoded as `T`
    ///
    /// Fields that fail to decode are skipped and logged.
    ///
    /// # Errors
    ///
    /// Pool or store failures.
    pub async fn hash_get_all<T: DeserializeOwned>(&self, key: &str) -> Result<HashMap<String, T>> {
        let mut conn = self.lease(self.config.store_database).await?;
        let raw = self.call(conn.hgetall(key.as_bytes())).await?;
        conn.release().await;

        let mut fields = HashMap::with_capacity(raw.len());
        for (field, bytes) in raw {
            let Ok(name) = String::from_utf8(field) else {
                warn!(key = %key, "Skipping hash field with non UTF-8 name");
                continue;
            };
            match self.codec.deserialize(&bytes) {
                Ok(value) => {
                    fields.insert(name, value);
                }
                Err(e) => warn!(key = %key, field = %name, error = %e, "Skipping undecodable hash field"),
            }
        }
        Ok(fields)
    }

    /// Remove `fields` from the hash at `key`; returns how many were removed
    ///
    /// # Errors
    ///
    /// Pool or store failures.
    pub async fn hash_remove_fields(&self, key: &str, fields: &[&str]) -> Result<u64> {
        if fields.is_empty() {
            return Ok(0);
        }
        let names: Vec<Vec<u8>> = fields.iter().map(|f| f.as_bytes().to_vec()).collect();
        let mut conn = self.lease(self.config.store_database).await?;
        let removed = self.call(conn.hdel(key.as_bytes(), &names)).await?;
        conn.release().await;
        debug!(key = %key, removed = removed, "[Store] HDEL");
        Ok(removed)
    }

    /// Push each item onto the head of the list at `key`, in slice order
    ///
    /// Every item lands in front of the previous one, so a batch reads back
    /// reversed: pushing `[a, b, c]` yields `[c, b, a, ...]`. Returns the list
    /// length afterwards, or 0 without touching the store when `items` is empty.
    ///
    /// # Errors
    ///
    /// [`StoreError::Serialization`] if an item fails to encode (nothing is
    /// pushed), or pool/store failures.
    pub async fn list_prepend<T: Serialize>(&self, key: &str, items: &[T]) -> Result<u64> {
        if items.is_empty() {
            return Ok(0);
        }
        let encoded = items
            .iter()
            .map(|item| self.codec.serialize(item))
            .collect::<Result<Vec<_>>>()?;

        let mut conn = self.lease(self.config.store_database).await?;
        let len = self.call(conn.lpush(key.as_bytes(), &encoded)).await?;
        conn.release().await;
        debug!(key = %key, pushed = encoded.len(), len = len, "[Store] LPUSH");
        Ok(len)
    }

    /// Every item of the list at `key`, head first
    ///
    /// Items that fail to decode are skipped and logged.
    ///
    /// # Errors
    ///
    /// Pool or store failures.
    pub async fn list_range<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        let mut conn = self.lease(self.config.store_database).await?;
        let raw = self.call(conn.lrange(key.as_bytes(), 0, -1)).await?;
        conn.release().await;

        let mut items = Vec::with_capacity(raw.len());
        for (index, bytes) in raw.iter().enumerate() {
            match self.codec.deserialize(bytes) {
                Ok(item) => items.push(item),
                Err(e) => warn!(key = %key, index = index, error = %e, "Skipping undecodable list item"),
            }
        }
        Ok(items)
    }

    async fn expire_in(&self, database: u32, key: &[u8], seconds: u64) -> Result<bool> {
        if seconds == 0 {
            return Err(StoreError::InvalidArgument(
                "expire requires a positive number of seconds".into(),
            ));
        }
        check_ttl(seconds)?;
        let mut conn = self.lease(database).await?;
        let applied = self.call(conn.expire(key, seconds)).await?;
        conn.release().await;
        Ok(applied)
    }
}

fn check_ttl(seconds: u64) -> Result<()> {
    if seconds > MAX_TTL_SECS {
        return Err(StoreError::InvalidArgument(format!(
            "ttl of {seconds}s exceeds the maximum of {MAX_TTL_SECS}s"
        )));
    }
    Ok(())
}

fn show(key: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(key)
}
