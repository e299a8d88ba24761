//! Cache Adapter
//!
//! Exposes [`KeyValueStore`] to the host framework as named caches. Every entry
//! of cache `name` lives under `"shiro-cache" + name + ":" + key` in the cache
//! database and is written with the configured `cache_ttl`.
//!
//! `put` and `remove` read the previous value before writing, in two
//! round-trips: a concurrent writer between them may make the returned previous
//! value stale. The write itself always lands.

use crate::codecs::JsonCodec;
use crate::error::Result;
use crate::keys;
use crate::store::KeyValueStore;
use crate::traits::{Cache, CacheCodec};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Display;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A named cache backed by the key-value store
///
/// Keys are rendered with `Display` and parsed back with `FromStr` when the
/// cache is enumerated; values go through the store's codec.
pub struct StoreCache<K, V, C: CacheCodec = JsonCodec> {
    name: String,
    store: Arc<KeyValueStore<C>>,
    ttl_secs: u64,
    _entries: PhantomData<fn() -> (K, V)>,
}

impl<K, V, C: CacheCodec> StoreCache<K, V, C> {
    /// Create a cache named `name` writing with the store's `cache_ttl`
    #[must_use]
    pub fn new(name: impl Into<String>, store: Arc<KeyValueStore<C>>) -> Self {
        let ttl_secs = store.config().cache_ttl;
        Self {
            name: name.into(),
            store,
            ttl_secs,
            _entries: PhantomData,
        }
    }

    /// Override the TTL of this cache's writes (0 = never expire)
    #[must_use]
    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Decode a previous value for `put`/`remove`; a corrupt one is reported as absent
    fn previous(&self, key: &str, bytes: Option<Vec<u8>>) -> Option<V>
    where
        V: DeserializeOwned,
    {
        let bytes = bytes?;
        match self.store.codec().deserialize(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(cache = %self.name, key = %key, error = %e, "Previous cache value is undecodable");
                None
            }
        }
    }
}

#[async_trait]
impl<K, V, C> Cache<K, V> for StoreCache<K, V, C>
where
    K: Display + FromStr + Send + Sync + 'static,
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
    C: CacheCodec + 'static,
{
    async fn get(&self, key: &K) -> Result<Option<V>> {
        let store_key = keys::cache_key(&self.name, key);
        match self.store.get(store_key.as_bytes()).await? {
            Some(bytes) => Ok(Some(self.store.codec().deserialize(&bytes)?)),
            None => {
                debug!(cache = %self.name, key = %store_key, "[Cache] Miss");
                Ok(None)
            }
        }
    }

    async fn put(&self, key: K, value: V) -> Result<Option<V>> {
        let store_key = keys::cache_key(&self.name, &key);
        let bytes = self.store.codec().serialize(&value)?;

        let previous = self.store.get(store_key.as_bytes()).await?;
        self.store
            .set_with_ttl(store_key.as_bytes(), &bytes, self.ttl_secs)
            .await?;

        Ok(self.previous(&store_key, previous))
    }

    async fn remove(&self, key: &K) -> Result<Option<V>> {
        let store_key = keys::cache_key(&self.name, key);
        let previous = self.store.get(store_key.as_bytes()).await?;
        if previous.is_some() {
            self.store.delete(store_key.as_bytes()).await?;
        }
        Ok(self.previous(&store_key, previous))
    }

    async fn clear(&self) -> Result<()> {
        let removed = self
            .store
            .delete_by_pattern(&keys::cache_pattern(&self.name))
            .await?;
        info!(cache = %self.name, removed = removed, "Cleared cache");
        Ok(())
    }

    async fn size(&self) -> Result<usize> {
        self.store.size(&keys::cache_pattern(&self.name)).await
    }

    async fn keys(&self) -> Result<Vec<K>> {
        let namespace = keys::cache_namespace(&self.name);
        let raw = self
            .store
            .keys_by_pattern(&keys::cache_pattern(&self.name))
            .await?;

        let mut parsed = Vec::with_capacity(raw.len());
        for store_key in raw {
            let Some(logical) = store_key
                .strip_prefix(namespace.as_bytes())
                .and_then(|k| std::str::from_utf8(k).ok())
            else {
                warn!(cache = %self.name, "Skipping cache key outside the namespace");
                continue;
            };
            match logical.parse::<K>() {
                Ok(key) => parsed.push(key),
                Err(_) => warn!(cache = %self.name, key = %logical, "Skipping unparseable cache key"),
            }
        }
        Ok(parsed)
    }

    async fn values(&self) -> Result<Vec<V>> {
        let entries = self
            .store
            .entries_by_pattern(&keys::cache_pattern(&self.name))
            .await?;

        let mut values = Vec::with_capacity(entries.len());
        for (store_key, bytes) in entries {
            match self.store.codec().deserialize(&bytes) {
                Ok(value) => values.push(value),
                Err(e) => warn!(
                    cache = %self.name,
                    key = %String::from_utf8_lossy(&store_key),
                    error = %e,
                    "Skipping undecodable cache value"
                ),
            }
        }
        Ok(values)
    }
}

/// Hands out named caches sharing one store
///
/// ```rust
/// use redis_security_store::backends::MemoryStore;
/// use redis_security_store::{Cache, KeyValueStore, StoreCacheManager, StoreConfig};
/// use std::sync::Arc;
///
/// # async fn example() -> redis_security_store::Result<()> {
/// let memory = Arc::new(MemoryStore::new());
/// let store = Arc::new(KeyValueStore::new(StoreConfig::default(), Arc::new(memory.factory())));
/// let manager = StoreCacheManager::new(store);
///
/// let roles = manager.get_cache::<String, Vec<String>>("authorizationCache");
/// roles.put("alice".into(), vec!["admin".into()]).await?;
/// # Ok(())
/// # }
/// ```
pub struct StoreCacheManager<C: CacheCodec = JsonCodec> {
    store: Arc<KeyValueStore<C>>,
}

impl<C: CacheCodec> StoreCacheManager<C> {
    #[must_use]
    pub fn new(store: Arc<KeyValueStore<C>>) -> Self {
        Self { store }
    }

    /// Cache named `name`; caches with the same name share entries
    #[must_use]
    pub fn get_cache<K, V>(&self, name: &str) -> StoreCache<K, V, C> {
        debug!(cache = %name, "Creating cache handle");
        StoreCache::new(name, Arc::clone(&self.store))
    }

    #[must_use]
    pub fn store(&self) -> &Arc<KeyValueStore<C>> {
        &self.store
    }

    /// **Destructive**: flush the entire cache database
    ///
    /// Removes every cache's entries and every session record, plus anything
    /// else stored in the same database index. Use [`Cache::clear`] to empty a
    /// single cache.
    ///
    /// # Errors
    ///
    /// Pool or store failures.
    pub async fn destroy(&self) -> Result<()> {
        warn!("Destroying all caches");
        self.store.flush_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryStore;
    use crate::config::StoreConfig;

    fn manager() -> (Arc<MemoryStore>, StoreCacheManager) {
        let memory = Arc::new(MemoryStore::new());
        let store = KeyValueStore::new(StoreConfig::default(), Arc::new(memory.factory()));
        (memory, StoreCacheManager::new(Arc::new(store)))
    }

    #[tokio::test]
    async fn test_entries_use_namespaced_keys() {
        let (memory, manager) = manager();
        let cache = manager.get_cache::<String, String>("authc");
        cache.put("alice".into(), "token".into()).await.unwrap();

        let raw = manager.store().get(b"shiro-cacheauthc:alice").await.unwrap();
        assert_eq!(raw, Some(br#""token""#.to_vec()));
        assert_eq!(memory.len(1), 1);
    }

    #[tokio::test]
    async fn test_default_ttl_comes_from_config() {
        let (_, manager) = manager();
        let cache = manager.get_cache::<u32, u32>("numbers");
        assert_eq!(cache.ttl_secs(), 1800);
        assert_eq!(cache.with_ttl(5).ttl_secs(), 5);
    }

    #[tokio::test]
    async fn test_remove_missing_key_returns_none() {
        let (_, manager) = manager();
        let cache = manager.get_cache::<String, String>("authc");
        assert_eq!(cache.remove(&"nobody".to_string()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unparseable_keys_are_skipped() {
        let (memory, manager) = manager();
        let cache = manager.get_cache::<u64, String>("ids");
        cache.put(7, "seven".into()).await.unwrap();
        memory.insert_raw(1, b"shiro-cacheids:not-a-number", br#""x""#);

        assert_eq!(cache.keys().await.unwrap(), vec![7]);
        assert_eq!(cache.size().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_put_over_corrupt_entry_overwrites_it() {
        let (memory, manager) = manager();
        let cache = manager.get_cache::<String, u32>("counters");
        memory.insert_raw(1, b"shiro-cachecounters:hits", b"{broken");

        assert_eq!(cache.put("hits".into(), 1).await.unwrap(), None);
        assert_eq!(cache.get(&"hits".to_string()).await.unwrap(), Some(1));
    }
}
