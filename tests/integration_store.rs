//! Integration tests for the key-value store over the in-memory backend
//!
//! Expiry runs on tokio's clock, so TTL tests pause it and advance time
//! instead of sleeping.

mod common;

use common::*;
use futures_util::future::join_all;
use redis_security_store::{Cache, MAX_TTL_SECS, StoreConfig, StoreError};
use std::collections::HashMap;
use std::time::Duration;

/// Entries written with a TTL disappear once it elapses
#[tokio::test(start_paused = true)]
async fn test_ttl_expiry() {
    let (_, store) = setup_memory_store();
    let key = test_key("ttl");

    store.set_with_ttl(key.as_bytes(), b"v", 1).await.unwrap();
    assert_eq!(store.get(key.as_bytes()).await.unwrap(), Some(b"v".to_vec()));

    tokio::time::advance(Duration::from_millis(2100)).await;
    assert_eq!(store.get(key.as_bytes()).await.unwrap(), None);
    assert!(!store.exists(key.as_bytes()).await.unwrap());
}

/// A TTL of zero means the entry never expires
#[tokio::test(start_paused = true)]
async fn test_zero_ttl_never_expires() {
    let (_, store) = setup_memory_store();
    let key = test_key("forever");

    store.set_with_ttl(key.as_bytes(), b"v", 0).await.unwrap();
    tokio::time::advance(Duration::from_secs(7 * 24 * 3600)).await;
    assert!(store.exists(key.as_bytes()).await.unwrap());
}

/// `set` applies the configured default TTL
#[tokio::test(start_paused = true)]
async fn test_set_applies_default_ttl() {
    let mut config = memory_config();
    config.default_ttl = 5;
    let (_, store) = setup_memory_store_with(config);
    let key = test_key("default_ttl");

    store.set(key.as_bytes(), b"v").await.unwrap();
    tokio::time::advance(Duration::from_secs(4)).await;
    assert!(store.exists(key.as_bytes()).await.unwrap());
    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(!store.exists(key.as_bytes()).await.unwrap());
}

/// `expire` shortens the life of an existing entry
#[tokio::test(start_paused = true)]
async fn test_expire_existing_key() {
    let (_, store) = setup_memory_store();
    let key = test_key("expire");

    store.set_with_ttl(key.as_bytes(), b"v", 0).await.unwrap();
    assert!(store.expire(key.as_bytes(), 3).await.unwrap());
    tokio::time::advance(Duration::from_secs(4)).await;
    assert_eq!(store.get(key.as_bytes()).await.unwrap(), None);
}

/// TTLs the store cannot represent are rejected before reaching it
#[tokio::test]
async fn test_oversized_ttl_rejected() {
    let (_, system) = setup_memory_system().await;
    let store = system.store();
    store.set_with_ttl(b"k", b"v", 0).await.unwrap();

    assert!(matches!(
        store.set_with_ttl(b"k", b"v", u64::MAX).await,
        Err(StoreError::InvalidArgument(_))
    ));
    assert!(matches!(store.expire(b"k", u64::MAX).await, Err(StoreError::InvalidArgument(_))));
    assert!(matches!(
        store.object_expire("k", MAX_TTL_SECS + 1).await,
        Err(StoreError::InvalidArgument(_))
    ));

    let cache = system.cache_manager().get_cache::<String, u32>("forever").with_ttl(u64::MAX);
    assert!(matches!(cache.put("k".into(), 1).await, Err(StoreError::InvalidArgument(_))));

    assert!(store.set_with_ttl(b"k", b"v", MAX_TTL_SECS).await.is_ok());
    assert_eq!(store.get(b"k").await.unwrap(), Some(b"v".to_vec()));
    assert_eq!(store.pool_stats().unwrap().active, 0);
}

/// A pool size beyond what the pool can track fails initialization
#[tokio::test]
async fn test_oversized_pool_rejected_at_startup() {
    let (_, store) = setup_memory_store_with(
        StoreConfig::default().with_pool(usize::MAX, 1, Duration::from_secs(1)),
    );
    assert!(matches!(store.initialize().await, Err(StoreError::Configuration(_))));
}

/// Deleting twice, or deleting a key that never existed, is fine
#[tokio::test]
async fn test_delete_is_idempotent() {
    let (_, store) = setup_memory_store();
    let key = test_key("delete");

    store.set(key.as_bytes(), b"v").await.unwrap();
    assert!(store.delete(key.as_bytes()).await.unwrap());
    assert!(!store.delete(key.as_bytes()).await.unwrap());
    assert!(!store.delete(b"never-written").await.unwrap());
    assert_eq!(store.get(key.as_bytes()).await.unwrap(), None);
}

/// Pattern operations only touch matching keys
#[tokio::test]
async fn test_pattern_operations() {
    let (_, store) = setup_memory_store();

    for i in 0..5 {
        store.set(format!("user:{i}").as_bytes(), b"u").await.unwrap();
    }
    for i in 0..3 {
        store.set(format!("role:{i}").as_bytes(), b"r").await.unwrap();
    }

    let users = store.keys_by_pattern("user:*").await.unwrap();
    assert_eq!(users.len(), 5);
    assert!(users.contains(b"user:3".as_slice()));
    assert_eq!(store.size("role:*").await.unwrap(), 3);
    assert_eq!(store.size("group:*").await.unwrap(), 0);
    assert_eq!(store.db_size().await.unwrap(), 8);

    assert_eq!(store.delete_by_pattern("user:*").await.unwrap(), 5);
    assert_eq!(store.delete_by_pattern("user:*").await.unwrap(), 0);
    assert_eq!(store.db_size().await.unwrap(), 3);
}

/// Loading entries by pattern pairs every key with its value
#[tokio::test]
async fn test_entries_by_pattern() {
    let (_, store) = setup_memory_store();
    store.set(b"a:1", b"one").await.unwrap();
    store.set(b"a:2", b"two").await.unwrap();
    store.set(b"b:1", b"other").await.unwrap();

    let mut entries = store.entries_by_pattern("a:*").await.unwrap();
    entries.sort();
    assert_eq!(
        entries,
        vec![
            (b"a:1".to_vec(), b"one".to_vec()),
            (b"a:2".to_vec(), b"two".to_vec()),
        ]
    );
}

/// Flushing the cache database leaves the store database alone
#[tokio::test]
async fn test_flush_all_is_scoped_to_cache_database() {
    let (memory, store) = setup_memory_store();
    store.set(b"cached", b"v").await.unwrap();
    store.set_object("kept", &1u32).await.unwrap();

    store.flush_all().await.unwrap();

    assert_eq!(store.db_size().await.unwrap(), 0);
    assert!(memory.is_empty(1));
    assert_eq!(store.get_object::<u32>("kept").await.unwrap(), Some(1));
}

/// Typed objects round-trip through the codec
#[tokio::test]
async fn test_typed_object_round_trip() {
    let (_, store) = setup_memory_store();
    let key = test_key("user");
    let user = test_data::User::new(7);

    store.set_object(&key, &user).await.unwrap();
    assert!(store.object_exists(&key).await.unwrap());
    assert_eq!(store.get_object::<test_data::User>(&key).await.unwrap(), Some(user));

    assert!(store.delete_object(&key).await.unwrap());
    assert_eq!(store.get_object::<test_data::User>(&key).await.unwrap(), None);
}

/// Absent and undecodable are different outcomes
#[tokio::test]
async fn test_absent_vs_decode_error() {
    let (memory, store) = setup_memory_store();

    assert_eq!(store.get_object::<test_data::User>("missing").await.unwrap(), None);

    memory.insert_raw(0, b"corrupt", b"\x00\x01 not json");
    let result = store.get_object::<test_data::User>("corrupt").await;
    assert!(matches!(result, Err(StoreError::Deserialization(_))));
}

/// Object expiry runs on the store database
#[tokio::test(start_paused = true)]
async fn test_object_expire() {
    let (_, store) = setup_memory_store();
    store.set_object("token", &"abc").await.unwrap();

    assert!(matches!(store.object_expire("token", 0).await, Err(StoreError::InvalidArgument(_))));
    assert!(store.object_expire("token", 2).await.unwrap());
    tokio::time::advance(Duration::from_secs(3)).await;
    assert!(!store.object_exists("token").await.unwrap());
}

/// Hash fields can be removed without rewriting the hash
#[tokio::test]
async fn test_hash_remove_fields() {
    let (_, store) = setup_memory_store();
    let key = test_key("hash");

    let fields = HashMap::from([("a".to_string(), 1), ("b".to_string(), 2)]);
    store.hash_set(&key, &fields).await.unwrap();

    assert_eq!(store.hash_remove_fields(&key, &["a"]).await.unwrap(), 1);
    assert_eq!(store.hash_remove_fields(&key, &["a", "zzz"]).await.unwrap(), 0);

    let remaining: HashMap<String, i32> = store.hash_get_all(&key).await.unwrap();
    assert_eq!(remaining, HashMap::from([("b".to_string(), 2)]));
}

/// Writing a hash merges into existing fields
#[tokio::test]
async fn test_hash_set_merges() {
    let (_, store) = setup_memory_store();
    let key = test_key("hash_merge");

    store
        .hash_set(&key, &HashMap::from([("a".to_string(), "x".to_string())]))
        .await
        .unwrap();
    store
        .hash_set(&key, &HashMap::from([("b".to_string(), "y".to_string())]))
        .await
        .unwrap();
    store.hash_set::<String>(&key, &HashMap::new()).await.unwrap();

    let all: HashMap<String, String> = store.hash_get_all(&key).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all.get("a").map(String::as_str), Some("x"));

    let missing: HashMap<String, String> = store.hash_get_all("no-such-hash").await.unwrap();
    assert!(missing.is_empty());
}

/// A batch pushed onto the head of a list reads back reversed
#[tokio::test]
async fn test_list_prepend_order() {
    let (_, store) = setup_memory_store();
    let key = test_key("list");

    assert_eq!(store.list_prepend(&key, &["a", "b", "c"]).await.unwrap(), 3);
    assert_eq!(store.list_prepend(&key, &["d"]).await.unwrap(), 4);
    assert_eq!(store.list_prepend::<&str>(&key, &[]).await.unwrap(), 0);

    let items: Vec<String> = store.list_range(&key).await.unwrap();
    assert_eq!(items, vec!["d", "c", "b", "a"]);
}

/// Concurrent callers beyond the pool size wait their turn
#[tokio::test]
async fn test_concurrent_operations_share_bounded_pool() {
    let (memory, store) = setup_memory_store_with(
        StoreConfig::default().with_pool(2, 2, Duration::from_secs(5)),
    );

    let writes = (0..16).map(|i| {
        let store = store.clone();
        async move { store.set(format!("k{i}").as_bytes(), b"v").await }
    });
    for result in join_all(writes).await {
        result.unwrap();
    }

    assert_eq!(store.db_size().await.unwrap(), 16);
    assert!(memory.connections_opened() <= 2);
    let stats = store.pool_stats().unwrap();
    assert_eq!(stats.active, 0);
    assert!(stats.idle <= 2);
}

/// An exhausted pool blocks a caller until a connection comes back
#[tokio::test(start_paused = true)]
async fn test_exhausted_pool_blocks_then_succeeds() {
    let (_, store) = setup_memory_store_with(
        StoreConfig::default().with_pool(1, 1, Duration::from_secs(5)),
    );
    let pool = store.initialize().await.unwrap();
    let held = pool.borrow(1).await.unwrap();

    let waiter = {
        let store = store.clone();
        tokio::spawn(async move { store.set(b"k", b"v").await })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!waiter.is_finished());

    held.release().await;
    waiter.await.unwrap().unwrap();
    assert!(store.exists(b"k").await.unwrap());
}

/// An exhausted pool fails the caller once the wait bound elapses
#[tokio::test(start_paused = true)]
async fn test_exhausted_pool_times_out() {
    let (_, store) = setup_memory_store_with(
        StoreConfig::default().with_pool(1, 1, Duration::from_millis(300)),
    );
    let pool = store.initialize().await.unwrap();
    let _held = pool.borrow(1).await.unwrap();

    let result = store.get(b"k").await;
    assert!(matches!(result, Err(StoreError::PoolExhausted { waited_ms: 300 })));
}

/// An unreachable store surfaces as one uniform error
#[tokio::test]
async fn test_unavailable_store() {
    let (memory, store) = setup_memory_store();
    memory.set_unavailable(true);

    let err = store.get(b"k").await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));
    assert!(err.is_connection_error());
    assert!(!store.health_check().await);

    memory.set_unavailable(false);
    assert!(store.health_check().await);
}

/// Pattern deletion removes the snapshot its scan saw; later writes survive
#[tokio::test]
async fn test_delete_by_pattern_snapshot() {
    let (_, store) = setup_memory_store();
    store.set(b"sess:1", b"a").await.unwrap();
    store.set(b"sess:2", b"b").await.unwrap();

    let (removed, ()) = tokio::join!(
        async { store.delete_by_pattern("sess:*").await.unwrap() },
        async { store.set(b"sess:3", b"c").await.unwrap() },
    );

    assert!((2..=3).contains(&removed));
    let left = store.size("sess:*").await.unwrap();
    assert_eq!(u64::try_from(left).unwrap() + removed, 3);
}
