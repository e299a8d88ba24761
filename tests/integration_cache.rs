//! Integration tests for named caches over the in-memory backend

mod common;

use common::*;
use redis_security_store::{Cache, Session, SessionRepository, StoreError};
use std::time::Duration;

/// `put` returns what it replaced, `get` sees the latest value
#[tokio::test]
async fn test_put_returns_previous() {
    let (_, system) = setup_memory_system().await;
    let cache = system.cache_manager().get_cache::<String, serde_json::Value>("authc");
    let key = test_key("principal");

    let first = test_data::json_principal(1);
    let second = test_data::json_principal(2);

    assert_eq!(cache.put(key.clone(), first.clone()).await.unwrap(), None);
    assert_eq!(cache.put(key.clone(), second.clone()).await.unwrap(), Some(first));
    assert_eq!(cache.get(&key).await.unwrap(), Some(second.clone()));

    assert_eq!(cache.remove(&key).await.unwrap(), Some(second));
    assert_eq!(cache.get(&key).await.unwrap(), None);
}

/// Caches with different names never see each other's entries
#[tokio::test]
async fn test_cache_namespacing() {
    let (_, system) = setup_memory_system().await;
    let manager = system.cache_manager();
    let authc = manager.get_cache::<String, u32>("authc");
    let authz = manager.get_cache::<String, u32>("authz");

    authc.put("k".into(), 1).await.unwrap();
    authz.put("k".into(), 2).await.unwrap();

    assert_eq!(authc.get(&"k".to_string()).await.unwrap(), Some(1));
    assert_eq!(authz.get(&"k".to_string()).await.unwrap(), Some(2));
    assert_eq!(authc.size().await.unwrap(), 1);
}

/// Session records share the cache database but never show up in a cache
#[tokio::test]
async fn test_cache_excludes_session_records() {
    let (memory, system) = setup_memory_system().await;
    let repository = system.session_repository();
    for id in ["s1", "s2"] {
        repository.save_session(&Session::new(60_000).with_id(id)).await.unwrap();
    }
    let cache = system.cache_manager().get_cache::<String, u32>("authc");
    cache.put("alice".into(), 1).await.unwrap();

    assert_eq!(memory.len(1), 3);
    assert_eq!(cache.keys().await.unwrap(), vec!["alice".to_string()]);
    assert_eq!(cache.values().await.unwrap(), vec![1]);
    assert_eq!(cache.size().await.unwrap(), 1);

    cache.clear().await.unwrap();
    assert_eq!(repository.get_all_sessions().await.unwrap().len(), 2);
}

/// Cache names containing glob characters only match themselves
#[tokio::test]
async fn test_glob_characters_in_cache_name() {
    let (_, system) = setup_memory_system().await;
    let manager = system.cache_manager();
    let starred = manager.get_cache::<String, u32>("a*");
    let plain = manager.get_cache::<String, u32>("abc");

    starred.put("k".into(), 1).await.unwrap();
    plain.put("k".into(), 2).await.unwrap();

    assert_eq!(starred.size().await.unwrap(), 1);
    starred.clear().await.unwrap();
    assert_eq!(plain.get(&"k".to_string()).await.unwrap(), Some(2));
}

/// `clear` empties one cache and nothing else
#[tokio::test]
async fn test_clear_is_scoped_to_one_cache() {
    let (_, system) = setup_memory_system().await;
    let manager = system.cache_manager();
    let doomed = manager.get_cache::<u32, String>("doomed");
    let kept = manager.get_cache::<u32, String>("kept");

    for i in 0..4 {
        doomed.put(i, format!("d{i}")).await.unwrap();
    }
    kept.put(1, "k1".into()).await.unwrap();
    system.store().set_object("object", &"store db").await.unwrap();

    doomed.clear().await.unwrap();

    assert_eq!(doomed.size().await.unwrap(), 0);
    assert_eq!(kept.size().await.unwrap(), 1);
    assert_eq!(system.store().get_object::<String>("object").await.unwrap().as_deref(), Some("store db"));
}

/// Enumeration returns parsed keys and decoded values
#[tokio::test]
async fn test_keys_and_values() {
    let (_, system) = setup_memory_system().await;
    let cache = system.cache_manager().get_cache::<u64, test_data::User>("users");

    for id in [3, 1, 2] {
        cache.put(id, test_data::User::new(id)).await.unwrap();
    }

    let mut keys = cache.keys().await.unwrap();
    keys.sort_unstable();
    assert_eq!(keys, vec![1, 2, 3]);

    let mut values = cache.values().await.unwrap();
    values.sort_by_key(|user| user.id);
    assert_eq!(values, vec![test_data::User::new(1), test_data::User::new(2), test_data::User::new(3)]);
}

/// Corrupt entries are skipped by enumeration but reported by `get`
#[tokio::test]
async fn test_corrupt_entries() {
    let (memory, system) = setup_memory_system().await;
    let cache = system.cache_manager().get_cache::<String, u32>("counters");

    cache.put("good".into(), 1).await.unwrap();
    memory.insert_raw(1, b"shiro-cachecounters:bad", b"not json at all");

    assert_eq!(cache.values().await.unwrap(), vec![1]);
    assert_eq!(cache.size().await.unwrap(), 2);
    assert!(matches!(
        cache.get(&"bad".to_string()).await,
        Err(StoreError::Deserialization(_))
    ));
}

/// Cache writes expire after the configured cache TTL
#[tokio::test(start_paused = true)]
async fn test_entries_expire_after_cache_ttl() {
    let (_, system) = setup_memory_system().await;
    let cache = system.cache_manager().get_cache::<String, u32>("short").with_ttl(10);

    cache.put("k".into(), 1).await.unwrap();
    tokio::time::advance(Duration::from_secs(9)).await;
    assert_eq!(cache.get(&"k".to_string()).await.unwrap(), Some(1));
    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(cache.get(&"k".to_string()).await.unwrap(), None);
}

/// `destroy` wipes every cache and every session
#[tokio::test]
async fn test_destroy_flushes_cache_database() {
    let (memory, system) = setup_memory_system().await;
    let manager = system.cache_manager();
    manager.get_cache::<u32, u32>("a").put(1, 1).await.unwrap();
    manager.get_cache::<u32, u32>("b").put(1, 1).await.unwrap();
    assert_eq!(memory.len(1), 2);

    manager.destroy().await.unwrap();
    assert!(memory.is_empty(1));
}

/// Concurrent writers to one key all succeed; the last write wins and the
/// previous values they report may overlap, since read and write are separate
/// round-trips
#[tokio::test]
async fn test_concurrent_puts_race() {
    let (_, system) = setup_memory_system().await;
    let cache = std::sync::Arc::new(system.cache_manager().get_cache::<String, u32>("race"));

    let writers = (0..8u32).map(|i| {
        let cache = cache.clone();
        async move { cache.put("shared".into(), i).await }
    });
    let previous: Vec<Option<u32>> = futures_util::future::join_all(writers)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    let last = cache.get(&"shared".to_string()).await.unwrap();
    assert!(last.is_some_and(|v| v < 8));
    assert!(previous.iter().any(Option::is_none));
    assert_eq!(cache.size().await.unwrap(), 1);
}
