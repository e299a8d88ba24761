//! Common utilities for integration tests
//!
//! This module provides shared test infrastructure including:
//! - In-memory and live Redis store setup
//! - Unique key generation
//! - Test data generators

#![allow(dead_code)]

use redis_security_store::backends::MemoryStore;
use redis_security_store::{KeyValueStore, StoreConfig, StoreSystem, StoreSystemBuilder};
use std::sync::Arc;
use std::time::Duration;

/// Config for the in-memory backend: small pool, short waits
pub fn memory_config() -> StoreConfig {
    StoreConfig::default().with_pool(4, 4, Duration::from_millis(500))
}

/// A fresh in-memory keyspace and a store wired to it
pub fn setup_memory_store() -> (Arc<MemoryStore>, Arc<KeyValueStore>) {
    setup_memory_store_with(memory_config())
}

pub fn setup_memory_store_with(config: StoreConfig) -> (Arc<MemoryStore>, Arc<KeyValueStore>) {
    let memory = Arc::new(MemoryStore::new());
    let store = Arc::new(KeyValueStore::new(config, Arc::new(memory.factory())));
    (memory, store)
}

/// A full system over a fresh in-memory keyspace
pub async fn setup_memory_system() -> (Arc<MemoryStore>, StoreSystem) {
    let memory = Arc::new(MemoryStore::new());
    let system = StoreSystemBuilder::new()
        .with_config(memory_config())
        .with_connection_factory(Arc::new(memory.factory()))
        .build()
        .await
        .expect("Failed to build memory-backed system");
    (memory, system)
}

/// Config for a live Redis, from `REDIS_*` variables
pub fn redis_config() -> StoreConfig {
    StoreConfig::from_env().expect("Invalid REDIS_* environment")
}

/// Create a test key with unique suffix
pub fn test_key(name: &str) -> String {
    format!("test_{}_{}", name, rand::random::<u32>())
}

/// Generate test data of various types
pub mod test_data {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct User {
        pub id: u64,
        pub name: String,
        pub roles: Vec<String>,
    }

    impl User {
        pub fn new(id: u64) -> Self {
            Self {
                id,
                name: format!("User {id}"),
                roles: vec!["user".to_string()],
            }
        }
    }

    /// Generate JSON test data
    pub fn json_principal(id: u64) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "name": format!("user{id}"),
            "authenticated": true
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation() {
        let key1 = test_key("user");
        let key2 = test_key("user");
        assert_ne!(key1, key2, "Keys should be unique");
        assert!(key1.starts_with("test_user_"));
    }
}
