//! Connection Backend Implementations
//!
//! Backends plug into the pool through the [`ConnectionFactory`](crate::traits::ConnectionFactory)
//! and [`StoreConnection`](crate::traits::StoreConnection) traits.
//!
//! # Available Backends
//!
//! - **Redis** - The remote store over RESP (default, feature: `redis`)
//! - **Memory** - In-process `DashMap` keyspace with the same command semantics,
//!   for tests and single-process deployments
//!
//! # Usage
//!
//! ```rust,no_run
//! use redis_security_store::backends::{MemoryStore, RedisConnectionFactory};
//! use redis_security_store::StoreConfig;
//! use std::sync::Arc;
//!
//! # fn example() -> redis_security_store::Result<()> {
//! let redis = RedisConnectionFactory::new(&StoreConfig::new("127.0.0.1", 6379))?;
//! let memory = Arc::new(MemoryStore::new()).factory();
//! # Ok(())
//! # }
//! ```

pub mod memory;

#[cfg(feature = "redis")]
pub mod redis_connection;

pub use memory::{MemoryConnection, MemoryConnectionFactory, MemoryStore};

#[cfg(feature = "redis")]
pub use redis_connection::{RedisConnection, RedisConnectionFactory};
