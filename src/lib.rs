//! Redis Security Store
//!
//! A Redis-backed cache and session store for security frameworks, replacing
//! in-process caches and session persistence with a shared remote store:
//! - **Key-Value Store**: pooled connections, TTL-aware writes, pattern scans and
//!   typed object, hash and list storage
//! - **Named Caches**: the [`Cache`] capability over namespaced keys
//! - **Session Persistence**: the [`SessionRepository`] capability, with records
//!   expiring together with their sessions
//! - **Bounded Connection Pool**: backpressure with a bounded wait, per-call
//!   deadlines, discard-on-error
//! - **Pluggable Codecs and Backends**: JSON by default, Redis or in-memory
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use redis_security_store::{Cache, Session, SessionRepository, StoreSystem};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Connection settings come from REDIS_* environment variables
//!     let system = StoreSystem::new().await?;
//!
//!     // Named cache: entries expire after `cache_ttl` (30 minutes by default)
//!     let roles = system.cache_manager().get_cache::<String, Vec<String>>("authorizationCache");
//!     roles.put("alice".into(), vec!["admin".into()]).await?;
//!
//!     // Sessions expire with their own timeout
//!     let session = Session::new(30 * 60 * 1000).with_id("abc");
//!     system.session_repository().save_session(&session).await?;
//!
//!     system.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Keyspace
//!
//! ```text
//! cache database (default 1)   shiro-cache<name>:<key>   cache entries
//!                              shiro-session<id>          session records
//! store database (default 0)   <key>                      typed objects, hashes, lists
//! ```
//!
//! # Architecture
//!
//! ```text
//! StoreCache / StoreSessionRepository → KeyValueStore → ConnectionPool → StoreConnection → Redis
//! ```

use std::sync::Arc;
use tracing::info;

pub mod backends;
pub mod builder;
pub mod cache;
pub mod codecs;
pub mod config;
pub mod error;
pub mod keys;
pub mod pool;
pub mod session;
pub mod store;
pub mod traits;

pub use builder::StoreSystemBuilder;
pub use cache::{StoreCache, StoreCacheManager};
pub use codecs::JsonCodec;
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use pool::{ConnectionPool, PoolStats, PooledConnection};
pub use session::{Session, SessionDao, StoreSessionRepository};
pub use store::{KeyValueStore, MAX_TTL_SECS};
pub use traits::{Cache, CacheCodec, ConnectionFactory, SessionRepository, StoreConnection};

// Re-export async_trait for custom backends
pub use async_trait::async_trait;

/// Main entry point: one store shared by the cache manager and the session repository
///
/// # Example
///
/// ```rust,no_run
/// use redis_security_store::{StoreConfig, StoreSystem};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let system = StoreSystem::with_config(StoreConfig::new("cache.internal", 6379)).await?;
///     assert!(system.health_check().await);
///     Ok(())
/// }
/// ```
pub struct StoreSystem<C: CacheCodec = JsonCodec> {
    /// Shared key-value store
    pub store: Arc<KeyValueStore<C>>,
    /// Named caches over `store`
    pub cache_manager: Arc<StoreCacheManager<C>>,
    /// Session records over `store`
    pub session_repository: Arc<StoreSessionRepository<C>>,
}

impl<C: CacheCodec> Clone for StoreSystem<C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cache_manager: Arc::clone(&self.cache_manager),
            session_repository: Arc::clone(&self.session_repository),
        }
    }
}

#[cfg(feature = "redis")]
impl StoreSystem<JsonCodec> {
    /// Create a system from `REDIS_*` environment variables
    ///
    /// # Configuration
    ///
    /// See [`StoreConfig::from_env`]. Default endpoint: `127.0.0.1:6379`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Configuration`] for malformed variables or an invalid
    /// endpoint.
    pub async fn new() -> Result<Self> {
        info!("Initializing Redis Security Store");
        StoreSystemBuilder::new().build().await
    }

    /// Create a system for an explicit configuration
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Configuration`] for an invalid configuration.
    pub async fn with_config(config: StoreConfig) -> Result<Self> {
        info!(host = %config.host, port = config.port, "Initializing Redis Security Store with custom config");
        StoreSystemBuilder::new().with_config(config).build().await
    }
}

impl<C: CacheCodec + 'static> StoreSystem<C> {
    #[must_use]
    pub fn store(&self) -> &Arc<KeyValueStore<C>> {
        &self.store
    }

    #[must_use]
    pub fn cache_manager(&self) -> &Arc<StoreCacheManager<C>> {
        &self.cache_manager
    }

    #[must_use]
    pub fn session_repository(&self) -> &Arc<StoreSessionRepository<C>> {
        &self.session_repository
    }

    /// Session lifecycle over this system's repository
    #[must_use]
    pub fn session_dao(&self) -> SessionDao {
        SessionDao::new(Arc::clone(&self.session_repository) as Arc<dyn SessionRepository>)
    }

    /// Whether the store answers a PING
    pub async fn health_check(&self) -> bool {
        self.store.health_check().await
    }

    /// Close the connection pool; operations afterwards fail with [`StoreError::PoolClosed`]
    pub fn shutdown(&self) {
        info!("Shutting down Redis Security Store");
        self.store.shutdown();
    }
}
