//! Store System Builder
//!
//! Provides a builder for constructing a [`StoreSystem`] with a custom
//! configuration, connection backend or codec.
//!
//! # Example: Using Defaults
//!
//! ```rust,no_run
//! use redis_security_store::StoreSystemBuilder;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Configuration from REDIS_* environment variables, Redis backend, JSON codec
//!     let system = StoreSystemBuilder::new().build().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Example: In-Memory Backend
//!
//! ```rust
//! use redis_security_store::backends::MemoryStore;
//! use redis_security_store::{StoreConfig, StoreSystemBuilder};
//! use std::sync::Arc;
//!
//! # async fn example() -> redis_security_store::Result<()> {
//! let memory = Arc::new(MemoryStore::new());
//! let system = StoreSystemBuilder::new()
//!     .with_config(StoreConfig::default())
//!     .with_connection_factory(Arc::new(memory.factory()))
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::codecs::JsonCodec;
use crate::config::StoreConfig;
use crate::error::Result;
use crate::store::KeyValueStore;
use crate::traits::{CacheCodec, ConnectionFactory};
use crate::{StoreCacheManager, StoreSessionRepository, StoreSystem};
use std::sync::Arc;
use tracing::info;

/// Builder for constructing a [`StoreSystem`]
///
/// # Default Behavior
///
/// Anything not configured explicitly falls back to:
/// - **Config**: [`StoreConfig::from_env`]
/// - **Backend**: Redis at the configured endpoint (feature `redis`)
/// - **Codec**: [`JsonCodec`]
pub struct StoreSystemBuilder<C: CacheCodec = JsonCodec> {
    config: Option<StoreConfig>,
    factory: Option<Arc<dyn ConnectionFactory>>,
    codec: C,
}

impl StoreSystemBuilder<JsonCodec> {
    /// Create a builder with nothing configured
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: None,
            factory: None,
            codec: JsonCodec,
        }
    }
}

impl Default for StoreSystemBuilder<JsonCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: CacheCodec + 'static> StoreSystemBuilder<C> {
    /// Use `config` instead of reading the environment
    #[must_use]
    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use a custom connection backend
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let system = StoreSystemBuilder::new()
    ///     .with_connection_factory(Arc::new(MyFactory::new()))
    ///     .build()
    ///     .await?;
    /// ```
    #[must_use]
    pub fn with_connection_factory(mut self, factory: Arc<dyn ConnectionFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Use a different codec for every stored value
    ///
    /// Values written with one codec cannot be read back with another.
    #[must_use]
    pub fn with_codec<C2: CacheCodec + 'static>(self, codec: C2) -> StoreSystemBuilder<C2> {
        StoreSystemBuilder {
            config: self.config,
            factory: self.factory,
            codec,
        }
    }

    /// Build the system and create its connection pool
    ///
    /// No connection is opened until the first operation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Configuration`](crate::StoreError::Configuration) if
    /// the configuration is invalid, cannot be read from the environment, or no
    /// backend is available.
    pub async fn build(self) -> Result<StoreSystem<C>> {
        let config = match self.config {
            Some(config) => config,
            None => StoreConfig::from_env()?,
        };
        let factory = match self.factory {
            Some(factory) => factory,
            None => default_factory(&config)?,
        };

        info!(
            backend = factory.name(),
            codec = self.codec.name(),
            "Building store system"
        );

        let store = Arc::new(KeyValueStore::with_codec(config, factory, self.codec));
        store.initialize().await?;

        Ok(StoreSystem {
            cache_manager: Arc::new(StoreCacheManager::new(Arc::clone(&store))),
            session_repository: Arc::new(StoreSessionRepository::new(Arc::clone(&store))),
            store,
        })
    }
}

#[cfg(feature = "redis")]
fn default_factory(config: &StoreConfig) -> Result<Arc<dyn ConnectionFactory>> {
    Ok(Arc::new(crate::backends::RedisConnectionFactory::new(config)?))
}

#[cfg(not(feature = "redis"))]
fn default_factory(_config: &StoreConfig) -> Result<Arc<dyn ConnectionFactory>> {
    Err(crate::StoreError::Configuration(
        "no connection factory configured and the `redis` feature is disabled".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryStore;
    use crate::error::StoreError;

    #[tokio::test]
    async fn test_build_with_memory_backend() {
        let memory = Arc::new(MemoryStore::new());
        let system = StoreSystemBuilder::new()
            .with_config(StoreConfig::default())
            .with_connection_factory(Arc::new(memory.factory()))
            .build()
            .await
            .unwrap();

        assert!(system.health_check().await);
        assert_eq!(memory.connections_opened(), 1);
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_config() {
        let memory = Arc::new(MemoryStore::new());
        let result = StoreSystemBuilder::new()
            .with_config(StoreConfig::default().with_pool(0, 0, std::time::Duration::ZERO))
            .with_connection_factory(Arc::new(memory.factory()))
            .build()
            .await;

        assert!(matches!(result, Err(StoreError::Configuration(_))));
        assert_eq!(memory.connections_opened(), 0);
    }
}
