//! Store configuration
//!
//! Endpoint, pool sizing and keyspace settings. Loaded once at startup from the
//! environment or a JSON document and treated as immutable afterwards.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default TTL (seconds) applied to cache adapter writes
pub const DEFAULT_CACHE_TTL_SECS: u64 = 1800;

/// Connection and keyspace settings for the store
///
/// # Example
///
/// ```rust
/// use redis_security_store::StoreConfig;
///
/// let config = StoreConfig::from_json(r#"{"host": "10.0.0.5", "port": 6380, "password": "s3cret"}"#)?;
/// assert_eq!(config.cache_database, 1);
/// assert_eq!(config.store_database, 0);
/// # Ok::<(), redis_security_store::StoreError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store hostname or IP address
    pub host: String,
    /// Store TCP port, must be nonzero
    pub port: u16,
    /// Credential sent with AUTH on every borrow; empty disables AUTH
    pub password: String,
    /// Maximum number of connections leased at once
    pub max_active: usize,
    /// Maximum number of idle connections kept for reuse
    pub max_idle: usize,
    /// How long a borrower waits for a free connection (milliseconds)
    pub max_wait_ms: u64,
    /// PING idle connections before handing them out
    pub test_on_borrow: bool,
    /// PING connections when they are returned
    pub test_on_return: bool,
    /// Database index holding cache and session entries
    pub cache_database: u32,
    /// Database index holding general typed objects
    pub store_database: u32,
    /// TTL (seconds) applied by `KeyValueStore::set`, 0 = no expiration
    pub default_ttl: u64,
    /// TTL (seconds) applied by cache adapter writes
    pub cache_ttl: u64,
    /// TCP connect timeout (milliseconds)
    pub connect_timeout_ms: u64,
    /// Per-command deadline (milliseconds), 0 disables it
    pub command_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: String::new(),
            max_active: 8,
            max_idle: 8,
            max_wait_ms: 3000,
            test_on_borrow: false,
            test_on_return: false,
            cache_database: 1,
            store_database: 0,
            default_ttl: 0,
            cache_ttl: DEFAULT_CACHE_TTL_SECS,
            connect_timeout_ms: 2000,
            command_timeout_ms: 5000,
        }
    }
}

impl StoreConfig {
    /// Create a config for `host:port` with default pool settings
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Set the AUTH credential
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set pool sizing
    #[must_use]
    pub fn with_pool(mut self, max_active: usize, max_idle: usize, max_wait: Duration) -> Self {
        self.max_active = max_active;
        self.max_idle = max_idle;
        self.max_wait_ms = duration_millis(max_wait);
        self
    }

    /// Set the cache/session and general-store database indexes
    #[must_use]
    pub fn with_databases(mut self, cache_database: u32, store_database: u32) -> Self {
        self.cache_database = cache_database;
        self.store_database = store_database;
        self
    }

    /// Load configuration from `REDIS_*` environment variables
    ///
    /// Unset variables keep their defaults. A variable that is set but cannot be
    /// parsed is a configuration error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Configuration`] if a variable holds an invalid value.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(host) = std::env::var("REDIS_HOST") {
            config.host = host;
        }
        if let Some(port) = env_parse("REDIS_PORT")? {
            config.port = port;
        }
        if let Ok(password) = std::env::var("REDIS_PASSWORD") {
            config.password = password;
        }
        if let Some(v) = env_parse("REDIS_MAX_ACTIVE")? {
            config.max_active = v;
        }
        if let Some(v) = env_parse("REDIS_MAX_IDLE")? {
            config.max_idle = v;
        }
        if let Some(v) = env_parse("REDIS_MAX_WAIT_MS")? {
            config.max_wait_ms = v;
        }
        if let Some(v) = env_parse("REDIS_TEST_ON_BORROW")? {
            config.test_on_borrow = v;
        }
        if let Some(v) = env_parse("REDIS_TEST_ON_RETURN")? {
            config.test_on_return = v;
        }
        if let Some(v) = env_parse("REDIS_CACHE_DATABASE")? {
            config.cache_database = v;
        }
        if let Some(v) = env_parse("REDIS_STORE_DATABASE")? {
            config.store_database = v;
        }
        if let Some(v) = env_parse("REDIS_DEFAULT_TTL")? {
            config.default_ttl = v;
        }
        if let Some(v) = env_parse("REDIS_CACHE_TTL")? {
            config.cache_ttl = v;
        }
        if let Some(v) = env_parse("REDIS_CONNECT_TIMEOUT_MS")? {
            config.connect_timeout_ms = v;
        }
        if let Some(v) = env_parse("REDIS_COMMAND_TIMEOUT_MS")? {
            config.command_timeout_ms = v;
        }
        Ok(config)
    }

    /// Parse configuration from a JSON document; missing fields take defaults
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Configuration`] if the document is not valid JSON
    /// or a field has the wrong type.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| StoreError::Configuration(format!("invalid config document: {e}")))
    }

    /// Check the settings required to open connections
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Configuration`] when the host is empty, the port is
    /// zero, or the pool size is zero or beyond what the pool can track.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(StoreError::Configuration("store host is not set".into()));
        }
        if self.port == 0 {
            return Err(StoreError::Configuration("store port must be nonzero".into()));
        }
        if self.max_active == 0 {
            return Err(StoreError::Configuration("max_active must be at least 1".into()));
        }
        if self.max_active > tokio::sync::Semaphore::MAX_PERMITS {
            return Err(StoreError::Configuration(format!(
                "max_active must not exceed {}",
                tokio::sync::Semaphore::MAX_PERMITS
            )));
        }
        Ok(())
    }

    /// Borrow wait bound
    #[must_use]
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    /// TCP connect timeout
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Per-command deadline, `None` when disabled
    #[must_use]
    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_timeout_ms > 0).then(|| Duration::from_millis(self.command_timeout_ms))
    }

    /// `redis://` URL of the endpoint (credentials are sent with AUTH instead)
    #[must_use]
    pub fn redis_url(&self) -> String {
        if self.host.contains(':') {
            format!("redis://[{}]:{}/", self.host, self.port)
        } else {
            format!("redis://{}:{}/", self.host, self.port)
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| StoreError::Configuration(format!("{name} has invalid value '{raw}'"))),
        Err(_) => Ok(None),
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
