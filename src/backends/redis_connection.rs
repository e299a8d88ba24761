//! Redis Connection - Remote Store Backend
//!
//! Each pooled connection owns its own multiplexed Redis connection, so the
//! database picked with SELECT and the AUTH state stay private to whoever holds
//! the lease.

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::traits::{ConnectionFactory, StoreConnection};
use async_trait::async_trait;
use redis::Client;
use redis::aio::MultiplexedConnection;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// Keys requested per SCAN round-trip
const SCAN_BATCH: usize = 100;

/// Opens Redis connections for the pool
///
/// # Example
///
/// ```rust,no_run
/// use redis_security_store::backends::RedisConnectionFactory;
/// use redis_security_store::{KeyValueStore, StoreConfig};
/// use std::sync::Arc;
///
/// # async fn example() -> redis_security_store::Result<()> {
/// let config = StoreConfig::new("127.0.0.1", 6379).with_password("s3cret");
/// let factory = RedisConnectionFactory::new(&config)?;
/// let store = KeyValueStore::new(config, Arc::new(factory));
/// store.initialize().await?;
/// # Ok(())
/// # }
/// ```
pub struct RedisConnectionFactory {
    client: Client,
    connect_timeout: Duration,
}

impl RedisConnectionFactory {
    /// Create a factory for the endpoint in `config`
    ///
    /// No connection is opened until the pool asks for one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Configuration`] if the endpoint does not form a
    /// valid Redis URL.
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let redis_url = config.redis_url();
        let client = Client::open(redis_url.as_str()).map_err(|e| {
            StoreError::Configuration(format!("invalid Redis endpoint {redis_url}: {e}"))
        })?;
        info!(redis_url = %redis_url, "Redis connection factory ready");
        Ok(Self {
            client,
            connect_timeout: config.connect_timeout(),
        })
    }
}

#[async_trait]
impl ConnectionFactory for RedisConnectionFactory {
    async fn connect(&self) -> Result<Box<dyn StoreConnection>> {
        let conn = tokio::time::timeout(
            self.connect_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| StoreError::Unavailable(format!(
            "connect timed out after {}ms",
            self.connect_timeout.as_millis()
        )))??;
        debug!("[Redis] Opened connection");
        Ok(Box::new(RedisConnection { conn }))
    }

    fn name(&self) -> &'static str {
        "Redis"
    }
}

/// One Redis connection leased through the pool
pub struct RedisConnection {
    conn: MultiplexedConnection,
}

#[async_trait]
impl StoreConnection for RedisConnection {
    async fn auth(&mut self, password: &str) -> Result<()> {
        let () = redis::cmd("AUTH")
            .arg(password)
            .query_async(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn select(&mut self, database: u32) -> Result<()> {
        let () = redis::cmd("SELECT")
            .arg(database)
            .query_async(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn ping(&mut self) -> Result<()> {
        let _: String = redis::cmd("PING").query_async(&mut self.conn).await?;
        Ok(())
    }

    async fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut self.conn)
            .await?;
        Ok(value)
    }

    async fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn set_ex(&mut self, key: &[u8], value: &[u8], seconds: u64) -> Result<()> {
        let () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(seconds)
            .query_async(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn expire(&mut self, key: &[u8], seconds: u64) -> Result<bool> {
        let applied: i64 = redis::cmd("EXPIRE")
            .arg(key)
            .arg(seconds)
            .query_async(&mut self.conn)
            .await?;
        Ok(applied == 1)
    }

    async fn del(&mut self, keys: &[Vec<u8>]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let removed: u64 = redis::cmd("DEL")
            .arg(keys)
            .query_async(&mut self.conn)
            .await?;
        Ok(removed)
    }

    async fn exists(&mut self, key: &[u8]) -> Result<bool> {
        let count: i64 = redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut self.conn)
            .await?;
        Ok(count > 0)
    }

    async fn scan_match(&mut self, pattern: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            // SCAN cursor MATCH pattern COUNT 100
            let (next, batch): (u64, Vec<Vec<u8>>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut self.conn)
                .await?;

            keys.extend(batch);
            cursor = next;

            // Cursor 0 means iteration is complete
            if cursor == 0 {
                break;
            }
        }

        Ok(keys)
    }

    async fn flush_db(&mut self) -> Result<()> {
        let () = redis::cmd("FLUSHDB").query_async(&mut self.conn).await?;
        Ok(())
    }

    async fn db_size(&mut self) -> Result<u64> {
        let size: u64 = redis::cmd("DBSIZE").query_async(&mut self.conn).await?;
        Ok(size)
    }

    async fn hset(&mut self, key: &[u8], fields: &[(Vec<u8>, Vec<u8>)]) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for (field, value) in fields {
            cmd.arg(field).arg(value);
        }
        let _: i64 = cmd.query_async(&mut self.conn).await?;
        Ok(())
    }

    async fn hgetall(&mut self, key: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let fields: HashMap<Vec<u8>, Vec<u8>> = redis::cmd("HGETALL")
            .arg(key)
            .query_async(&mut self.conn)
            .await?;
        Ok(fields.into_iter().collect())
    }

    async fn hdel(&mut self, key: &[u8], fields: &[Vec<u8>]) -> Result<u64> {
        if fields.is_empty() {
            return Ok(0);
        }
        let removed: u64 = redis::cmd("HDEL")
            .arg(key)
            .arg(fields)
            .query_async(&mut self.conn)
            .await?;
        Ok(removed)
    }

    async fn lpush(&mut self, key: &[u8], values: &[Vec<u8>]) -> Result<u64> {
        let len: u64 = redis::cmd("LPUSH")
            .arg(key)
            .arg(values)
            .query_async(&mut self.conn)
            .await?;
        Ok(len)
    }

    async fn lrange(&mut self, key: &[u8], start: i64, stop: i64) -> Result<Vec<Vec<u8>>> {
        let items: Vec<Vec<u8>> = redis::cmd("LRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async(&mut self.conn)
            .await?;
        Ok(items)
    }
}
