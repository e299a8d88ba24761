//! Connection Pool
//!
//! A bounded set of store connections shared by every caller in the process.
//!
//! - At most `max_active` connections are leased at once; further borrowers wait
//!   up to `max_wait` and then fail with [`StoreError::PoolExhausted`].
//! - Returned connections are kept for reuse, up to `max_idle`.
//! - AUTH and SELECT are reissued on every borrow: a reused connection may still
//!   carry the database chosen by its previous holder.
//! - A lease that is not explicitly [`released`](PooledConnection::release)
//!   (error path, early return, cancelled future) discards its connection. The
//!   slot itself is always returned.

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::traits::{ConnectionFactory, StoreConnection};
use parking_lot::Mutex;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

/// Pool sizing and validation settings
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_active: usize,
    pub max_idle: usize,
    pub max_wait: Duration,
    pub test_on_borrow: bool,
    pub test_on_return: bool,
    /// Sent with AUTH on every borrow; empty disables AUTH
    pub password: String,
    /// Deadline for the AUTH/SELECT/PING round-trips issued by the pool
    pub command_timeout: Option<Duration>,
}

impl PoolSettings {
    #[must_use]
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            max_active: config.max_active,
            max_idle: config.max_idle,
            max_wait: config.max_wait(),
            test_on_borrow: config.test_on_borrow,
            test_on_return: config.test_on_return,
            password: config.password.clone(),
            command_timeout: config.command_timeout(),
        }
    }
}

/// Snapshot of pool usage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub max_active: usize,
    /// Connections currently leased
    pub active: usize,
    /// Connections waiting for reuse
    pub idle: usize,
    /// Connections opened since the pool was created
    pub created: u64,
    /// Connections closed since the pool was created
    pub destroyed: u64,
}

struct PoolInner {
    factory: Arc<dyn ConnectionFactory>,
    settings: PoolSettings,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<Box<dyn StoreConnection>>>,
    created: AtomicU64,
    destroyed: AtomicU64,
}

impl PoolInner {
    fn return_idle(&self, conn: Box<dyn StoreConnection>) {
        let mut idle = self.idle.lock();
        if self.permits.is_closed() || idle.len() >= self.settings.max_idle {
            drop(idle);
            self.discard(conn);
        } else {
            idle.push(conn);
        }
    }

    fn discard(&self, conn: Box<dyn StoreConnection>) {
        drop(conn);
        self.destroyed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Bounded pool of store connections
///
/// Cloning is cheap; clones share the same connections.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Create an empty pool; connections are opened on demand
    #[must_use]
    pub fn new(factory: Arc<dyn ConnectionFactory>, settings: PoolSettings) -> Self {
        info!(
            backend = factory.name(),
            max_active = settings.max_active,
            max_idle = settings.max_idle,
            max_wait_ms = duration_millis(settings.max_wait),
            "Initializing connection pool"
        );
        Self {
            inner: Arc::new(PoolInner {
                permits: Arc::new(Semaphore::new(settings.max_active)),
                idle: Mutex::new(Vec::with_capacity(settings.max_idle)),
                factory,
                settings,
                created: AtomicU64::new(0),
                destroyed: AtomicU64::new(0),
            }),
        }
    }

    /// Lease a connection bound to `database`
    ///
    /// Waits up to `max_wait` for a free slot, then authenticates and selects
    /// the database.
    ///
    /// # Errors
    ///
    /// - [`StoreError::PoolExhausted`] if no slot frees up in time
    /// - [`StoreError::PoolClosed`] after [`close`](Self::close)
    /// - [`StoreError::Unavailable`] / [`StoreError::Timeout`] if connecting,
    ///   AUTH or SELECT fails
    pub async fn borrow(&self, database: u32) -> Result<PooledConnection> {
        let inner = &self.inner;
        let max_wait = inner.settings.max_wait;

        let permit = match tokio::time::timeout(max_wait, Arc::clone(&inner.permits).acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(StoreError::PoolClosed),
            Err(_) => {
                let waited_ms = duration_millis(max_wait);
                warn!(
                    max_active = inner.settings.max_active,
                    waited_ms = waited_ms,
                    "Connection pool exhausted"
                );
                return Err(StoreError::PoolExhausted { waited_ms });
            }
        };

        let conn = self.checkout().await?;
        let mut pooled = PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(inner),
            released: false,
            _permit: permit,
        };

        let deadline = inner.settings.command_timeout;
        if !inner.settings.password.is_empty() {
            with_deadline(deadline, pooled.auth(&inner.settings.password)).await?;
        }
        with_deadline(deadline, pooled.select(database)).await?;
        Ok(pooled)
    }

    /// An idle connection (validated when `test_on_borrow`) or a new one
    async fn checkout(&self) -> Result<Box<dyn StoreConnection>> {
        let inner = &self.inner;
        loop {
            let candidate = inner.idle.lock().pop();
            match candidate {
                Some(mut conn) => {
                    if inner.settings.test_on_borrow {
                        if let Err(e) = with_deadline(inner.settings.command_timeout, conn.ping()).await {
                            debug!(error = %e, "Discarding idle connection that failed validation");
                            inner.discard(conn);
                            continue;
                        }
                    }
                    return Ok(conn);
                }
                None => {
                    let conn = inner.factory.connect().await?;
                    inner.created.fetch_add(1, Ordering::Relaxed);
                    debug!(backend = inner.factory.name(), "Opened new pooled connection");
                    return Ok(conn);
                }
            }
        }
    }

    /// Stop handing out connections and drop the idle ones
    ///
    /// Leases still in flight finish normally; their connections are closed
    /// when returned.
    pub fn close(&self) {
        self.inner.permits.close();
        let drained: Vec<_> = self.inner.idle.lock().drain(..).collect();
        let count = drained.len();
        for conn in drained {
            self.inner.discard(conn);
        }
        info!(closed_idle = count, "Connection pool closed");
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.permits.is_closed()
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let max_active = self.inner.settings.max_active;
        PoolStats {
            max_active,
            active: max_active.saturating_sub(self.inner.permits.available_permits()),
            idle: self.inner.idle.lock().len(),
            created: self.inner.created.load(Ordering::Relaxed),
            destroyed: self.inner.destroyed.load(Ordering::Relaxed),
        }
    }
}

/// A leased connection
///
/// Dereferences to [`StoreConnection`]. Call [`release`](Self::release) once
/// the work succeeded to hand the connection back for reuse; dropping the lease
/// any other way closes the connection.
pub struct PooledConnection {
    /// Always `Some` until drop
    conn: Option<Box<dyn StoreConnection>>,
    pool: Arc<PoolInner>,
    released: bool,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    /// Return the connection to the pool for reuse
    ///
    /// With `test_on_return` the connection is pinged first and closed if the
    /// ping fails.
    pub async fn release(mut self) {
        if self.pool.settings.test_on_return {
            let deadline = self.pool.settings.command_timeout;
            if let Err(e) = with_deadline(deadline, self.ping()).await {
                debug!(error = %e, "Discarding connection that failed return validation");
                return;
            }
        }
        self.released = true;
    }
}

impl Deref for PooledConnection {
    type Target = dyn StoreConnection;

    fn deref(&self) -> &Self::Target {
        match self.conn.as_deref() {
            Some(conn) => conn,
            None => unreachable!("pooled connection used after drop"),
        }
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.conn.as_deref_mut() {
            Some(conn) => conn,
            None => unreachable!("pooled connection used after drop"),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if self.released {
                self.pool.return_idle(conn);
            } else {
                self.pool.discard(conn);
            }
        }
    }
}

/// Run one store round-trip under an optional deadline
pub(crate) async fn with_deadline<T, F>(deadline: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| StoreError::Timeout {
                timeout_ms: duration_millis(limit),
            })?,
        None => fut.await,
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
