//! Session Adapter
//!
//! Persists host framework sessions in the cache database under
//! `"shiro-session" + id`. A record expires together with its session: the TTL
//! is the session timeout in whole seconds.
//!
//! [`SessionDao`] layers the session lifecycle (id assignment, "unknown session"
//! reporting) over any [`SessionRepository`].

use crate::codecs::JsonCodec;
use crate::error::{Result, StoreError};
use crate::keys;
use crate::store::KeyValueStore;
use crate::traits::{CacheCodec, SessionRepository};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

/// Default session timeout (30 minutes)
pub const DEFAULT_SESSION_TIMEOUT_MS: i64 = 30 * 60 * 1000;

/// A host framework session
///
/// Timestamps are milliseconds since the Unix epoch. Attributes hold arbitrary
/// JSON so sessions stay decodable whatever the host puts in them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Option<String>,
    pub start_timestamp: i64,
    pub stop_timestamp: Option<i64>,
    pub last_access_time: i64,
    /// Idle timeout; zero or negative means the session never times out
    pub timeout_ms: i64,
    pub expired: bool,
    pub host: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl Session {
    /// New session without an id, started now
    #[must_use]
    pub fn new(timeout_ms: i64) -> Self {
        let now = now_millis();
        Self {
            id: None,
            start_timestamp: now,
            stop_timestamp: None,
            last_access_time: now,
            timeout_ms,
            expired: false,
            host: None,
            attributes: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Id, if one is assigned and non-empty
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    /// Record an access now
    pub fn touch(&mut self) {
        self.last_access_time = now_millis();
    }

    /// Stop the session now
    pub fn stop(&mut self) {
        if self.stop_timestamp.is_none() {
            self.stop_timestamp = Some(now_millis());
        }
    }

    /// Not stopped, not marked expired and not idle past its timeout
    #[must_use]
    pub fn is_valid(&self) -> bool {
        if self.stop_timestamp.is_some() || self.expired {
            return false;
        }
        self.timeout_ms <= 0 || now_millis().saturating_sub(self.last_access_time) < self.timeout_ms
    }

    /// Record lifetime in the store: the timeout in whole seconds, 0 for none
    #[must_use]
    pub fn ttl_secs(&self) -> u64 {
        u64::try_from(self.timeout_ms / 1000).unwrap_or(0)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: serde_json::Value) {
        self.attributes.insert(name.into(), value);
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<serde_json::Value> {
        self.attributes.remove(name)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TIMEOUT_MS)
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

/// Session records stored in the key-value store
pub struct StoreSessionRepository<C: CacheCodec = JsonCodec> {
    store: Arc<KeyValueStore<C>>,
}

impl<C: CacheCodec> StoreSessionRepository<C> {
    #[must_use]
    pub fn new(store: Arc<KeyValueStore<C>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<C: CacheCodec + 'static> SessionRepository for StoreSessionRepository<C> {
    async fn save_session(&self, session: &Session) -> Result<()> {
        let Some(id) = session.id() else {
            error!("Refusing to save a session without an id");
            return Err(StoreError::InvalidArgument("session id is missing".into()));
        };

        let key = keys::session_key(&id);
        let bytes = self.store.codec().serialize(session)?;
        let ttl_secs = session.ttl_secs();
        self.store.set_with_ttl(key.as_bytes(), &bytes, ttl_secs).await?;
        debug!(session_id = %id, ttl_secs = ttl_secs, "[Session] Saved");
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        if session_id.is_empty() {
            error!("Cannot delete a session with an empty id");
            return Ok(());
        }
        let existed = self
            .store
            .delete(keys::session_key(&session_id).as_bytes())
            .await?;
        debug!(session_id = %session_id, existed = existed, "[Session] Deleted");
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        if session_id.is_empty() {
            error!("Cannot load a session with an empty id");
            return Ok(None);
        }
        let key = keys::session_key(&session_id);
        self.store
            .get(key.as_bytes())
            .await?
            .map(|bytes| self.store.codec().deserialize(&bytes))
            .transpose()
    }

    async fn get_all_sessions(&self) -> Result<Vec<Session>> {
        let entries = self.store.entries_by_pattern(&keys::session_pattern()).await?;
        let mut sessions = Vec::with_capacity(entries.len());
        for (key, bytes) in entries {
            match self.store.codec().deserialize::<Session>(&bytes) {
                Ok(session) => sessions.push(session),
                Err(e) => warn!(
                    key = %String::from_utf8_lossy(&key),
                    error = %e,
                    "Skipping undecodable session record"
                ),
            }
        }
        Ok(sessions)
    }
}

/// Session lifecycle over a [`SessionRepository`]
///
/// ```rust
/// use redis_security_store::backends::MemoryStore;
/// use redis_security_store::{KeyValueStore, Session, SessionDao, StoreConfig, StoreSessionRepository};
/// use std::sync::Arc;
///
/// # async fn example() -> redis_security_store::Result<()> {
/// let memory = Arc::new(MemoryStore::new());
/// let store = Arc::new(KeyValueStore::new(StoreConfig::default(), Arc::new(memory.factory())));
/// let dao = SessionDao::new(Arc::new(StoreSessionRepository::new(store)));
///
/// let mut session = Session::new(60_000);
/// let id = dao.create(&mut session).await?;
/// assert_eq!(dao.read(&id).await?.id(), Some(id.as_str()));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SessionDao {
    repository: Arc<dyn SessionRepository>,
}

impl SessionDao {
    #[must_use]
    pub fn new(repository: Arc<dyn SessionRepository>) -> Self {
        Self { repository }
    }

    /// Assign a fresh UUID v4 id to `session`, persist it and return the id
    ///
    /// # Errors
    ///
    /// Codec or store failures from saving.
    pub async fn create(&self, session: &mut Session) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        session.id = Some(id.clone());
        self.repository.save_session(session).await?;
        info!(session_id = %id, "Created session");
        Ok(id)
    }

    /// Load a session that must exist
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownSession`] when no record exists for `session_id`
    /// (including an empty id), or codec/store failures.
    pub async fn read(&self, session_id: &str) -> Result<Session> {
        self.repository
            .get_session(session_id)
            .await?
            .ok_or_else(|| StoreError::UnknownSession(session_id.to_string()))
    }

    /// Persist the current state of `session`, refreshing its expiry
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidArgument`] if the session has no id, or codec/store
    /// failures.
    pub async fn update(&self, session: &Session) -> Result<()> {
        self.repository.save_session(session).await
    }

    /// Delete the record of `session`; sessions without an id are ignored
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn delete(&self, session: &Session) -> Result<()> {
        match session.id() {
            Some(id) => self.repository.delete_session(id).await,
            None => {
                error!("Cannot delete a session without an id");
                Ok(())
            }
        }
    }

    /// Every stored session
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn active_sessions(&self) -> Result<Vec<Session>> {
        self.repository.get_all_sessions().await
    }
}
