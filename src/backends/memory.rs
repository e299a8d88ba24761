//! Memory Store - In-Process Connection Backend
//!
//! A `DashMap`-backed stand-in for the remote store that speaks the same command
//! set as [`RedisConnection`](super::RedisConnection): numbered databases, string,
//! hash and list values, per-key expiry, glob pattern scans and optional AUTH.
//!
//! Expiry is measured with `tokio::time::Instant`, so tests running on a paused
//! tokio clock can move time forward with `tokio::time::advance`.
//!
//! **When to use**:
//! - Tests and local development without a store server
//! - Single-process deployments that still want the pooled store API
//!
//! **Example**:
//! ```rust
//! use redis_security_store::backends::MemoryStore;
//! use redis_security_store::{KeyValueStore, StoreConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> redis_security_store::Result<()> {
//! let memory = Arc::new(MemoryStore::new());
//! let store = KeyValueStore::new(StoreConfig::default(), Arc::new(memory.factory()));
//!
//! store.set(b"greeting", b"hello").await?;
//! assert_eq!(store.get(b"greeting").await?, Some(b"hello".to_vec()));
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, StoreError};
use crate::traits::{ConnectionFactory, StoreConnection};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Number of databases, matching the store's default
pub const DATABASE_COUNT: usize = 16;

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

#[derive(Debug, Clone)]
enum Value {
    Bytes(Vec<u8>),
    Hash(HashMap<Vec<u8>, Vec<u8>>),
    List(VecDeque<Vec<u8>>),
}

/// Stored value with expiration tracking
#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| Instant::now() >= expires_at)
    }
}

/// Shared in-memory keyspace
///
/// Every connection opened through [`MemoryStore::factory`] sees the same data.
pub struct MemoryStore {
    databases: Vec<DashMap<Vec<u8>, Entry>>,
    password: Option<String>,
    /// Simulated outage: connects and commands fail while set
    unavailable: AtomicBool,
    connections_opened: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store that accepts unauthenticated connections
    #[must_use]
    pub fn new() -> Self {
        info!("Initializing Memory Store ({DATABASE_COUNT} databases)");
        Self {
            databases: (0..DATABASE_COUNT).map(|_| DashMap::new()).collect(),
            password: None,
            unavailable: AtomicBool::new(false),
            connections_opened: AtomicU64::new(0),
        }
    }

    /// Create an empty store that rejects commands until AUTH succeeds
    #[must_use]
    pub fn with_password(password: impl Into<String>) -> Self {
        Self {
            password: Some(password.into()),
            ..Self::new()
        }
    }

    /// Connection factory bound to this store
    #[must_use]
    pub fn factory(self: &Arc<Self>) -> MemoryConnectionFactory {
        MemoryConnectionFactory {
            store: Arc::clone(self),
        }
    }

    /// Simulate losing (or regaining) the store
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of connections opened so far
    #[must_use]
    pub fn connections_opened(&self) -> u64 {
        self.connections_opened.load(Ordering::Relaxed)
    }

    /// Number of live keys in a database
    #[must_use]
    pub fn len(&self, database: u32) -> usize {
        self.database(database).map_or(0, |db| {
            db.iter().filter(|entry| !entry.value().is_expired()).count()
        })
    }

    /// Whether a database holds no live keys
    #[must_use]
    pub fn is_empty(&self, database: u32) -> bool {
        self.len(database) == 0
    }

    /// Overwrite a key with raw bytes, bypassing any codec
    pub fn insert_raw(&self, database: u32, key: &[u8], value: &[u8]) {
        if let Some(db) = self.database(database) {
            db.insert(key.to_vec(), Entry::new(Value::Bytes(value.to_vec())));
        }
    }

    /// Drop expired entries from every database
    pub fn cleanup_expired(&self) -> usize {
        let mut removed = 0;
        for db in &self.databases {
            db.retain(|_, entry| {
                if entry.is_expired() {
                    removed += 1;
                    false
                } else {
                    true
                }
            });
        }
        if removed > 0 {
            debug!(count = removed, "[Memory] Cleaned up expired entries");
        }
        removed
    }

    fn database(&self, index: u32) -> Option<&DashMap<Vec<u8>, Entry>> {
        usize::try_from(index).ok().and_then(|i| self.databases.get(i))
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Factory producing [`MemoryConnection`]s for the pool
#[derive(Clone)]
pub struct MemoryConnectionFactory {
    store: Arc<MemoryStore>,
}

#[async_trait]
impl ConnectionFactory for MemoryConnectionFactory {
    async fn connect(&self) -> Result<Box<dyn StoreConnection>> {
        self.store.check_available()?;
        self.store.connections_opened.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MemoryConnection {
            store: Arc::clone(&self.store),
            database: 0,
            authenticated: self.store.password.is_none(),
        }))
    }

    fn name(&self) -> &'static str {
        "Memory"
    }
}

/// One client session against a [`MemoryStore`]
pub struct MemoryConnection {
    store: Arc<MemoryStore>,
    database: u32,
    authenticated: bool,
}

impl MemoryConnection {
    fn db(&self) -> Result<&DashMap<Vec<u8>, Entry>> {
        self.store.check_available()?;
        if !self.authenticated {
            return Err(StoreError::Unavailable("NOAUTH Authentication required".into()));
        }
        self.store
            .database(self.database)
            .ok_or_else(|| StoreError::Unavailable("ERR DB index is out of range".into()))
    }

    /// Live entry for `key`, evicting it first if it has expired
    fn live<R>(&self, key: &[u8], read: impl FnOnce(&Entry) -> Result<R>) -> Result<Option<R>> {
        let db = self.db()?;
        db.remove_if(key, |_, entry| entry.is_expired());
        match db.get(key) {
            Some(entry) => read(entry.value()).map(Some),
            None => Ok(None),
        }
    }

    /// Mutable live entry for `key`, created with `init` when absent or expired
    fn upsert<R>(
        &self,
        key: &[u8],
        init: impl FnOnce() -> Value,
        write: impl FnOnce(&mut Entry) -> Result<R>,
    ) -> Result<R> {
        let db = self.db()?;
        db.remove_if(key, |_, entry| entry.is_expired());
        let mut entry = db
            .entry(key.to_vec())
            .or_insert_with(|| Entry::new(init()));
        write(entry.value_mut())
    }
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    async fn auth(&mut self, password: &str) -> Result<()> {
        self.store.check_available()?;
        match &self.store.password {
            Some(expected) if expected == password => {
                self.authenticated = true;
                Ok(())
            }
            Some(_) => Err(StoreError::Unavailable(
                "WRONGPASS invalid username-password pair".into(),
            )),
            None => Err(StoreError::Unavailable(
                "ERR AUTH called without any password configured".into(),
            )),
        }
    }

    async fn select(&mut self, database: u32) -> Result<()> {
        self.store.check_available()?;
        if self.store.database(database).is_none() {
            return Err(StoreError::Unavailable("ERR DB index is out of range".into()));
        }
        self.database = database;
        Ok(())
    }

    async fn ping(&mut self) -> Result<()> {
        self.store.check_available()
    }

    async fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.live(key, |entry| match &entry.value {
            Value::Bytes(bytes) => Ok(bytes.clone()),
            _ => Err(StoreError::Unavailable(WRONGTYPE.into())),
        })
    }

    async fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db()?
            .insert(key.to_vec(), Entry::new(Value::Bytes(value.to_vec())));
        Ok(())
    }

    async fn set_ex(&mut self, key: &[u8], value: &[u8], seconds: u64) -> Result<()> {
        if seconds == 0 {
            return Err(StoreError::Unavailable(
                "ERR invalid expire time in 'set' command".into(),
            ));
        }
        let entry = Entry {
            value: Value::Bytes(value.to_vec()),
            expires_at: Some(deadline(seconds, "set")?),
        };
        self.db()?.insert(key.to_vec(), entry);
        Ok(())
    }

    async fn expire(&mut self, key: &[u8], seconds: u64) -> Result<bool> {
        let expires_at = deadline(seconds, "expire")?;
        let db = self.db()?;
        db.remove_if(key, |_, entry| entry.is_expired());
        Ok(match db.get_mut(key) {
            Some(mut entry) => {
                entry.expires_at = Some(expires_at);
                true
            }
            None => false,
        })
    }

    async fn del(&mut self, keys: &[Vec<u8>]) -> Result<u64> {
        let db = self.db()?;
        let mut removed = 0;
        for key in keys {
            if let Some((_, entry)) = db.remove(key) {
                if !entry.is_expired() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn exists(&mut self, key: &[u8]) -> Result<bool> {
        Ok(self.live(key, |_| Ok(()))?.is_some())
    }

    async fn scan_match(&mut self, pattern: &[u8]) -> Result<Vec<Vec<u8>>> {
        let db = self.db()?;
        db.retain(|_, entry| !entry.is_expired());
        let Some(matcher) = compile_match(pattern) else {
            return Ok(Vec::new());
        };
        Ok(db
            .iter()
            .filter(|entry| matcher.matches(&String::from_utf8_lossy(entry.key())))
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn flush_db(&mut self) -> Result<()> {
        self.db()?.clear();
        Ok(())
    }

    async fn db_size(&mut self) -> Result<u64> {
        let db = self.db()?;
        db.retain(|_, entry| !entry.is_expired());
        Ok(db.len() as u64)
    }

    async fn hset(&mut self, key: &[u8], fields: &[(Vec<u8>, Vec<u8>)]) -> Result<()> {
        self.upsert(
            key,
            || Value::Hash(HashMap::new()),
            |entry| match &mut entry.value {
                Value::Hash(hash) => {
                    for (field, value) in fields {
                        hash.insert(field.clone(), value.clone());
                    }
                    Ok(())
                }
                _ => Err(StoreError::Unavailable(WRONGTYPE.into())),
            },
        )
    }

    async fn hgetall(&mut self, key: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let fields = self.live(key, |entry| match &entry.value {
            Value::Hash(hash) => Ok(hash
                .iter()
                .map(|(field, value)| (field.clone(), value.clone()))
                .collect()),
            _ => Err(StoreError::Unavailable(WRONGTYPE.into())),
        })?;
        Ok(fields.unwrap_or_default())
    }

    async fn hdel(&mut self, key: &[u8], fields: &[Vec<u8>]) -> Result<u64> {
        let db = self.db()?;
        db.remove_if(key, |_, entry| entry.is_expired());
        let (removed, now_empty) = match db.get_mut(key) {
            Some(mut entry) => match &mut entry.value {
                Value::Hash(hash) => {
                    let removed = fields
                        .iter()
                        .filter(|field| hash.remove(*field).is_some())
                        .count() as u64;
                    (removed, hash.is_empty())
                }
                _ => return Err(StoreError::Unavailable(WRONGTYPE.into())),
            },
            None => (0, false),
        };
        // Empty hashes cease to exist
        if now_empty {
            db.remove(key);
        }
        Ok(removed)
    }

    async fn lpush(&mut self, key: &[u8], values: &[Vec<u8>]) -> Result<u64> {
        self.upsert(
            key,
            || Value::List(VecDeque::new()),
            |entry| match &mut entry.value {
                Value::List(list) => {
                    for value in values {
                        list.push_front(value.clone());
                    }
                    Ok(list.len() as u64)
                }
                _ => Err(StoreError::Unavailable(WRONGTYPE.into())),
            },
        )
    }

    async fn lrange(&mut self, key: &[u8], start: i64, stop: i64) -> Result<Vec<Vec<u8>>> {
        let items = self.live(key, |entry| match &entry.value {
            Value::List(list) => Ok(list_slice(list, start, stop)),
            _ => Err(StoreError::Unavailable(WRONGTYPE.into())),
        })?;
        Ok(items.unwrap_or_default())
    }
}

fn deadline(seconds: u64, command: &str) -> Result<Instant> {
    Instant::now()
        .checked_add(Duration::from_secs(seconds))
        .ok_or_else(|| StoreError::Unavailable(format!("ERR invalid expire time in '{command}' command")))
}

/// Inclusive LRANGE window with negative indexes counted from the tail
fn list_slice(list: &VecDeque<Vec<u8>>, start: i64, stop: i64) -> Vec<Vec<u8>> {
    let len = i64::try_from(list.len()).unwrap_or(i64::MAX);
    let start = if start < 0 { (start + len).max(0) } else { start };
    let stop = if stop < 0 { stop + len } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return Vec::new();
    }
    let skip = usize::try_from(start).unwrap_or(usize::MAX);
    let take = usize::try_from(stop - start + 1).unwrap_or(0);
    list.iter().skip(skip).take(take).cloned().collect()
}

/// Compile a store MATCH pattern (`*`, `?`, `[abc]`, `[^a-z]`, `\x`) into a
/// [`glob::Pattern`]
///
/// Escapes become bracketed literals and `^` negation becomes `!`. Returns
/// `None` for patterns that match nothing, such as an empty class.
pub(crate) fn compile_match(pattern: &[u8]) -> Option<glob::Pattern> {
    let source = String::from_utf8_lossy(pattern);
    let mut chars = source.chars();
    let mut translated = String::with_capacity(source.len());
    while let Some(c) = chars.next() {
        match c {
            // a run of stars is one star; glob reserves `**` for path recursion
            '*' if translated.ends_with('*') => {}
            '*' | '?' => translated.push(c),
            '\\' => push_literal(&mut translated, chars.next().unwrap_or('\\')),
            '[' => push_class(&mut translated, &mut chars)?,
            c => push_literal(&mut translated, c),
        }
    }
    glob::Pattern::new(&translated)
        .map_err(|e| debug!(pattern = %source, error = %e, "Unsupported scan pattern"))
        .ok()
}

fn push_literal(out: &mut String, c: char) {
    out.push_str(&glob::Pattern::escape(c.encode_utf8(&mut [0; 4])));
}

/// Translate one `[...]` class; the opening bracket is already consumed
fn push_class(out: &mut String, chars: &mut std::str::Chars<'_>) -> Option<()> {
    let mut negate = false;
    let mut members: Vec<(char, char)> = Vec::new();
    let mut first = true;
    while let Some(c) = chars.next() {
        match c {
            '^' if first => negate = true,
            ']' => break,
            '\\' => {
                let escaped = chars.next().unwrap_or('\\');
                members.push((escaped, escaped));
            }
            lo => {
                let mut ahead = chars.clone();
                match (ahead.next(), ahead.next()) {
                    (Some('-'), Some(hi)) if hi != ']' => {
                        *chars = ahead;
                        members.push(if lo <= hi { (lo, hi) } else { (hi, lo) });
                    }
                    _ => members.push((lo, lo)),
                }
            }
        }
        first = false;
    }

    match (negate, members.as_slice()) {
        (false, []) => return None,
        (true, []) => out.push('?'),
        (false, [(lo, hi)]) if lo == hi => push_literal(out, *lo),
        _ => {
            // `]` must open the set and `-` must close it; a leading `!` would negate
            members.sort_by_key(|&(lo, hi)| match (lo, hi) {
                (']', ']') => 0,
                ('!', '!') => 2,
                ('-', '-') => 3,
                _ => 1,
            });
            if !negate && members.first().is_some_and(|&(lo, _)| lo == '!') {
                members.rotate_left(1);
            }
            out.push('[');
            if negate {
                out.push('!');
            }
            for (lo, hi) in members {
                out.push(lo);
                if lo != hi {
                    out.push('-');
                    out.push(hi);
                }
            }
            out.push(']');
        }
    }
    Some(())
}
