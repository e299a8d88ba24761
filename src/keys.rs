//! Keyspace layout
//!
//! Cache entries, session records and general objects share one store. Cache and
//! session keys carry fixed prefixes so pattern scans of one namespace never
//! return keys of the other. The byte layout below must stay stable: existing
//! stored data is looked up with exactly these keys.
//!
//! ```text
//! cache:    "shiro-cache"   + cache name + ":" + key
//! session:  "shiro-session" + session id
//! ```

use std::fmt::Display;

/// Namespace prefix of cache entries
pub const CACHE_PREFIX: &str = "shiro-cache";

/// Namespace prefix of session records
pub const SESSION_PREFIX: &str = "shiro-session";

/// Key of a cache entry
pub fn cache_key(cache_name: &str, key: &impl Display) -> String {
    format!("{CACHE_PREFIX}{cache_name}:{key}")
}

/// Prefix shared by every entry of one cache (`shiro-cache<name>:`)
#[must_use]
pub fn cache_namespace(cache_name: &str) -> String {
    format!("{CACHE_PREFIX}{cache_name}:")
}

/// Scan pattern matching every entry of one cache
#[must_use]
pub fn cache_pattern(cache_name: &str) -> String {
    format!("{}*", escape_glob(&cache_namespace(cache_name)))
}

/// Key of a session record
pub fn session_key(session_id: &impl Display) -> String {
    format!("{SESSION_PREFIX}{session_id}")
}

/// Scan pattern matching every session record
#[must_use]
pub fn session_pattern() -> String {
    format!("{SESSION_PREFIX}*")
}

/// Escape glob metacharacters so `literal` only matches itself in a scan pattern
#[must_use]
pub fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
