//! Parse result caching
//!
//! Bounded LRU cache of parse results, keyed by a SHA-256 of the dialect and
//! the SQL text with whitespace collapsed outside quoted literals and
//! identifiers. Owned by a [`crate::Transpiler`]; there
//! is no process-wide instance.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let cache = ParseCache::new(128);
//!
//! let key = ParseCache::key(DialectConfig::Postgres, sql);
//! if let Some(result) = cache.get(&key) {
//!     return result;
//! }
//! cache.insert(key, result.clone());
//! ```

use crate::result::ParseResult;
use querygraph_core::DialectConfig;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug)]
struct CacheEntry {
    result: ParseResult,

    /// Tick of the last read or write
    last_used: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    tick: u64,
    hits: u64,
    misses: u64,
}

impl CacheState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn evict_least_recent(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| key.clone());

        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

/// Bounded LRU cache of parse results
#[derive(Debug)]
pub struct ParseCache {
    capacity: usize,
    state: Mutex<CacheState>,
}

impl ParseCache {
    /// Create a cache holding at most `capacity` results; 0 disables caching
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Cache key for `sql` parsed with `dialect`
    ///
    /// Whitespace runs outside quotes are collapsed so formatting-only edits
    /// hit the cache; text inside `'...'`, `"..."`, backticks and brackets is
    /// kept verbatim.
    pub fn key(dialect: DialectConfig, sql: &str) -> String {
        let collapsed = collapse_whitespace(sql);

        let mut hasher = Sha256::new();
        hasher.update(dialect.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(collapsed.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Look up a result, marking it most recently used
    pub fn get(&self, key: &str) -> Option<ParseResult> {
        if !self.is_enabled() {
            return None;
        }

        let mut state = self.state.lock().ok()?;
        let tick = state.next_tick();

        let found = state.entries.get_mut(key).map(|entry| {
            entry.last_used = tick;
            entry.result.clone()
        });

        if found.is_some() {
            state.hits += 1;
        } else {
            state.misses += 1;
        }
        found
    }

    /// Store a result, evicting the least recently used entry when full
    pub fn insert(&self, key: String, result: ParseResult) {
        if !self.is_enabled() {
            return;
        }

        if let Ok(mut state) = self.state.lock() {
            if !state.entries.contains_key(&key) && state.entries.len() >= self.capacity {
                state.evict_least_recent();
            }
            let last_used = state.next_tick();
            state.entries.insert(key, CacheEntry { result, last_used });
        }
    }

    /// Clear all entries from the cache
    pub fn clear(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        match self.state.lock() {
            Ok(state) => CacheStats {
                entries: state.entries.len(),
                capacity: self.capacity,
                hits: state.hits,
                misses: state.misses,
            },
            Err(_) => CacheStats {
                capacity: self.capacity,
                ..CacheStats::default()
            },
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Fraction of lookups that were hits
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

/// Collapse whitespace runs to one space, except inside quoted text
fn collapse_whitespace(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut closing: Option<char> = None;
    let mut pending_space = false;

    for c in sql.chars() {
        match closing {
            Some(close) => {
                out.push(c);
                if c == close {
                    closing = None;
                }
            }
            None if c.is_whitespace() => pending_space = !out.is_empty(),
            None => {
                if pending_space {
                    out.push(' ');
                    pending_space = false;
                }
                closing = match c {
                    '\'' | '"' | '`' => Some(c),
                    '[' => Some(']'),
                    _ => None,
                };
                out.push(c);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::StrategyKind;
    use querygraph_core::QueryModel;

    fn result() -> ParseResult {
        ParseResult::parsed(QueryModel::new(), Vec::new(), StrategyKind::Ast)
    }

    #[test]
    fn key_ignores_whitespace_layout() {
        let a = ParseCache::key(DialectConfig::Ansi, "SELECT *\n  FROM users");
        let b = ParseCache::key(DialectConfig::Ansi, "SELECT * FROM   users ");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn key_keeps_whitespace_inside_quotes() {
        let a = ParseCache::key(DialectConfig::Ansi, "SELECT * FROM t WHERE name = 'a  b'");
        let b = ParseCache::key(DialectConfig::Ansi, "SELECT * FROM t WHERE name = 'a b'");
        assert_ne!(a, b);

        let c = ParseCache::key(DialectConfig::Ansi, r#"SELECT "first  name" FROM t"#);
        let d = ParseCache::key(DialectConfig::Ansi, r#"SELECT "first name" FROM t"#);
        assert_ne!(c, d);
    }

    #[test]
    fn collapse_outside_quotes() {
        assert_eq!(
            collapse_whitespace("  SELECT\t'x  y' ,  [a  b]\n FROM t  "),
            "SELECT 'x  y' , [a  b] FROM t"
        );
    }

    #[test]
    fn key_depends_on_dialect() {
        let a = ParseCache::key(DialectConfig::Ansi, "SELECT 1");
        let b = ParseCache::key(DialectConfig::MySql, "SELECT 1");
        assert_ne!(a, b);
    }

    #[test]
    fn insert_and_get() {
        let cache = ParseCache::new(4);
        cache.insert("k1".into(), result());

        assert!(cache.get("k1").is_some());
        assert!(cache.get("k2").is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn least_recently_used_is_evicted() {
        let cache = ParseCache::new(2);
        cache.insert("a".into(), result());
        cache.insert("b".into(), result());

        // Touch "a" so "b" becomes the oldest
        assert!(cache.get("a").is_some());
        cache.insert("c".into(), result());

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn zero_capacity_disables_cache() {
        let cache = ParseCache::new(0);
        cache.insert("a".into(), result());

        assert!(cache.is_empty());
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn clear_removes_entries() {
        let cache = ParseCache::new(2);
        cache.insert("a".into(), result());
        cache.clear();
        assert!(cache.is_empty());
    }
}
