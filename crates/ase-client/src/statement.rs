//! Prepared statements and their per-connection cache.
//!
//! ## Lifecycle
//!
//! 1. The first parameterized exec of a query prepares it as a dynamic
//!    statement `dyn<N>` (`create proc dyn<N> as <query>`).
//! 2. The statement is cached by query text; later execs reuse it.
//! 3. When the cache is full, the least recently used statement is
//!    deallocated on the server before the new one is prepared.
//! 4. With caching disabled, the last statement is kept only until the next
//!    prepare, which deallocates it first.

use std::num::NonZeroUsize;

use ase_protocol::DataFormat;
use lru::LruCache;

use crate::error::{Error, Result};

/// A statement prepared on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stmt {
    id: String,
    query: String,
    param_formats: Option<Vec<DataFormat>>,
}

impl Stmt {
    /// Create a statement record.
    pub fn new(
        id: impl Into<String>,
        query: impl Into<String>,
        param_formats: Option<Vec<DataFormat>>,
    ) -> Self {
        Self {
            id: id.into(),
            query: query.into(),
            param_formats,
        }
    }

    /// Server-side statement id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Query text the statement was prepared from.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Parameter formats described by the server, if it sent any.
    #[must_use]
    pub fn param_formats(&self) -> Option<&[DataFormat]> {
        self.param_formats.as_deref()
    }

    /// Number of parameters, if known.
    #[must_use]
    pub fn param_count(&self) -> Option<usize> {
        self.param_formats.as_ref().map(Vec::len)
    }

    /// Check `args` against the known parameter count.
    pub fn check_arity(&self, args: usize) -> Result<()> {
        match self.param_count() {
            Some(expected) if expected != args => Err(Error::Validation(format!(
                "statement {} takes {expected} argument(s), got {args}",
                self.id
            ))),
            _ => Ok(()),
        }
    }
}

/// LRU cache of prepared statements keyed by query text.
pub struct StatementCache {
    cache: Option<LruCache<String, Stmt>>,
    uncached: Option<Stmt>,
    next_id: u64,
    hits: u64,
    misses: u64,
}

impl StatementCache {
    /// Create a cache holding up to `capacity` statements; `0` disables it.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: NonZeroUsize::new(capacity).map(LruCache::new),
            uncached: None,
            next_id: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// Allocate the next statement id.
    pub fn next_id(&mut self) -> String {
        self.next_id += 1;
        format!("dyn{}", self.next_id)
    }

    /// Look up the statement for `query`, updating LRU order.
    pub fn get(&mut self, query: &str) -> Option<Stmt> {
        let found = self.cache.as_mut().and_then(|cache| cache.get(query)).cloned();
        if let Some(stmt) = &found {
            self.hits += 1;
            tracing::trace!(query, id = stmt.id(), "statement cache hit");
        } else {
            self.misses += 1;
            tracing::trace!(query, "statement cache miss");
        }
        found
    }

    /// Free a slot for a new statement.
    ///
    /// Returns the statement the caller must deallocate on the server, if
    /// any: the least recently used one when the cache is full, or the
    /// previous statement when caching is disabled.
    pub fn make_room(&mut self) -> Option<Stmt> {
        match &mut self.cache {
            Some(cache) if cache.len() >= cache.cap().get() => {
                cache.pop_lru().map(|(_, stmt)| stmt)
            }
            Some(_) => None,
            None => self.uncached.take(),
        }
    }

    /// Record a freshly prepared statement.
    ///
    /// Returns a statement displaced without deallocation, which only
    /// happens if [`make_room`](Self::make_room) was skipped.
    pub fn insert(&mut self, stmt: Stmt) -> Option<Stmt> {
        tracing::debug!(query = stmt.query(), id = stmt.id(), "caching prepared statement");
        match &mut self.cache {
            Some(cache) => cache
                .push(stmt.query.clone(), stmt)
                .map(|(_, displaced)| displaced),
            None => self.uncached.replace(stmt),
        }
    }

    /// Remove the statement for `query`.
    pub fn remove(&mut self, query: &str) -> Option<Stmt> {
        match &mut self.cache {
            Some(cache) => cache.pop(query),
            None => self
                .uncached
                .take_if(|stmt| stmt.query() == query),
        }
    }

    /// Remove every statement, returning them for deallocation.
    pub fn clear(&mut self) -> Vec<Stmt> {
        let mut statements = Vec::with_capacity(self.len());
        if let Some(cache) = &mut self.cache {
            while let Some((_, stmt)) = cache.pop_lru() {
                statements.push(stmt);
            }
        }
        statements.extend(self.uncached.take());
        tracing::debug!(count = statements.len(), "cleared statement cache");
        statements
    }

    /// Number of live statements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.as_ref().map_or(0, LruCache::len) + usize::from(self.uncached.is_some())
    }

    /// Check if no statement is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of cached statements; `0` when disabled.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cache.as_ref().map_or(0, |cache| cache.cap().get())
    }

    /// Check if statements are reused across execs.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.cache.is_some()
    }

    /// Number of lookups that found a statement.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Number of lookups that found nothing.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses
    }
}

impl std::fmt::Debug for StatementCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ase_protocol::DataType;

    fn stmt(cache: &mut StatementCache, query: &str) -> Stmt {
        Stmt::new(cache.next_id(), query, None)
    }

    #[test]
    fn test_ids_are_sequential() {
        let mut cache = StatementCache::new(4);
        assert_eq!(cache.next_id(), "dyn1");
        assert_eq!(cache.next_id(), "dyn2");
    }

    #[test]
    fn test_hit_and_miss() {
        let mut cache = StatementCache::new(4);
        assert!(cache.get("select 1").is_none());
        let s = stmt(&mut cache, "select 1");
        assert!(cache.insert(s.clone()).is_none());
        assert_eq!(cache.get("select 1"), Some(s));
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_make_room_evicts_lru() {
        let mut cache = StatementCache::new(2);
        for query in ["a", "b"] {
            assert!(cache.make_room().is_none());
            let s = stmt(&mut cache, query);
            cache.insert(s);
        }
        // touch "a" so "b" becomes least recently used
        cache.get("a");

        let evicted = cache.make_room().unwrap();
        assert_eq!(evicted.query(), "b");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_disabled_keeps_only_last_statement() {
        let mut cache = StatementCache::new(0);
        assert!(!cache.is_enabled());
        assert_eq!(cache.capacity(), 0);

        let first = stmt(&mut cache, "a");
        cache.insert(first.clone());
        assert!(cache.get("a").is_none());
        assert_eq!(cache.len(), 1);

        assert_eq!(cache.make_room(), Some(first));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear_returns_everything() {
        let mut cache = StatementCache::new(3);
        for query in ["a", "b", "c"] {
            let s = stmt(&mut cache, query);
            cache.insert(s);
        }
        let cleared = cache.clear();
        assert_eq!(cleared.len(), 3);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_check_arity() {
        let unknown = Stmt::new("dyn1", "select ?", None);
        assert!(unknown.check_arity(3).is_ok());

        let known = Stmt::new(
            "dyn2",
            "select ?",
            Some(vec![DataFormat::new(DataType::IntN)]),
        );
        assert!(known.check_arity(1).is_ok());
        let err = known.check_arity(2).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
