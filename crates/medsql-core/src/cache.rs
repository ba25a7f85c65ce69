// Bounded LRU caches for query results.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::db::{Database, DbError, QueryResult};
use crate::sql::query_key;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    last_used: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Least-recently-used cache with an optional time-to-live.
pub struct LruCache<K, V> {
    capacity: usize,
    ttl: Option<Duration>,
    entries: HashMap<K, Entry<V>>,
    tick: u64,
    hits: u64,
    misses: u64,
}

impl<K: Eq + Hash + Clone, V: Clone> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self::with_ttl(capacity, None)
    }

    pub fn with_ttl(capacity: usize, ttl: Option<Duration>) -> Self {
        LruCache {
            capacity: capacity.max(1),
            ttl,
            entries: HashMap::new(),
            tick: 0,
            hits: 0,
            misses: 0,
        }
    }

    fn expired(&self, entry: &Entry<V>) -> bool {
        self.ttl
            .is_some_and(|ttl| entry.inserted_at.elapsed() > ttl)
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) => self.expired(entry),
            None => {
                self.misses += 1;
                return None;
            }
        };
        if expired {
            self.entries.remove(key);
            self.misses += 1;
            return None;
        }

        self.tick += 1;
        let tick = self.tick;
        let entry = self.entries.get_mut(key)?;
        entry.last_used = tick;
        self.hits += 1;
        Some(entry.value.clone())
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.tick += 1;
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            if let Some(victim) = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            {
                self.entries.remove(&victim);
            }
        }
        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
                last_used: self.tick,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
        }
    }
}

/// Thread-safe cache of successful query results keyed by normalised SQL.
pub struct QueryResultCache {
    inner: Mutex<LruCache<String, Arc<QueryResult>>>,
}

impl QueryResultCache {
    pub fn new(capacity: usize) -> Self {
        QueryResultCache {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, Arc<QueryResult>>> {
        self.inner.lock().expect("query cache mutex poisoned")
    }

    /// Return the cached result for `sql`, or run it. The flag is true on a
    /// cache hit. Failed queries are not cached.
    pub fn get_or_run(
        &self,
        db: &Database,
        sql: &str,
        max_rows: usize,
    ) -> Result<(Arc<QueryResult>, bool), DbError> {
        let key = format!("{}:{max_rows}", query_key(sql));
        if let Some(hit) = self.lock().get(&key) {
            debug!("Query cache hit {}", &key[..12]);
            return Ok((hit, true));
        }

        let result = Arc::new(db.run_query(sql, max_rows)?);
        self.lock().insert(key, Arc::clone(&result));
        Ok((result, false))
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats()
    }
}
