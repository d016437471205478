//! Bounded LRU+TTL cache (spec.md §4.2). Iteration order of the backing
//! `IndexMap` equals access order with most-recent at the tail, which gives
//! us LRU eviction (pop the front) and insertion-order tie-breaks for free.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use indexmap::IndexMap;

pub const MAX_WORDS_CACHE: usize = 10_000;
pub const MAX_PHRASES_CACHE: usize = 5_000;
pub const CACHE_TTL_MS: u64 = 30 * 60 * 1000;

#[derive(Clone, Debug, Default)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
}

impl CacheMetrics {
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// A single bounded, TTL-expiring LRU cache for one value type.
pub struct LruTtlCache<V: Clone> {
    inner: Mutex<CacheInner<V>>,
}

struct CacheInner<V> {
    map: IndexMap<String, Entry<V>>,
    capacity: usize,
    ttl: Duration,
    hits: u64,
    misses: u64,
}

impl<V: Clone> LruTtlCache<V> {
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                map: IndexMap::new(),
                capacity: capacity.max(1),
                ttl,
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Returns the cached value if present and not expired; touches LRU order.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        let now = Instant::now();
        let expired = match inner.map.get(key) {
            Some(e) => now.duration_since(e.inserted_at) > inner.ttl,
            None => {
                inner.misses += 1;
                return None;
            }
        };
        if expired {
            inner.map.shift_remove(key);
            inner.misses += 1;
            return None;
        }
        // Move to tail (most-recently-used).
        let (_, entry) = inner.map.shift_remove_entry(key).expect("checked above");
        let value = entry.value.clone();
        inner.map.insert(
            key.to_string(),
            Entry {
                value: entry.value,
                inserted_at: entry.inserted_at,
            },
        );
        inner.hits += 1;
        Some(value)
    }

    /// Inserts/replaces a value, evicting the least-recently-used entry if
    /// the cache is at capacity.
    pub fn put(&self, key: impl Into<String>, value: V) {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        let key = key.into();
        inner.map.shift_remove(&key);
        if inner.map.len() >= inner.capacity {
            inner.map.shift_remove_index(0);
        }
        inner.map.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        inner.map.clear();
    }

    /// Removes a single key, e.g. to invalidate a derived cache entry after a write.
    pub fn clear_key(&self, key: &str) {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        inner.map.shift_remove(key);
    }

    /// Sweeps and removes all expired entries; returns the count removed.
    pub fn cleanup_expired(&self) -> usize {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        let now = Instant::now();
        let ttl = inner.ttl;
        let before = inner.map.len();
        inner.map.retain(|_, e| now.duration_since(e.inserted_at) <= ttl);
        before - inner.map.len()
    }

    #[must_use]
    pub fn metrics(&self) -> CacheMetrics {
        let inner = self.inner.lock().expect("cache mutex poisoned");
        CacheMetrics {
            hits: inner.hits,
            misses: inner.misses,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache mutex poisoned").map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Which bounded cache an administrative call (`clear_cache`, metrics
/// aggregation) targets. Repositories each own a typed [`LruTtlCache`]; this
/// enum is just the handle used to address them from the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheKind {
    Words,
    Phrases,
    Rules,
    Generic,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn lru_evicts_oldest_after_capacity_exceeded() {
        let cache: LruTtlCache<u32> = LruTtlCache::new(3, Duration::from_secs(60));
        cache.put("a", 1);
        cache.put("b", 2);
        cache.put("c", 3);
        cache.put("d", 4);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.get("d"), Some(4));
    }

    #[test]
    fn get_touches_lru_order() {
        let cache: LruTtlCache<u32> = LruTtlCache::new(2, Duration::from_secs(60));
        cache.put("a", 1);
        cache.put("b", 2);
        assert_eq!(cache.get("a"), Some(1));
        cache.put("c", 3);
        // "b" was least-recently-used after touching "a", so it is evicted.
        assert!(cache.get("b").is_none());
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("c"), Some(3));
    }

    #[test]
    fn ttl_expires_entries() {
        let cache: LruTtlCache<u32> = LruTtlCache::new(10, Duration::from_millis(20));
        cache.put("a", 1);
        sleep(Duration::from_millis(40));
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn metrics_track_hits_and_misses() {
        let cache: LruTtlCache<u32> = LruTtlCache::new(10, Duration::from_secs(60));
        cache.put("a", 1);
        let _ = cache.get("a");
        let _ = cache.get("missing");
        let m = cache.metrics();
        assert_eq!(m.hits, 1);
        assert_eq!(m.misses, 1);
    }

    #[test]
    fn cleanup_expired_removes_stale_entries_only() {
        let cache: LruTtlCache<u32> = LruTtlCache::new(10, Duration::from_millis(20));
        cache.put("a", 1);
        sleep(Duration::from_millis(40));
        cache.put("b", 2);
        let removed = cache.cleanup_expired();
        assert_eq!(removed, 1);
        assert!(cache.get("b").is_some());
    }
}
