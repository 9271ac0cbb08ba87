//! Result cache for unified search.
//!
//! TTL'd entries keyed by the normalized-parameter hash. Eviction is
//! deliberately cheap: an opportunistic expired-entry sweep once the map
//! passes 80% of capacity, then a 10% random-order eviction when an insert
//! would exceed capacity. A background sweeper drops expired entries every
//! minute regardless of traffic.

use super::SearchResponse;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Default entry TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Default capacity.
pub const DEFAULT_CAPACITY: usize = 200;

/// Background sweep interval.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct CacheEntry {
    response: Arc<SearchResponse>,
    expires_at: Instant,
}

/// TTL + capacity bounded cache of search responses.
pub struct SearchCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
    capacity: usize,
}

impl SearchCache {
    /// Creates a cache with the given TTL and capacity.
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Fetches a live entry.
    pub fn get(&self, key: &str) -> Option<Arc<SearchResponse>> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(Arc::clone(&entry.response))
    }

    /// Inserts a response under the key.
    pub fn put(&self, key: String, response: Arc<SearchResponse>) {
        let Ok(mut entries) = self.entries.write() else {
            return;
        };
        let now = Instant::now();

        // Opportunistic sweep once the map is mostly full.
        if entries.len() >= self.capacity * 8 / 10 {
            entries.retain(|_, entry| entry.expires_at > now);
        }
        // Still at capacity: shed 10% in map iteration order.
        if entries.len() >= self.capacity {
            let to_evict = (self.capacity / 10).max(1);
            let victims: Vec<String> = entries.keys().take(to_evict).cloned().collect();
            for key in victims {
                entries.remove(&key);
            }
        }

        entries.insert(
            key,
            CacheEntry {
                response,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Drops every expired entry. Called by the background sweeper.
    pub fn sweep_expired(&self) {
        if let Ok(mut entries) = self.entries.write() {
            let now = Instant::now();
            entries.retain(|_, entry| entry.expires_at > now);
        }
    }

    /// Live entry count (expired entries may linger until a sweep).
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry TTL.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl Default for SearchCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchMode;

    fn response() -> Arc<SearchResponse> {
        Arc::new(SearchResponse {
            results: Vec::new(),
            total: 0,
            mode: SearchMode::FilterOnly,
            query: String::new(),
        })
    }

    #[test]
    fn test_put_get_roundtrip() {
        let cache = SearchCache::default();
        cache.put("k1".into(), response());
        assert!(cache.get("k1").is_some());
        assert!(cache.get("k2").is_none());
    }

    #[test]
    fn test_expired_entries_are_invisible() {
        let cache = SearchCache::new(Duration::from_millis(1), 10);
        cache.put("k1".into(), response());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("k1").is_none());
        // Still physically present until a sweep.
        assert_eq!(cache.len(), 1);
        cache.sweep_expired();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_eviction_keeps_bound() {
        let cache = SearchCache::new(Duration::from_secs(60), 10);
        for i in 0..50 {
            cache.put(format!("k{i}"), response());
        }
        assert!(cache.len() <= 10);
    }
}
