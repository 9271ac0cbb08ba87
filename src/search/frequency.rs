//! Query-frequency tracking for cache warming.
//!
//! Every cache insert records its key and parameters here. The warming
//! loop asks for the hottest recently-used-but-uncached candidates and
//! re-executes them before their TTL lapses for a real caller.

use super::params::SearchParams;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Tracked queries kept before LRU shedding.
pub const TRACKER_CAPACITY: usize = 1000;

/// Entries shed per overflow.
const OVERFLOW_SHED: usize = 100;

/// Warm candidates returned per scan.
pub const WARM_CANDIDATES: usize = 5;

/// Only queries used within this window are warm candidates.
const CANDIDATE_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Entries untouched this long are pruned outright.
pub const ENTRY_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
struct FreqEntry {
    params: SearchParams,
    count: u64,
    last_used: Instant,
    last_cached: Instant,
}

/// One candidate the warmer should refresh.
#[derive(Debug, Clone)]
pub struct WarmCandidate {
    /// Cache key.
    pub key: String,
    /// Parameters to re-execute.
    pub params: SearchParams,
    /// Priority score: `count × max(0.1, 1 − age_minutes/60)`.
    pub score: f64,
}

/// Frequency tracker behind a read/write lock.
///
/// Write paths keep the critical section minimal: overflow victims are
/// sorted outside the lock from a snapshot.
pub struct QueryFrequencyTracker {
    entries: RwLock<HashMap<String, FreqEntry>>,
    capacity: usize,
}

impl QueryFrequencyTracker {
    /// Creates a tracker with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Records one cache insert for the key.
    pub fn record(&self, key: &str, params: &SearchParams) {
        let now = Instant::now();
        {
            let Ok(mut entries) = self.entries.write() else {
                return;
            };
            entries
                .entry(key.to_string())
                .and_modify(|entry| {
                    entry.count += 1;
                    entry.last_used = now;
                    entry.last_cached = now;
                })
                .or_insert_with(|| FreqEntry {
                    params: params.clone(),
                    count: 1,
                    last_used: now,
                    last_cached: now,
                });
        }
        self.shed_overflow();
    }

    fn shed_overflow(&self) {
        let snapshot: Vec<(String, Instant)> = {
            let Ok(entries) = self.entries.read() else {
                return;
            };
            if entries.len() <= self.capacity {
                return;
            }
            entries
                .iter()
                .map(|(key, entry)| (key.clone(), entry.last_used))
                .collect()
        };
        // Sort outside the lock; take the least-recently-used block.
        let mut snapshot = snapshot;
        snapshot.sort_by_key(|(_, last_used)| *last_used);
        let victims: Vec<String> = snapshot
            .into_iter()
            .take(OVERFLOW_SHED)
            .map(|(key, _)| key)
            .collect();
        if let Ok(mut entries) = self.entries.write() {
            for key in victims {
                entries.remove(&key);
            }
        }
    }

    /// Marks a key as freshly cached (warming succeeded).
    pub fn mark_cached(&self, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            if let Some(entry) = entries.get_mut(key) {
                entry.last_cached = Instant::now();
            }
        }
    }

    /// Top candidates used within the last hour and not cached within
    /// `ttl / 2`, scored `count × max(0.1, 1 − age_minutes/60)`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn warm_candidates(&self, cache_ttl: Duration) -> Vec<WarmCandidate> {
        let now = Instant::now();
        let stale_cached = cache_ttl / 2;
        let snapshot: Vec<WarmCandidate> = {
            let Ok(entries) = self.entries.read() else {
                return Vec::new();
            };
            entries
                .iter()
                .filter(|(_, entry)| {
                    now.duration_since(entry.last_used) <= CANDIDATE_WINDOW
                        && now.duration_since(entry.last_cached) >= stale_cached
                })
                .map(|(key, entry)| {
                    let age_minutes = now.duration_since(entry.last_used).as_secs_f64() / 60.0;
                    WarmCandidate {
                        key: key.clone(),
                        params: entry.params.clone(),
                        score: entry.count as f64 * (1.0 - age_minutes / 60.0).max(0.1),
                    }
                })
                .collect()
        };
        let mut candidates = snapshot;
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(WARM_CANDIDATES);
        candidates
    }

    /// Drops entries unused for [`ENTRY_MAX_AGE`].
    pub fn prune_stale(&self) {
        let now = Instant::now();
        if let Ok(mut entries) = self.entries.write() {
            entries.retain(|_, entry| now.duration_since(entry.last_used) < ENTRY_MAX_AGE);
        }
    }

    /// Tracked entry count.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Returns true if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys with their hit counts, highest first; for the
    /// pattern-analysis tool.
    #[must_use]
    pub fn top_queries(&self, n: usize) -> Vec<(String, u64)> {
        let mut queries: Vec<(String, u64)> = match self.entries.read() {
            Ok(entries) => entries
                .iter()
                .map(|(key, entry)| {
                    let query = if entry.params.query.is_empty() {
                        format!("<filter:{key}>")
                    } else {
                        entry.params.query.clone()
                    };
                    (query, entry.count)
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        queries.sort_by(|a, b| b.1.cmp(&a.1));
        queries.truncate(n);
        queries
    }
}

impl Default for QueryFrequencyTracker {
    fn default() -> Self {
        Self::new(TRACKER_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts_hits() {
        let tracker = QueryFrequencyTracker::default();
        let params = SearchParams {
            query: "jwt".into(),
            ..SearchParams::default()
        };
        tracker.record("k1", &params);
        tracker.record("k1", &params);
        tracker.record("k2", &params);
        assert_eq!(tracker.len(), 2);
        let top = tracker.top_queries(10);
        assert_eq!(top[0].1, 2);
    }

    #[test]
    fn test_overflow_sheds_lru_block() {
        let tracker = QueryFrequencyTracker::new(150);
        let params = SearchParams::default();
        for i in 0..160 {
            tracker.record(&format!("k{i}"), &params);
        }
        assert!(tracker.len() <= 150);
    }

    #[test]
    fn test_warm_candidates_skip_recently_cached() {
        let tracker = QueryFrequencyTracker::default();
        let params = SearchParams {
            query: "hot".into(),
            ..SearchParams::default()
        };
        tracker.record("k1", &params);
        // Just cached: not yet a candidate under a long TTL.
        assert!(tracker.warm_candidates(Duration::from_secs(600)).is_empty());
        // Zero TTL: immediately eligible.
        let candidates = tracker.warm_candidates(Duration::from_secs(0));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].key, "k1");
        assert!(candidates[0].score > 0.0);
    }
}
