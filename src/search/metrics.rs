//! Search metrics: atomic counters plus a bounded latency reservoir.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Latency samples retained.
const RESERVOIR_CAPACITY: usize = 1000;

/// Counters for the search manager. All plain atomics; the reservoir is
/// the only locked structure and holds raw samples for percentiles.
#[derive(Default)]
pub struct SearchMetrics {
    /// Every search that reached the manager.
    pub total_searches: AtomicU64,
    /// Searches served by the hybrid (vector-assisted) path.
    pub vector_searches: AtomicU64,
    /// Searches served by the filter-only path.
    pub filter_searches: AtomicU64,
    /// Cache hits.
    pub cache_hits: AtomicU64,
    /// Calls that waited on another identical in-flight execution.
    pub coalesced_requests: AtomicU64,
    /// Failed executions.
    pub errors: AtomicU64,
    /// Cumulative execution latency, microseconds.
    pub total_latency_us: AtomicU64,
    latencies: Mutex<Vec<u64>>,
}

/// Point-in-time copy for reporting tools.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Every search that reached the manager.
    pub total_searches: u64,
    /// Hybrid-path executions.
    pub vector_searches: u64,
    /// Filter-only executions.
    pub filter_searches: u64,
    /// Cache hits.
    pub cache_hits: u64,
    /// Coalesced followers.
    pub coalesced_requests: u64,
    /// Failed executions.
    pub errors: u64,
    /// Mean execution latency, microseconds.
    pub avg_latency_us: u64,
    /// 95th-percentile latency over the reservoir, microseconds.
    pub p95_latency_us: u64,
}

impl SearchMetrics {
    /// Records one execution latency.
    pub fn record_latency(&self, micros: u64) {
        self.total_latency_us.fetch_add(micros, Ordering::Relaxed);
        if let Ok(mut latencies) = self.latencies.lock() {
            if latencies.len() >= RESERVOIR_CAPACITY {
                // Overwrite in ring order; cheap and good enough for p95.
                let slot = (self.total_searches.load(Ordering::Relaxed) as usize)
                    % RESERVOIR_CAPACITY;
                latencies[slot] = micros;
            } else {
                latencies.push(micros);
            }
        }
    }

    /// Produces a snapshot for reporting.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.total_searches.load(Ordering::Relaxed);
        let executed = self
            .vector_searches
            .load(Ordering::Relaxed)
            .saturating_add(self.filter_searches.load(Ordering::Relaxed));
        let avg = if executed == 0 {
            0
        } else {
            self.total_latency_us.load(Ordering::Relaxed) / executed
        };
        let p95 = self
            .latencies
            .lock()
            .map(|latencies| {
                if latencies.is_empty() {
                    return 0;
                }
                let mut sorted = latencies.clone();
                sorted.sort_unstable();
                let index = (sorted.len().saturating_sub(1)) * 95 / 100;
                sorted[index]
            })
            .unwrap_or(0);
        MetricsSnapshot {
            total_searches: total,
            vector_searches: self.vector_searches.load(Ordering::Relaxed),
            filter_searches: self.filter_searches.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            coalesced_requests: self.coalesced_requests.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            avg_latency_us: avg,
            p95_latency_us: p95,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_averages() {
        let metrics = SearchMetrics::default();
        metrics.total_searches.fetch_add(2, Ordering::Relaxed);
        metrics.filter_searches.fetch_add(2, Ordering::Relaxed);
        metrics.record_latency(100);
        metrics.record_latency(300);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.avg_latency_us, 200);
        assert_eq!(snapshot.p95_latency_us, 300);
    }

    #[test]
    fn test_reservoir_is_bounded() {
        let metrics = SearchMetrics::default();
        for i in 0..5000 {
            metrics.total_searches.fetch_add(1, Ordering::Relaxed);
            metrics.record_latency(i);
        }
        let len = metrics.latencies.lock().unwrap().len();
        assert!(len <= RESERVOIR_CAPACITY);
    }
}
