//! Cache Metrics Collection
//!
//! Raw counters updated on the request path, and the [`CacheStats`]
//! snapshot derived from them on demand.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Hit ratio in percent; 0 when there were no requests
pub fn hit_ratio(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64 * 100.0
    }
}

/// Cache metrics collector
#[derive(Debug, Default)]
pub struct CacheMetrics {
    // L1 metrics
    l1_hits: AtomicU64,
    l1_misses: AtomicU64,

    // L2 metrics
    l2_hits: AtomicU64,
    l2_misses: AtomicU64,
    l2_errors: AtomicU64,

    // Read latency against the remote tier (microseconds, EMA)
    l2_read_latency_us: AtomicU64,

    // Protocol events
    promotions: AtomicU64,
    stale_invalidations: AtomicU64,
    loader_calls: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
}

impl CacheMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    // L1 metrics
    pub fn record_l1_hit(&self) {
        self.l1_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_l1_miss(&self) {
        self.l1_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn l1_hits(&self) -> u64 {
        self.l1_hits.load(Ordering::Relaxed)
    }

    pub fn l1_misses(&self) -> u64 {
        self.l1_misses.load(Ordering::Relaxed)
    }

    // L2 metrics
    pub fn record_l2_hit(&self) {
        self.l2_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_l2_miss(&self) {
        self.l2_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// A remote-tier call failed and was swallowed
    pub fn record_l2_error(&self) {
        self.l2_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn l2_hits(&self) -> u64 {
        self.l2_hits.load(Ordering::Relaxed)
    }

    pub fn l2_misses(&self) -> u64 {
        self.l2_misses.load(Ordering::Relaxed)
    }

    pub fn l2_errors(&self) -> u64 {
        self.l2_errors.load(Ordering::Relaxed)
    }

    // Latency tracking
    pub fn record_l2_read_latency(&self, duration: Duration) {
        let new_us = duration.as_micros() as u64;
        let alpha = 0.1;

        loop {
            let current = self.l2_read_latency_us.load(Ordering::Relaxed);
            let updated = if current == 0 {
                new_us
            } else {
                ((1.0 - alpha) * current as f64 + alpha * new_us as f64) as u64
            };

            if self
                .l2_read_latency_us
                .compare_exchange_weak(current, updated, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
    }

    pub fn l2_read_latency(&self) -> Duration {
        Duration::from_micros(self.l2_read_latency_us.load(Ordering::Relaxed))
    }

    // Protocol events
    /// An L2 hit was written back into L1
    pub fn record_promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    /// An L2 entry was dropped because its version did not match
    pub fn record_stale(&self) {
        self.stale_invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_loader_call(&self) {
        self.loader_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn promotions(&self) -> u64 {
        self.promotions.load(Ordering::Relaxed)
    }

    pub fn stale_invalidations(&self) -> u64 {
        self.stale_invalidations.load(Ordering::Relaxed)
    }

    pub fn loader_calls(&self) -> u64 {
        self.loader_calls.load(Ordering::Relaxed)
    }

    /// Get overall hit ratio (percent) across both tiers
    pub fn overall_hit_ratio(&self) -> f64 {
        hit_ratio(
            self.l1_hits() + self.l2_hits(),
            self.l1_misses() + self.l2_misses(),
        )
    }

    /// Build a stats snapshot
    ///
    /// Key counts come from the caller: L1 is counted live, L2 is whatever
    /// the stats collector last observed.
    pub fn snapshot(&self, l1_keys: Option<usize>, l2_keys: Option<usize>) -> CacheStats {
        let l1 = TierStats {
            hits: self.l1_hits(),
            misses: self.l1_misses(),
            keys: l1_keys,
            hit_ratio: hit_ratio(self.l1_hits(), self.l1_misses()),
        };
        let l2 = TierStats {
            hits: self.l2_hits(),
            misses: self.l2_misses(),
            keys: l2_keys,
            hit_ratio: hit_ratio(self.l2_hits(), self.l2_misses()),
        };

        let total_hits = l1.hits + l2.hits;
        let total_misses = l1.misses + l2.misses;

        CacheStats {
            l1,
            l2,
            total_hits,
            total_misses,
            total_requests: total_hits + total_misses,
            hit_ratio: hit_ratio(total_hits, total_misses),
            promotions: self.promotions(),
            stale_invalidations: self.stale_invalidations(),
            l2_errors: self.l2_errors(),
            loader_calls: self.loader_calls(),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            l2_read_latency_us: self.l2_read_latency().as_micros() as u64,
        }
    }

    /// Reset all metrics
    pub fn reset(&self) {
        self.l1_hits.store(0, Ordering::Relaxed);
        self.l1_misses.store(0, Ordering::Relaxed);
        self.l2_hits.store(0, Ordering::Relaxed);
        self.l2_misses.store(0, Ordering::Relaxed);
        self.l2_errors.store(0, Ordering::Relaxed);
        self.l2_read_latency_us.store(0, Ordering::Relaxed);
        self.promotions.store(0, Ordering::Relaxed);
        self.stale_invalidations.store(0, Ordering::Relaxed);
        self.loader_calls.store(0, Ordering::Relaxed);
        self.sets.store(0, Ordering::Relaxed);
        self.deletes.store(0, Ordering::Relaxed);
    }
}

/// Per-tier statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TierStats {
    pub hits: u64,
    pub misses: u64,
    /// `None` when unknown (tier disabled, or not yet counted)
    pub keys: Option<usize>,
    /// Percent
    pub hit_ratio: f64,
}

/// Snapshot of cache statistics, recomputed on every call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub l1: TierStats,
    pub l2: TierStats,

    pub total_hits: u64,
    pub total_misses: u64,
    pub total_requests: u64,
    /// `100 * total_hits / total_requests`, 0 with no requests
    pub hit_ratio: f64,

    pub promotions: u64,
    pub stale_invalidations: u64,
    pub l2_errors: u64,
    pub loader_calls: u64,
    pub sets: u64,
    pub deletes: u64,
    pub l2_read_latency_us: u64,
}

// =============================================================================
// Tests
// =============================================================================
