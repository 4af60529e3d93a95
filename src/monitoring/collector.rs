//! Stats Collector
//!
//! Background task that periodically recomputes derived statistics: the
//! remote key count (a network round trip, so it is not done per request),
//! the aggregate snapshot, and the Prometheus gauges mirroring it.
//!
//! Everything here is derived from the raw counters in
//! [`crate::cache::CacheMetrics`] and can be dropped and recomputed at any time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::RwLock;
use prometheus::{Gauge, IntGaugeVec, Opts, Registry};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::{CacheMetrics, CacheStats, L1Cache, L2Cache};
use crate::error::{Error, Result};

/// Prometheus gauges published by the collector
struct CacheGauges {
    hit_ratio: Gauge,
    requests: IntGaugeVec,
    keys: IntGaugeVec,
}

impl CacheGauges {
    fn new() -> Result<Self> {
        Ok(Self {
            hit_ratio: Gauge::with_opts(Opts::new(
                "tiercache_hit_ratio",
                "Hit ratio across both tiers, in percent",
            ))?,
            requests: IntGaugeVec::new(
                Opts::new("tiercache_requests", "Lookups per tier and result"),
                &["tier", "result"],
            )?,
            keys: IntGaugeVec::new(
                Opts::new("tiercache_keys", "Keys held per tier"),
                &["tier"],
            )?,
        })
    }

    fn register(&self, registry: &Registry) -> Result<()> {
        registry.register(Box::new(self.hit_ratio.clone()))?;
        registry.register(Box::new(self.requests.clone()))?;
        registry.register(Box::new(self.keys.clone()))?;
        Ok(())
    }

    fn update(&self, stats: &CacheStats) {
        self.hit_ratio.set(stats.hit_ratio);

        self.requests.with_label_values(&["l1", "hit"]).set(stats.l1.hits as i64);
        self.requests.with_label_values(&["l1", "miss"]).set(stats.l1.misses as i64);
        self.requests.with_label_values(&["l2", "hit"]).set(stats.l2.hits as i64);
        self.requests.with_label_values(&["l2", "miss"]).set(stats.l2.misses as i64);

        if let Some(keys) = stats.l1.keys {
            self.keys.with_label_values(&["l1"]).set(keys as i64);
        }
        if let Some(keys) = stats.l2.keys {
            self.keys.with_label_values(&["l2"]).set(keys as i64);
        }
    }
}

/// Periodic stats refresher
pub struct StatsCollector {
    l1: Option<Arc<L1Cache>>,
    l2: Option<Arc<L2Cache>>,
    metrics: Arc<CacheMetrics>,
    /// Pattern matching every key this cache owns in the remote store
    l2_pattern: String,
    l2_keys: RwLock<Option<usize>>,
    latest: RwLock<Option<CacheStats>>,
    gauges: OnceLock<CacheGauges>,
    refreshes: AtomicU64,
}

impl StatsCollector {
    /// Create a collector; pass `None` for a disabled tier
    pub fn new(
        l1: Option<Arc<L1Cache>>,
        l2: Option<Arc<L2Cache>>,
        metrics: Arc<CacheMetrics>,
        key_prefix: &str,
    ) -> Self {
        Self {
            l1,
            l2,
            metrics,
            l2_pattern: format!("{}*", key_prefix),
            l2_keys: RwLock::new(None),
            latest: RwLock::new(None),
            gauges: OnceLock::new(),
            refreshes: AtomicU64::new(0),
        }
    }

    /// Compute a fresh snapshot from the raw counters
    ///
    /// L1 keys are counted live; the L2 key count is the one observed by the
    /// last [`refresh`](Self::refresh).
    pub fn snapshot(&self) -> CacheStats {
        let l1_keys = self.l1.as_ref().map(|l1| l1.len());
        let l2_keys = if self.l2.is_some() {
            *self.l2_keys.read()
        } else {
            None
        };
        self.metrics.snapshot(l1_keys, l2_keys)
    }

    /// Recount remote keys, recompute the snapshot and publish gauges
    pub async fn refresh(&self) -> CacheStats {
        if let Some(l2) = &self.l2 {
            match l2.keys_matching(&self.l2_pattern).await {
                Ok(keys) => *self.l2_keys.write() = Some(keys.len()),
                Err(e) => {
                    self.metrics.record_l2_error();
                    warn!(error = %e, "stats refresh could not count l2 keys");
                }
            }
        }

        let stats = self.snapshot();
        if let Some(gauges) = self.gauges.get() {
            gauges.update(&stats);
        }
        *self.latest.write() = Some(stats.clone());
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        stats
    }

    /// Snapshot produced by the last refresh
    pub fn latest(&self) -> Option<CacheStats> {
        self.latest.read().clone()
    }

    /// Remote key count observed by the last successful refresh
    pub fn l2_keys(&self) -> Option<usize> {
        *self.l2_keys.read()
    }

    /// Number of completed refreshes
    pub fn refreshes(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    /// Register the gauges with a Prometheus registry
    ///
    /// Gauges can only be registered once per collector.
    pub fn register(&self, registry: &Registry) -> Result<()> {
        let gauges = CacheGauges::new()?;
        gauges.register(registry)?;
        gauges.update(&self.snapshot());
        self.gauges
            .set(gauges)
            .map_err(|_| Error::Internal("stats gauges already registered".into()))
    }

    /// Spawn the refresh loop; the first refresh runs immediately
    pub fn spawn(self: &Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let collector = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let stats = collector.refresh().await;
                        debug!(
                            hit_ratio = stats.hit_ratio,
                            requests = stats.total_requests,
                            l1_keys = ?stats.l1.keys,
                            l2_keys = ?stats.l2.keys,
                            "cache stats refreshed"
                        );
                    }
                }
            }
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheEntry, InMemoryRemoteStore, L2Config};
    use assert_matches::assert_matches;
    use prometheus::{Encoder, TextEncoder};
    use serde_json::json;

    fn make_collector() -> (Arc<InMemoryRemoteStore>, Arc<L1Cache>, Arc<L2Cache>, StatsCollector) {
        let store = Arc::new(InMemoryRemoteStore::new());
        let l1 = Arc::new(L1Cache::new());
        let l2 = Arc::new(L2Cache::new(store.clone(), L2Config::default()));
        let collector = StatsCollector::new(
            Some(l1.clone()),
            Some(l2.clone()),
            Arc::new(CacheMetrics::new()),
            "cache:",
        );
        (store, l1, l2, collector)
    }

    #[tokio::test]
    async fn test_l2_keys_unknown_until_refresh() {
        let (_store, _l1, l2, collector) = make_collector();
        let entry = CacheEntry::new(json!(1), "1.0");
        l2.set("cache:a:1", &entry, 60).await.unwrap();
        l2.set("cache:a:2", &entry, 60).await.unwrap();
        l2.set("other:a:3", &entry, 60).await.unwrap();

        assert_eq!(collector.snapshot().l2.keys, None);
        assert!(collector.latest().is_none());

        let stats = collector.refresh().await;
        assert_eq!(stats.l2.keys, Some(2));
        assert_eq!(collector.l2_keys(), Some(2));
        assert_eq!(collector.latest(), Some(stats));
    }

    #[tokio::test]
    async fn test_refresh_keeps_last_count_when_l2_down() {
        let (store, _l1, l2, collector) = make_collector();
        l2.set("cache:a:1", &CacheEntry::new(json!(1), "1.0"), 60).await.unwrap();
        collector.refresh().await;

        store.set_available(false);
        let stats = collector.refresh().await;
        assert_eq!(stats.l2.keys, Some(1));
        assert_eq!(stats.l2_errors, 1);
    }

    #[tokio::test]
    async fn test_l1_keys_are_live() {
        let (_store, l1, _l2, collector) = make_collector();
        l1.set("cache:a:1", CacheEntry::new(json!(1), "1.0"), Duration::from_secs(60));
        assert_eq!(collector.snapshot().l1.keys, Some(1));
    }

    #[tokio::test]
    async fn test_gauges_registered_once() {
        let (_store, _l1, _l2, collector) = make_collector();
        let registry = Registry::new();

        collector.register(&registry).unwrap();
        collector.refresh().await;

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("tiercache_hit_ratio"));
        assert!(text.contains("tiercache_requests"));
        assert!(text.contains("tiercache_keys{tier=\"l1\"} 0"));

        assert_matches!(collector.register(&Registry::new()), Err(Error::Internal(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_loop_stops_on_cancel() {
        let (_store, _l1, _l2, collector) = make_collector();
        let collector = Arc::new(collector);
        let cancel = CancellationToken::new();

        let handle = collector.spawn(Duration::from_secs(30), cancel.clone());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(collector.refreshes() >= 3);

        cancel.cancel();
        handle.await.unwrap();
    }
}
