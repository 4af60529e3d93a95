//! Cache Manager - Unified Two-Tier Cache
//!
//! Orchestrates L1 (in-process) and L2 (remote) behind one API: tier
//! fallback, promotion of L2 hits into L1, version staleness checks on L2,
//! and statistics.
//!
//! Failures talking to L2 are logged, counted and treated as misses. Cache
//! writes are best effort; the loader's own errors are the only errors a
//! read can return.
//!
//! Concurrent misses for the same key are not coalesced: each caller runs
//! its own loader and writes its own result (last write wins).

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::CacheConfig;
use super::entry::{CacheEntry, DEFAULT_VERSION};
use super::key;
use super::l1::L1Cache;
use super::l2::L2Cache;
use super::metrics::{CacheMetrics, CacheStats};
use super::store::{InMemoryRemoteStore, RemoteStore};
use super::MAX_TTL_SECS;
use crate::error::{Error, Result};
use crate::monitoring::{HealthReport, StatsCollector, TierHealth};

/// Cache tier enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    /// L1 - in-process
    L1,
    /// L2 - remote key-value store
    L2,
}

impl CacheTier {
    /// Short name used in health reports and metric labels
    pub fn name(&self) -> &'static str {
        match self {
            CacheTier::L1 => "l1",
            CacheTier::L2 => "l2",
        }
    }
}

impl std::fmt::Display for CacheTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheTier::L1 => write!(f, "L1 (in-process)"),
            CacheTier::L2 => write!(f, "L2 (remote)"),
        }
    }
}

/// Per-call read options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// TTL in seconds for any write this read causes (promotion, loader
    /// result); `None` or 0 means the tier default
    pub ttl: Option<u64>,
    /// Expected version; an L2 entry with another version is stale
    pub version: Option<String>,
    /// Do not read L1
    pub skip_l1: bool,
    /// Do not read L2
    pub skip_l2: bool,
}

impl GetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.ttl = Some(ttl_seconds);
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn bypass_l1(mut self) -> Self {
        self.skip_l1 = true;
        self
    }

    pub fn bypass_l2(mut self) -> Self {
        self.skip_l2 = true;
        self
    }
}

/// Per-call write options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// TTL in seconds for both tiers; `None` or 0 means each tier's default
    pub ttl: Option<u64>,
    /// Version tag, `"1.0"` when absent
    pub version: Option<String>,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.ttl = Some(ttl_seconds);
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    fn version(&self) -> &str {
        self.version.as_deref().unwrap_or(DEFAULT_VERSION)
    }
}

impl From<&GetOptions> for SetOptions {
    fn from(options: &GetOptions) -> Self {
        Self {
            ttl: options.ttl,
            version: options.version.clone(),
        }
    }
}

/// One item produced by a warm-up loader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmItem<T> {
    pub key: String,
    pub data: T,
}

impl<T> WarmItem<T> {
    pub fn new(key: impl Into<String>, data: T) -> Self {
        Self {
            key: key.into(),
            data,
        }
    }
}

/// Background task ownership
#[derive(Default)]
struct Lifecycle {
    cancel: Option<CancellationToken>,
    tasks: Vec<JoinHandle<()>>,
}

/// Unified cache manager
pub struct CacheManager {
    /// L1 (in-process) cache
    l1: Arc<L1Cache>,
    /// L2 (remote) cache; `None` when disabled
    l2: Option<Arc<L2Cache>>,
    /// Configuration
    config: CacheConfig,
    /// Metrics collector
    metrics: Arc<CacheMetrics>,
    /// Periodic stats refresh
    collector: Arc<StatsCollector>,
    lifecycle: Mutex<Lifecycle>,
    started_at: Instant,
}

impl CacheManager {
    /// Create a manager over a remote store
    ///
    /// The configuration is validated here; background tasks are not
    /// started until [`start`](Self::start).
    pub fn new(config: CacheConfig, store: Arc<dyn RemoteStore>) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, Some(store)))
    }

    /// Create a manager without a remote tier
    pub fn local_only(config: CacheConfig) -> Result<Self> {
        if config.l2.enabled {
            return Err(Error::Config(
                "l2 is enabled but no remote store was supplied".into(),
            ));
        }
        config.validate()?;
        Ok(Self::build(config, None))
    }

    /// Create with default configuration over an in-memory store (for testing)
    pub fn in_memory() -> Self {
        Self::build(
            CacheConfig::default(),
            Some(Arc::new(InMemoryRemoteStore::new())),
        )
    }

    fn build(config: CacheConfig, store: Option<Arc<dyn RemoteStore>>) -> Self {
        let l1 = Arc::new(L1Cache::with_config(config.l1.clone()));
        let l2 = match store {
            Some(store) if config.l2.enabled => {
                Some(Arc::new(L2Cache::new(store, config.l2.clone())))
            }
            _ => None,
        };
        let metrics = Arc::new(CacheMetrics::new());
        let collector = Arc::new(StatsCollector::new(
            config.l1.enabled.then(|| Arc::clone(&l1)),
            l2.clone(),
            Arc::clone(&metrics),
            &config.l2.key_prefix,
        ));

        Self {
            l1,
            l2,
            config,
            metrics,
            collector,
            lifecycle: Mutex::new(Lifecycle::default()),
            started_at: Instant::now(),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Look a value up in L1 then L2
    ///
    /// Returns `None` on a miss in every consulted tier. L2 failures are
    /// swallowed and count as misses.
    pub async fn get<T>(&self, namespace: &str, key: &str, options: GetOptions) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let full_key = self.full_key(namespace, key);
        self.lookup(&full_key, &options).await
    }

    /// Look a value up, falling back to `loader` on a miss
    ///
    /// A loaded `Some` is written to both tiers with the same TTL and version;
    /// a loaded `None` writes nothing. Loader errors are returned unchanged.
    pub async fn get_or_load<T, E, F, Fut>(
        &self,
        namespace: &str,
        key: &str,
        options: GetOptions,
        loader: F,
    ) -> std::result::Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<T>, E>>,
    {
        let full_key = self.full_key(namespace, key);
        if let Some(value) = self.lookup(&full_key, &options).await {
            return Ok(Some(value));
        }

        self.metrics.record_loader_call();
        debug!(key = %full_key, "cache miss, invoking loader");
        let loaded = loader().await?;

        if let Some(value) = &loaded {
            if let Err(e) = self.write(&full_key, value, &SetOptions::from(&options)).await {
                warn!(key = %full_key, error = %e, "loaded value could not be cached");
            }
        }
        Ok(loaded)
    }

    /// Check whether either tier holds the key (not counted as a lookup)
    pub async fn exists(&self, namespace: &str, key: &str) -> bool {
        let full_key = self.full_key(namespace, key);
        if self.config.l1.enabled && self.l1.contains(&full_key) {
            return true;
        }

        match &self.l2 {
            Some(l2) => match l2.get(&full_key).await {
                Ok(found) => found.is_some(),
                Err(e) => {
                    self.metrics.record_l2_error();
                    warn!(key = %full_key, error = %e, "l2 exists check failed");
                    false
                }
            },
            None => false,
        }
    }

    async fn lookup<T: DeserializeOwned>(&self, full_key: &str, options: &GetOptions) -> Option<T> {
        if self.config.l1.enabled && !options.skip_l1 {
            if let Some(value) = self.read_l1(full_key) {
                return Some(value);
            }
        }

        match &self.l2 {
            Some(l2) if !options.skip_l2 => self.read_l2(l2, full_key, options).await,
            _ => None,
        }
    }

    fn read_l1<T: DeserializeOwned>(&self, full_key: &str) -> Option<T> {
        let hit = self
            .l1
            .get(full_key)
            .and_then(|entry| match serde_json::from_value(entry.data) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key = %full_key, error = %e, "l1 entry does not decode as the requested type");
                    None
                }
            });

        if hit.is_some() {
            self.metrics.record_l1_hit();
            debug!(key = %full_key, tier = %CacheTier::L1, "cache hit");
        } else {
            self.metrics.record_l1_miss();
        }
        hit
    }

    async fn read_l2<T: DeserializeOwned>(
        &self,
        l2: &L2Cache,
        full_key: &str,
        options: &GetOptions,
    ) -> Option<T> {
        let started = Instant::now();
        let entry = match l2.get(full_key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                self.metrics.record_l2_miss();
                debug!(key = %full_key, "cache miss in all tiers");
                return None;
            }
            Err(e) => {
                self.metrics.record_l2_error();
                self.metrics.record_l2_miss();
                warn!(key = %full_key, error = %e, "l2 read failed, treating as miss");
                return None;
            }
        };
        self.metrics.record_l2_read_latency(started.elapsed());

        if let Some(expected) = options.version.as_deref() {
            if !entry.matches_version(expected) {
                warn!(
                    key = %full_key,
                    stored = %entry.version(),
                    expected,
                    "stale l2 entry, invalidating"
                );
                self.metrics.record_stale();
                self.metrics.record_l2_miss();
                self.remove(full_key).await;
                return None;
            }
        }

        let value = match serde_json::from_value(entry.data.clone()) {
            Ok(value) => value,
            Err(e) => {
                self.metrics.record_l2_miss();
                warn!(key = %full_key, error = %e, "l2 entry does not decode as the requested type");
                return None;
            }
        };

        self.metrics.record_l2_hit();
        if self.config.l1.enabled {
            self.l1.set(full_key, entry, self.l1_ttl(options.ttl));
            self.metrics.record_promotion();
            debug!(key = %full_key, tier = %CacheTier::L2, "cache hit, promoted to l1");
        } else {
            debug!(key = %full_key, tier = %CacheTier::L2, "cache hit");
        }
        Some(value)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Write a value to every enabled tier
    ///
    /// Best effort: a failing tier is logged and does not stop the other.
    pub async fn set<T: Serialize>(&self, namespace: &str, key: &str, data: &T, options: SetOptions) {
        let full_key = self.full_key(namespace, key);
        if let Err(e) = self.write(&full_key, data, &options).await {
            warn!(key = %full_key, error = %e, "value could not be cached");
        }
    }

    /// Fails only if the value cannot be serialized; tier failures are swallowed
    async fn write<T: Serialize>(&self, full_key: &str, data: &T, options: &SetOptions) -> Result<()> {
        let entry = CacheEntry::<Value>::from_serializable(data, options.version())?;
        self.metrics.record_set();

        if self.config.l1.enabled {
            self.l1.set(full_key, entry.clone(), self.l1_ttl(options.ttl));
        }

        if let Some(l2) = &self.l2 {
            if let Err(e) = l2.set(full_key, &entry, self.l2_ttl(options.ttl)).await {
                self.metrics.record_l2_error();
                warn!(key = %full_key, error = %e, "l2 write failed");
            }
        }

        debug!(key = %full_key, version = %entry.version(), "cache set");
        Ok(())
    }

    /// Remove a key from both tiers; returns true if any tier held it
    pub async fn delete(&self, namespace: &str, key: &str) -> bool {
        let full_key = self.full_key(namespace, key);
        self.metrics.record_delete();
        self.remove(&full_key).await
    }

    async fn remove(&self, full_key: &str) -> bool {
        let mut removed = self.l1.delete(full_key);

        if let Some(l2) = &self.l2 {
            match l2.delete(full_key).await {
                Ok(existed) => removed |= existed,
                Err(e) => {
                    self.metrics.record_l2_error();
                    warn!(key = %full_key, error = %e, "l2 delete failed");
                }
            }
        }
        removed
    }

    /// Remove every key of a namespace from both tiers
    ///
    /// Returns the number of distinct keys removed.
    pub async fn clear(&self, namespace: &str) -> usize {
        let prefix = &self.config.l2.key_prefix;
        let ns_prefix = key::namespace_prefix(prefix, namespace);
        let mut removed: HashSet<String> = HashSet::new();

        for full_key in self.l1.keys() {
            if full_key.starts_with(&ns_prefix) && self.l1.delete(&full_key) {
                removed.insert(full_key);
            }
        }

        if let Some(l2) = &self.l2 {
            let pattern = key::namespace_pattern(prefix, namespace);
            // The glob can over-match when the namespace itself holds `*` or `?`
            let deleted = match l2.keys_matching(&pattern).await {
                Ok(keys) => {
                    let keys: Vec<String> = keys
                        .into_iter()
                        .filter(|full_key| full_key.starts_with(&ns_prefix))
                        .collect();
                    l2.delete_many(&keys).await.map(|_| keys)
                }
                Err(e) => Err(e),
            };
            match deleted {
                Ok(keys) => removed.extend(keys),
                Err(e) => {
                    self.metrics.record_l2_error();
                    warn!(namespace, error = %e, "l2 clear failed");
                }
            }
        }

        info!(namespace, removed = removed.len(), "namespace cleared");
        removed.len()
    }

    /// Preload a namespace
    ///
    /// Calls `loader` once and writes each item in order. A loader error or a
    /// value that cannot be serialized stops the warm-up; the count written so
    /// far is returned either way.
    pub async fn warm_up<T, E, F, Fut>(&self, namespace: &str, loader: F) -> usize
    where
        T: Serialize,
        E: std::fmt::Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Vec<WarmItem<T>>, E>>,
    {
        let items = match loader().await {
            Ok(items) => items,
            Err(e) => {
                warn!(namespace, error = %e, "warm-up loader failed");
                return 0;
            }
        };

        let total = items.len();
        let options = SetOptions::default();
        let mut warmed = 0;
        for item in items {
            let full_key = self.full_key(namespace, &item.key);
            if let Err(e) = self.write(&full_key, &item.data, &options).await {
                warn!(namespace, key = %item.key, error = %e, warmed, "warm-up aborted");
                break;
            }
            warmed += 1;
        }

        info!(namespace, warmed, total, "cache warm-up complete");
        warmed
    }

    // =========================================================================
    // Stats & Health
    // =========================================================================

    /// Current statistics, recomputed on every call
    pub fn stats(&self) -> CacheStats {
        self.collector.snapshot()
    }

    /// Recount remote keys now instead of waiting for the collector
    pub async fn refresh_stats(&self) -> CacheStats {
        self.collector.refresh().await
    }

    /// Zero all counters
    pub fn reset_stats(&self) {
        self.metrics.reset();
    }

    /// Publish cache gauges into a Prometheus registry
    pub fn register_metrics(&self, registry: &prometheus::Registry) -> Result<()> {
        self.collector.register(registry)
    }

    /// Probe every enabled tier
    pub async fn health(&self) -> HealthReport {
        let l1 = if self.config.l1.enabled {
            TierHealth::healthy(CacheTier::L1.name())
                .with_message(format!("{} keys", self.l1.len()))
        } else {
            TierHealth::disabled(CacheTier::L1.name())
        };

        let l2 = match &self.l2 {
            None => TierHealth::disabled(CacheTier::L2.name()),
            Some(l2) => {
                let started = Instant::now();
                let probe = match l2.ping().await {
                    Ok(()) => TierHealth::healthy(CacheTier::L2.name()),
                    Err(e) => {
                        warn!(error = %e, "l2 health probe failed");
                        TierHealth::unhealthy(CacheTier::L2.name(), e.to_string())
                    }
                };
                probe.with_duration(started.elapsed())
            }
        };

        HealthReport::new(l1, l2, self.started_at.elapsed())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start the L1 sweep and the stats collector
    ///
    /// Must be called from within a tokio runtime. Calling it again while
    /// running does nothing.
    pub fn start(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.cancel.is_some() {
            debug!("cache background tasks already running");
            return;
        }

        let cancel = CancellationToken::new();
        if self.config.l1.enabled {
            lifecycle
                .tasks
                .push(self.l1.spawn_sweeper(cancel.child_token()));
        }
        lifecycle.tasks.push(
            self.collector
                .spawn(self.config.stats_interval(), cancel.child_token()),
        );
        lifecycle.cancel = Some(cancel);

        info!(
            l1_enabled = self.config.l1.enabled,
            l2_enabled = self.l2.is_some(),
            sweep_period = ?self.config.l1.check_period(),
            stats_interval = ?self.config.stats_interval(),
            "cache background tasks started"
        );
    }

    /// Whether background tasks are running
    pub fn is_running(&self) -> bool {
        self.lifecycle.lock().cancel.is_some()
    }

    /// Stop background tasks, wait for them, and flush L1
    ///
    /// The remote tier is left untouched. The manager stays usable and can be
    /// started again.
    pub async fn shutdown(&self) {
        let (cancel, tasks) = {
            let mut lifecycle = self.lifecycle.lock();
            (lifecycle.cancel.take(), std::mem::take(&mut lifecycle.tasks))
        };

        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "cache background task ended abnormally");
            }
        }

        self.l1.flush_all();
        info!("cache manager shut down");
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Fully-qualified key for a namespace/key pair
    pub fn full_key(&self, namespace: &str, key: &str) -> String {
        key::build_key(&self.config.l2.key_prefix, namespace, key)
    }

    fn l1_ttl(&self, ttl: Option<u64>) -> Duration {
        Duration::from_secs(
            ttl.filter(|secs| *secs > 0)
                .unwrap_or(self.config.l1.ttl_seconds)
                .min(MAX_TTL_SECS),
        )
    }

    fn l2_ttl(&self, ttl: Option<u64>) -> u64 {
        ttl.filter(|secs| *secs > 0)
            .unwrap_or(self.config.l2.ttl_seconds)
            .min(MAX_TTL_SECS)
    }

    /// Get reference to L1 cache
    pub fn l1(&self) -> &L1Cache {
        &self.l1
    }

    /// Get reference to L2 cache, if enabled
    pub fn l2(&self) -> Option<&L2Cache> {
        self.l2.as_deref()
    }

    /// Get configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get the stats collector
    pub fn collector(&self) -> &StatsCollector {
        &self.collector
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        if let Some(cancel) = self.lifecycle.get_mut().cancel.take() {
            cancel.cancel();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
