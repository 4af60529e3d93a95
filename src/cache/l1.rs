//! L1 Cache - In-Process Tier
//!
//! Bounded, TTL-expiring map keyed by fully-qualified key. Never touches the
//! network and never suspends the caller.
//!
//! # Design
//!
//! - One `RwLock` around the map; hits only take the read lock because access
//!   statistics are atomics
//! - Expired entries are invisible to `get`/`keys` immediately and are removed
//!   by the periodic sweep (or lazily on the next read)
//! - Capacity policy: when `max_keys` is reached, expired entries are purged
//!   first, then the oldest entry by insertion is evicted. Overwriting a key
//!   counts as a fresh insertion.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::clamp_ttl;
use super::config::L1Config;
use super::entry::{CacheEntry, EntryMetadata};

/// Stored L1 slot
struct Slot {
    data: Value,
    created_at: DateTime<Utc>,
    version: String,
    access_count: AtomicU64,
    /// Epoch milliseconds
    last_accessed: AtomicI64,
    expires_at: Instant,
    /// Insertion sequence, for oldest-first eviction
    seq: u64,
}

impl Slot {
    #[inline]
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    fn record_access(&self) {
        self.access_count.fetch_add(1, Ordering::Relaxed);
        self.last_accessed
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheEntry<Value> {
        let last_accessed = Utc
            .timestamp_millis_opt(self.last_accessed.load(Ordering::Relaxed))
            .single()
            .unwrap_or(self.created_at);

        CacheEntry::with_metadata(
            self.data.clone(),
            EntryMetadata {
                created_at: self.created_at,
                access_count: self.access_count.load(Ordering::Relaxed),
                last_accessed,
                version: self.version.clone(),
                compressed: None,
            },
        )
    }
}

#[derive(Default)]
struct L1State {
    entries: HashMap<String, Slot>,
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl L1State {
    fn remove(&mut self, key: &str) -> Option<Slot> {
        let slot = self.entries.remove(key)?;
        self.order.remove(&slot.seq);
        Some(slot)
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, slot)| slot.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }
}

/// L1 Cache - in-process tier
pub struct L1Cache {
    state: RwLock<L1State>,
    config: L1Config,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl L1Cache {
    /// Create a new L1 cache with default configuration
    pub fn new() -> Self {
        Self::with_config(L1Config::default())
    }

    /// Create a new L1 cache with custom configuration
    pub fn with_config(config: L1Config) -> Self {
        Self {
            state: RwLock::new(L1State::default()),
            config,
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Get an entry, recording the access on hit
    pub fn get(&self, key: &str) -> Option<CacheEntry<Value>> {
        let now = Instant::now();
        {
            let state = self.state.read();
            match state.entries.get(key) {
                Some(slot) if !slot.is_expired(now) => {
                    slot.record_access();
                    return Some(slot.snapshot());
                }
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: drop it now rather than waiting for the sweep
        let mut state = self.state.write();
        if state
            .entries
            .get(key)
            .is_some_and(|slot| slot.is_expired(now))
        {
            state.remove(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }
        None
    }

    /// Insert an entry with the given TTL
    ///
    /// Returns the key evicted to make room, if any.
    pub fn set(&self, key: impl Into<String>, entry: CacheEntry<Value>, ttl: Duration) -> Option<String> {
        let key = key.into();
        let now = Instant::now();
        let mut state = self.state.write();

        let mut evicted = None;
        if state.remove(&key).is_none() && state.entries.len() >= self.config.max_keys {
            let purged = state.purge_expired(now);
            self.expirations.fetch_add(purged as u64, Ordering::Relaxed);

            if state.entries.len() >= self.config.max_keys {
                evicted = state.evict_oldest();
                if let Some(ref old) = evicted {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %old, "l1 at capacity, evicted oldest entry");
                }
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;

        let CacheEntry { data, metadata } = entry;
        let slot = Slot {
            data,
            created_at: metadata.created_at,
            version: metadata.version,
            access_count: AtomicU64::new(metadata.access_count),
            last_accessed: AtomicI64::new(metadata.last_accessed.timestamp_millis()),
            expires_at: now + clamp_ttl(ttl),
            seq,
        };

        state.order.insert(seq, key.clone());
        state.entries.insert(key, slot);
        evicted
    }

    /// Remove an entry; returns true if it was present
    pub fn delete(&self, key: &str) -> bool {
        self.state.write().remove(key).is_some()
    }

    /// Check if a live entry exists for the key (does not count as an access)
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.state
            .read()
            .entries
            .get(key)
            .is_some_and(|slot| !slot.is_expired(now))
    }

    /// All live (non-expired) keys
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        self.state
            .read()
            .entries
            .iter()
            .filter(|(_, slot)| !slot.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.state
            .read()
            .entries
            .values()
            .filter(|slot| !slot.is_expired(now))
            .count()
    }

    /// Check if the cache holds no live entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry
    pub fn flush_all(&self) {
        let mut state = self.state.write();
        state.entries.clear();
        state.order.clear();
    }

    /// Remove expired entries; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let purged = self.state.write().purge_expired(Instant::now());
        self.expirations.fetch_add(purged as u64, Ordering::Relaxed);
        purged
    }

    /// Spawn the periodic expired-key sweep
    pub fn spawn_sweeper(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        let period = clamp_ttl(self.config.check_period());

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let purged = cache.purge_expired();
                        if purged > 0 {
                            debug!(purged, "l1 sweep removed expired entries");
                        }
                    }
                }
            }
        })
    }

    /// Get eviction count
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Get expiration count
    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    /// Get configuration
    pub fn config(&self) -> &L1Config {
        &self.config
    }
}

impl Default for L1Cache {
    fn default() -> Self {
        Self::new()
    }
}

/// L1 cache statistics
#[derive(Debug, Clone)]
pub struct L1Stats {
    /// Number of live entries
    pub entries: usize,
    /// Configured key bound
    pub max_keys: usize,
    /// Capacity evictions
    pub evictions: u64,
    /// Entries removed because their TTL elapsed
    pub expirations: u64,
    /// entries / max_keys (0.0 - 1.0)
    pub utilization: f64,
}

impl L1Cache {
    /// Get cache statistics
    pub fn stats(&self) -> L1Stats {
        let entries = self.len();
        L1Stats {
            entries,
            max_keys: self.config.max_keys,
            evictions: self.evictions(),
            expirations: self.expirations(),
            utilization: entries as f64 / self.config.max_keys as f64,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
