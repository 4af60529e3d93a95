//! Two-Tier Cache
//!
//! An in-process L1 in front of a shared remote L2, behind one manager.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                           Cache Manager                                  │
//! │        get / get_or_load / set / delete / clear / warm_up                │
//! ├──────────────────────────────────────────────────────────────────────────┤
//! │  L1 Cache (in-process)            │  L2 Cache (remote KV)                │
//! │  ┌─────────────────────────────┐  │  ┌──────────────────────────────┐    │
//! │  │ HashMap + insertion order   │  │  │ JSON envelope                │    │
//! │  │ TTL, max_keys, sweep        │  │  │ gzip + base64 `data`         │    │
//! │  └─────────────────────────────┘  │  └──────────────────────────────┘    │
//! │               ▲                   │                 │                    │
//! │               └──── promotion ────┴─────────────────┘                    │
//! │                                   │  RemoteStore: Redis / in-memory      │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reads go L1, then L2, then the caller's loader; an L2 hit is written back
//! into L1. Writes go to both tiers independently. Tier failures are logged
//! and treated as misses, never surfaced to the caller.
//!
//! # Keys
//!
//! Both tiers use `<prefix><namespace>:<key>` (see [`key`]), so a namespace
//! can be cleared with a starts-with match in L1 and a glob in L2.

pub mod compression;
pub mod key;

mod config;
mod entry;
mod l1;
mod l2;
mod manager;
mod metrics;
mod redis_store;
mod store;

pub use compression::GzipCodec;
pub use config::{
    CacheConfig, CacheConfigOverrides, CachePreset, L1Config, L1Overrides, L2Config, L2Overrides,
    L3Config, L3Overrides,
};
pub use entry::{CacheEntry, EntryMetadata, DEFAULT_VERSION};
pub use l1::{L1Cache, L1Stats};
pub use l2::L2Cache;
pub use manager::{CacheManager, CacheTier, GetOptions, SetOptions, WarmItem};
pub use metrics::{hit_ratio, CacheMetrics, CacheStats, TierStats};
pub use redis_store::RedisStore;
pub use store::{glob_match, InMemoryRemoteStore, RemoteStore};

/// Default L1 TTL (5 minutes)
pub const DEFAULT_L1_TTL_SECS: u64 = 300;

/// Default L1 key bound
pub const DEFAULT_L1_MAX_KEYS: usize = 10_000;

/// Default L1 expired-key sweep period (2 minutes)
pub const DEFAULT_L1_CHECK_PERIOD_SECS: u64 = 120;

/// Default L2 TTL (1 hour)
pub const DEFAULT_L2_TTL_SECS: u64 = 3600;

/// Default key prefix shared by both tiers
pub const DEFAULT_KEY_PREFIX: &str = "cache:";

/// Default L3 TTL (1 day); the tier is reserved and never constructed
pub const DEFAULT_L3_TTL_SECS: u64 = 86_400;

/// Default stats refresh interval
pub const DEFAULT_STATS_INTERVAL_SECS: u64 = 30;

/// Longest TTL or timer period accepted anywhere (10 years)
///
/// Configuration above this is rejected; per-call TTLs above it are clamped.
pub const MAX_TTL_SECS: u64 = 10 * 365 * 86_400;

/// Clamp a TTL so that `Instant::now() + ttl` cannot overflow
pub(crate) fn clamp_ttl(ttl: std::time::Duration) -> std::time::Duration {
    ttl.min(std::time::Duration::from_secs(MAX_TTL_SECS))
}

// =============================================================================
// Tests
// =============================================================================
