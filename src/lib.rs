//! tiercache - Two-Tier Read-Through Cache
//!
//! An in-process L1 cache in front of a shared remote L2 (Redis or any
//! [`cache::RemoteStore`]), with promotion of L2 hits into L1, version-based
//! staleness detection, gzip compression of remote payloads, and graceful
//! degradation when the remote tier is unavailable.
//!
//! # Architecture
//!
//! ```text
//! caller → CacheManager → L1 → L2 → loader
//!                          ▲     │
//!                          └─────┘ promotion
//! ```
//!
//! # Example
//!
//! ```
//! use tiercache::cache::{CacheManager, GetOptions, SetOptions};
//!
//! # tokio_test::block_on(async {
//! let cache = CacheManager::in_memory();
//!
//! cache.set("profiles", "u1", &"Ann", SetOptions::new()).await;
//! let name: Option<String> = cache.get("profiles", "u1", GetOptions::new()).await;
//! assert_eq!(name.as_deref(), Some("Ann"));
//! # });
//! ```
//!
//! # Modules
//!
//! - [`cache`] - Tiers, manager, configuration and key codec
//! - [`error`] - Error types
//! - [`monitoring`] - Health reports and the stats collector

pub mod cache;
pub mod error;
pub mod monitoring;

// Re-export commonly used types
pub use cache::{
    CacheConfig, CacheManager, CachePreset, CacheStats, GetOptions, InMemoryRemoteStore,
    RedisStore, RemoteStore, SetOptions, WarmItem,
};
pub use error::{Error, Result};
pub use monitoring::{HealthReport, HealthStatus};

/// Crate version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// =============================================================================
// Tests
// =============================================================================
