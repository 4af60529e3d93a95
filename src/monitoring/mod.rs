//! Cache Observability
//!
//! Health probing and periodic statistics.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      CacheManager                            │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌────────────────────────┐   ┌───────────────────────────┐  │
//! │  │ health()               │   │ StatsCollector            │  │
//! │  │ L1: healthy if enabled │   │ every stats_interval:     │  │
//! │  │ L2: healthy iff PING   │   │  count L2 keys            │  │
//! │  └────────────────────────┘   │  recompute CacheStats     │  │
//! │              │                │  update Prometheus gauges │  │
//! │              ▼                └───────────────────────────┘  │
//! │        HealthReport                                          │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod collector;
mod health;

pub use collector::StatsCollector;
pub use health::{HealthReport, HealthStatus, TierHealth};
