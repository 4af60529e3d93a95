//! Cache Configuration
//!
//! Configuration is resolved once, at construction time, by applying a set of
//! optional overrides on top of documented defaults:
//!
//! ```text
//! defaults ⊕ preset overrides ⊕ file overrides  →  validate  →  CacheConfig
//! ```
//!
//! Nothing here is mutable after the manager is built.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{
    DEFAULT_KEY_PREFIX, DEFAULT_L1_CHECK_PERIOD_SECS, DEFAULT_L1_MAX_KEYS, DEFAULT_L1_TTL_SECS,
    DEFAULT_L2_TTL_SECS, DEFAULT_L3_TTL_SECS, DEFAULT_STATS_INTERVAL_SECS, MAX_TTL_SECS,
};
use crate::error::{Error, Result};

// =============================================================================
// Resolved Configuration
// =============================================================================

/// L1 (in-process) tier configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct L1Config {
    /// Tier enabled
    pub enabled: bool,
    /// Default entry TTL in seconds
    pub ttl_seconds: u64,
    /// Maximum number of live keys
    pub max_keys: usize,
    /// Interval of the expired-key sweep in seconds
    pub check_period_seconds: u64,
}

impl L1Config {
    /// Sweep interval as a duration
    pub fn check_period(&self) -> Duration {
        Duration::from_secs(self.check_period_seconds)
    }
}

impl Default for L1Config {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: DEFAULT_L1_TTL_SECS,
            max_keys: DEFAULT_L1_MAX_KEYS,
            check_period_seconds: DEFAULT_L1_CHECK_PERIOD_SECS,
        }
    }
}

/// L2 (remote) tier configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct L2Config {
    /// Tier enabled
    pub enabled: bool,
    /// Default entry TTL in seconds
    pub ttl_seconds: u64,
    /// Gzip the `data` field of stored envelopes
    pub compression: bool,
    /// Prefix prepended to every fully-qualified key
    pub key_prefix: String,
}

impl Default for L2Config {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: DEFAULT_L2_TTL_SECS,
            compression: true,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

/// L3 tier configuration.
///
/// Reserved for a future persistent tier. It is carried through configuration
/// but no L3 tier is ever constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct L3Config {
    /// Tier enabled (has no effect)
    pub enabled: bool,
    /// Default entry TTL in seconds
    pub ttl_seconds: u64,
}

impl Default for L3Config {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_seconds: DEFAULT_L3_TTL_SECS,
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheConfig {
    /// L1 configuration
    pub l1: L1Config,
    /// L2 configuration
    pub l2: L2Config,
    /// L3 configuration (reserved)
    pub l3: L3Config,
    /// Stats collector refresh interval in seconds
    pub stats_interval_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1: L1Config::default(),
            l2: L2Config::default(),
            l3: L3Config::default(),
            stats_interval_seconds: DEFAULT_STATS_INTERVAL_SECS,
        }
    }
}

impl CacheConfig {
    /// Apply overrides on top of the defaults and validate the result.
    pub fn resolve(overrides: CacheConfigOverrides) -> Result<Self> {
        let mut config = Self::default();
        overrides.apply_to(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Resolve a named preset.
    pub fn from_preset(preset: CachePreset) -> Result<Self> {
        Self::resolve(preset.overrides())
    }

    /// Stats refresh interval as a duration
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_seconds)
    }

    /// Check the configuration for values that cannot work at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.l1.enabled {
            if self.l1.ttl_seconds == 0 {
                return Err(Error::Config("l1.ttl_seconds must be greater than 0".into()));
            }
            if self.l1.max_keys == 0 {
                return Err(Error::Config("l1.max_keys must be greater than 0".into()));
            }
            if self.l1.check_period_seconds == 0 {
                return Err(Error::Config(
                    "l1.check_period_seconds must be greater than 0".into(),
                ));
            }
        }

        if self.l2.enabled && self.l2.ttl_seconds == 0 {
            return Err(Error::Config("l2.ttl_seconds must be greater than 0".into()));
        }

        if self.l3.enabled {
            tracing::warn!("l3 tier is enabled in configuration but is not implemented; ignoring");
        }

        if self.stats_interval_seconds == 0 {
            return Err(Error::Config(
                "stats_interval_seconds must be greater than 0".into(),
            ));
        }

        for (name, secs) in [
            ("l1.ttl_seconds", self.l1.ttl_seconds),
            ("l1.check_period_seconds", self.l1.check_period_seconds),
            ("l2.ttl_seconds", self.l2.ttl_seconds),
            ("stats_interval_seconds", self.stats_interval_seconds),
        ] {
            if secs > MAX_TTL_SECS {
                return Err(Error::Config(format!(
                    "{} must be at most {} ({} given)",
                    name, MAX_TTL_SECS, secs
                )));
            }
        }

        Ok(())
    }
}

// =============================================================================
// Overrides
// =============================================================================

/// Optional L1 fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct L1Overrides {
    pub enabled: Option<bool>,
    pub ttl_seconds: Option<u64>,
    pub max_keys: Option<usize>,
    pub check_period_seconds: Option<u64>,
}

/// Optional L2 fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct L2Overrides {
    pub enabled: Option<bool>,
    pub ttl_seconds: Option<u64>,
    pub compression: Option<bool>,
    pub key_prefix: Option<String>,
}

/// Optional L3 fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct L3Overrides {
    pub enabled: Option<bool>,
    pub ttl_seconds: Option<u64>,
}

/// Partial configuration; every field left as `None` keeps its default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfigOverrides {
    pub l1: L1Overrides,
    pub l2: L2Overrides,
    pub l3: L3Overrides,
    pub stats_interval_seconds: Option<u64>,
}

impl CacheConfigOverrides {
    /// Parse overrides from YAML text
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read overrides from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Layer `other` on top of `self`; fields set in `other` win.
    pub fn merge(self, other: Self) -> Self {
        Self {
            l1: L1Overrides {
                enabled: other.l1.enabled.or(self.l1.enabled),
                ttl_seconds: other.l1.ttl_seconds.or(self.l1.ttl_seconds),
                max_keys: other.l1.max_keys.or(self.l1.max_keys),
                check_period_seconds: other
                    .l1
                    .check_period_seconds
                    .or(self.l1.check_period_seconds),
            },
            l2: L2Overrides {
                enabled: other.l2.enabled.or(self.l2.enabled),
                ttl_seconds: other.l2.ttl_seconds.or(self.l2.ttl_seconds),
                compression: other.l2.compression.or(self.l2.compression),
                key_prefix: other.l2.key_prefix.or(self.l2.key_prefix),
            },
            l3: L3Overrides {
                enabled: other.l3.enabled.or(self.l3.enabled),
                ttl_seconds: other.l3.ttl_seconds.or(self.l3.ttl_seconds),
            },
            stats_interval_seconds: other.stats_interval_seconds.or(self.stats_interval_seconds),
        }
    }

    fn apply_to(self, config: &mut CacheConfig) {
        let Self {
            l1,
            l2,
            l3,
            stats_interval_seconds,
        } = self;

        if let Some(v) = l1.enabled {
            config.l1.enabled = v;
        }
        if let Some(v) = l1.ttl_seconds {
            config.l1.ttl_seconds = v;
        }
        if let Some(v) = l1.max_keys {
            config.l1.max_keys = v;
        }
        if let Some(v) = l1.check_period_seconds {
            config.l1.check_period_seconds = v;
        }

        if let Some(v) = l2.enabled {
            config.l2.enabled = v;
        }
        if let Some(v) = l2.ttl_seconds {
            config.l2.ttl_seconds = v;
        }
        if let Some(v) = l2.compression {
            config.l2.compression = v;
        }
        if let Some(v) = l2.key_prefix {
            config.l2.key_prefix = v;
        }

        if let Some(v) = l3.enabled {
            config.l3.enabled = v;
        }
        if let Some(v) = l3.ttl_seconds {
            config.l3.ttl_seconds = v;
        }

        if let Some(v) = stats_interval_seconds {
            config.stats_interval_seconds = v;
        }
    }
}

// =============================================================================
// Presets
// =============================================================================

/// Named configuration profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CachePreset {
    /// Short-lived results of external API calls
    ExternalApi,
    /// User session data; kept uncompressed for cheap reads
    Session,
    /// Expensive computed aggregates
    Computed,
    /// Rarely-changing reference/lookup data
    Reference,
}

impl CachePreset {
    /// All presets
    pub const ALL: [CachePreset; 4] = [
        CachePreset::ExternalApi,
        CachePreset::Session,
        CachePreset::Computed,
        CachePreset::Reference,
    ];

    /// Preset name
    pub fn name(&self) -> &'static str {
        match self {
            CachePreset::ExternalApi => "external-api",
            CachePreset::Session => "session",
            CachePreset::Computed => "computed",
            CachePreset::Reference => "reference",
        }
    }

    /// Fields this preset overrides; everything else keeps its default
    pub fn overrides(&self) -> CacheConfigOverrides {
        match self {
            CachePreset::ExternalApi => CacheConfigOverrides {
                l1: L1Overrides {
                    ttl_seconds: Some(60),
                    ..Default::default()
                },
                l2: L2Overrides {
                    ttl_seconds: Some(300),
                    ..Default::default()
                },
                ..Default::default()
            },
            CachePreset::Session => CacheConfigOverrides {
                l1: L1Overrides {
                    ttl_seconds: Some(300),
                    ..Default::default()
                },
                l2: L2Overrides {
                    ttl_seconds: Some(86_400),
                    compression: Some(false),
                    key_prefix: Some("session:".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            },
            CachePreset::Computed => CacheConfigOverrides {
                l1: L1Overrides {
                    ttl_seconds: Some(600),
                    ..Default::default()
                },
                l2: L2Overrides {
                    ttl_seconds: Some(7_200),
                    ..Default::default()
                },
                ..Default::default()
            },
            CachePreset::Reference => CacheConfigOverrides {
                l1: L1Overrides {
                    ttl_seconds: Some(3_600),
                    max_keys: Some(50_000),
                    ..Default::default()
                },
                l2: L2Overrides {
                    ttl_seconds: Some(86_400),
                    ..Default::default()
                },
                ..Default::default()
            },
        }
    }
}

impl std::fmt::Display for CachePreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for CachePreset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CachePreset::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::Config(format!("unknown cache preset: {}", s)))
    }
}

// =============================================================================
// Tests
// =============================================================================
