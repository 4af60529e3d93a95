//! Cache Entry Types
//!
//! The unit of storage in both tiers. On the remote tier an entry is stored
//! as a JSON envelope:
//!
//! ```json
//! {
//!   "data": {"name": "Ann"},
//!   "metadata": {
//!     "createdAt": "2024-05-01T10:00:00Z",
//!     "accessCount": 0,
//!     "lastAccessed": "2024-05-01T10:00:00Z",
//!     "version": "1.0",
//!     "compressed": true
//!   }
//! }
//! ```
//!
//! When `compressed` is true, `data` holds a base64 string of the gzipped
//! JSON encoding of the value instead of the value itself.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Version tag applied when the caller does not supply one
pub const DEFAULT_VERSION: &str = "1.0";

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

/// Metadata carried with every entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    /// Set once, at first write
    pub created_at: DateTime<Utc>,
    /// Incremented on L1 hits (best effort under concurrency)
    #[serde(default)]
    pub access_count: u64,
    /// Updated on L1 hits
    pub last_accessed: DateTime<Utc>,
    /// Caller-supplied logical version
    #[serde(default = "default_version")]
    pub version: String,
    /// Only present on remote payloads whose `data` was gzip-compressed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compressed: Option<bool>,
}

impl EntryMetadata {
    /// Create fresh metadata stamped with the current time
    pub fn new(version: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            access_count: 0,
            last_accessed: now,
            version: version.into(),
            compressed: None,
        }
    }

    /// Whether the payload is marked as compressed
    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.compressed == Some(true)
    }
}

impl Default for EntryMetadata {
    fn default() -> Self {
        Self::new(DEFAULT_VERSION)
    }
}

/// Cache entry containing data and metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// The cached value
    pub data: T,
    /// Entry metadata
    pub metadata: EntryMetadata,
}

impl<T> CacheEntry<T> {
    /// Create a new entry under the given version
    pub fn new(data: T, version: impl Into<String>) -> Self {
        Self {
            data,
            metadata: EntryMetadata::new(version),
        }
    }

    /// Create an entry with existing metadata
    pub fn with_metadata(data: T, metadata: EntryMetadata) -> Self {
        Self { data, metadata }
    }

    /// Logical version of the entry
    #[inline]
    pub fn version(&self) -> &str {
        &self.metadata.version
    }

    /// Returns true if the entry was written under `version`
    #[inline]
    pub fn matches_version(&self, version: &str) -> bool {
        self.metadata.version == version
    }
}

impl CacheEntry<serde_json::Value> {
    /// Build a JSON-valued entry from any serializable value
    pub fn from_serializable<T: Serialize>(
        data: &T,
        version: impl Into<String>,
    ) -> crate::error::Result<Self> {
        Ok(Self::new(serde_json::to_value(data)?, version))
    }

    /// Decode the JSON value into the caller's type
    pub fn decode<T: DeserializeOwned>(self) -> crate::error::Result<CacheEntry<T>> {
        Ok(CacheEntry {
            data: serde_json::from_value(self.data)?,
            metadata: self.metadata,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
