//! L2 Cache - Remote Tier Adapter
//!
//! Thin adapter over a [`RemoteStore`]. Owns the wire format of stored
//! entries: a JSON envelope whose `data` field is optionally gzip-compressed
//! and base64-encoded (see [`super::entry`]).
//!
//! Payloads that cannot be parsed are treated as a miss and deleted so the
//! next write replaces them.
//!
//! Reads decompress whenever the stored `compressed` marker is set, even if
//! `L2Config::compression` is off locally, so instances with different
//! compression settings can share one store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::compression::GzipCodec;
use super::config::L2Config;
use super::entry::CacheEntry;
use super::store::RemoteStore;
use crate::error::{Error, Result};

/// L2 Cache - remote tier adapter
pub struct L2Cache {
    /// Backing key-value store
    store: Arc<dyn RemoteStore>,
    /// Configuration
    config: L2Config,
    /// Payload compression
    codec: GzipCodec,
    /// Corrupt payloads found (and removed) on read
    corrupt_entries: AtomicU64,
}

impl L2Cache {
    /// Create an adapter over `store`
    pub fn new(store: Arc<dyn RemoteStore>, config: L2Config) -> Self {
        Self {
            store,
            config,
            codec: GzipCodec::new(),
            corrupt_entries: AtomicU64::new(0),
        }
    }

    /// Serialize an entry into its stored form
    pub fn encode(&self, entry: &CacheEntry<Value>) -> Result<String> {
        if !self.config.compression {
            return Ok(serde_json::to_string(entry)?);
        }

        let plain = serde_json::to_vec(&entry.data)?;
        match self.codec.compress_to_base64(&plain) {
            Ok(encoded) => {
                let mut metadata = entry.metadata.clone();
                metadata.compressed = Some(true);
                let stored = CacheEntry::with_metadata(Value::String(encoded), metadata);
                Ok(serde_json::to_string(&stored)?)
            }
            Err(e) => {
                warn!(error = %e, "compression failed, storing payload uncompressed");
                Ok(serde_json::to_string(entry)?)
            }
        }
    }

    /// Parse a stored payload back into an entry
    ///
    /// The `compressed` marker is authoritative: a compressed payload is
    /// decoded even if this process has compression turned off.
    pub fn decode(&self, raw: &str) -> Result<CacheEntry<Value>> {
        let mut entry: CacheEntry<Value> = serde_json::from_str(raw)?;

        if entry.metadata.is_compressed() {
            let encoded = entry.data.as_str().ok_or_else(|| Error::DecompressionFailed {
                algorithm: "gzip".into(),
                reason: "compressed payload is not a string".into(),
            })?;
            let plain = self.codec.decompress_from_base64(encoded)?;
            entry.data = serde_json::from_slice(&plain)?;
            entry.metadata.compressed = None;
        }

        Ok(entry)
    }

    /// Get an entry
    ///
    /// `Err` means the store itself failed; corrupt payloads come back as
    /// `Ok(None)` after being deleted.
    pub async fn get(&self, full_key: &str) -> Result<Option<CacheEntry<Value>>> {
        let Some(raw) = self.store.get(full_key).await? else {
            return Ok(None);
        };

        match self.decode(&raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                self.corrupt_entries.fetch_add(1, Ordering::Relaxed);
                warn!(key = %full_key, error = %e, "corrupt l2 payload, deleting");
                if let Err(del_err) = self.store.del(full_key).await {
                    warn!(key = %full_key, error = %del_err, "failed to delete corrupt l2 payload");
                }
                Ok(None)
            }
        }
    }

    /// Store an entry with the given TTL
    pub async fn set(&self, full_key: &str, entry: &CacheEntry<Value>, ttl_seconds: u64) -> Result<()> {
        let payload = self.encode(entry)?;
        debug!(key = %full_key, bytes = payload.len(), ttl_seconds, "l2 write");
        self.store.set_with_expiry(full_key, ttl_seconds, payload).await
    }

    /// Delete an entry; returns true if it existed
    pub async fn delete(&self, full_key: &str) -> Result<bool> {
        self.store.del(full_key).await
    }

    /// Delete many entries; returns how many existed
    pub async fn delete_many(&self, full_keys: &[String]) -> Result<u64> {
        if full_keys.is_empty() {
            return Ok(0);
        }
        self.store.del_many(full_keys).await
    }

    /// Keys matching a glob pattern
    pub async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        self.store.keys(pattern).await
    }

    /// Probe the store; fails unless it answers `PONG`
    pub async fn ping(&self) -> Result<()> {
        let reply = self.store.ping().await?;
        if reply.eq_ignore_ascii_case("PONG") {
            Ok(())
        } else {
            Err(Error::Remote(format!("unexpected ping reply: {}", reply)))
        }
    }

    /// Whether the store answers a ping
    pub async fn is_alive(&self) -> bool {
        self.ping().await.is_ok()
    }

    /// Corrupt payloads removed so far
    pub fn corrupt_entries(&self) -> u64 {
        self.corrupt_entries.load(Ordering::Relaxed)
    }

    /// Get configuration
    pub fn config(&self) -> &L2Config {
        &self.config
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::InMemoryRemoteStore;
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn make_l2(compression: bool) -> (Arc<InMemoryRemoteStore>, L2Cache) {
        let store = Arc::new(InMemoryRemoteStore::new());
        let config = L2Config {
            compression,
            ..Default::default()
        };
        (store.clone(), L2Cache::new(store, config))
    }

    fn profile() -> CacheEntry<Value> {
        CacheEntry::new(json!({"name": "Ann", "tags": ["a", "b", "c"]}), "1.0")
    }

    #[tokio::test]
    async fn test_l2_roundtrip_uncompressed() {
        let (store, l2) = make_l2(false);
        let entry = profile();

        assert_ok!(l2.set("cache:p:u1", &entry, 60).await);

        let raw: Value = serde_json::from_str(&store.get_raw("cache:p:u1").unwrap()).unwrap();
        assert_eq!(raw["data"]["name"], "Ann");
        assert!(raw["metadata"].get("compressed").is_none());

        let read = l2.get("cache:p:u1").await.unwrap().unwrap();
        assert_eq!(read, entry);
    }

    #[tokio::test]
    async fn test_l2_compresses_data_field_only() {
        let (store, l2) = make_l2(true);
        let entry = profile();

        l2.set("cache:p:u1", &entry, 60).await.unwrap();

        let raw: Value = serde_json::from_str(&store.get_raw("cache:p:u1").unwrap()).unwrap();
        assert!(raw["data"].is_string());
        assert_eq!(raw["metadata"]["compressed"], true);
        assert_eq!(raw["metadata"]["version"], "1.0");

        let read = l2.get("cache:p:u1").await.unwrap().unwrap();
        assert_eq!(read.data, entry.data);
        assert_eq!(read.metadata.compressed, None);
    }

    #[tokio::test]
    async fn test_l2_reads_compressed_payload_with_compression_off() {
        let (store, writer) = make_l2(true);
        writer.set("cache:p:u1", &profile(), 60).await.unwrap();

        let reader = L2Cache::new(store, L2Config {
            compression: false,
            ..Default::default()
        });
        let read = reader.get("cache:p:u1").await.unwrap().unwrap();
        assert_eq!(read.data["name"], "Ann");
    }

    #[tokio::test]
    async fn test_l2_corrupt_payload_is_deleted() {
        let (store, l2) = make_l2(true);
        store.insert_raw("cache:p:bad", "{not json", Duration::from_secs(60));

        assert!(l2.get("cache:p:bad").await.unwrap().is_none());
        assert!(store.get_raw("cache:p:bad").is_none());
        assert_eq!(l2.corrupt_entries(), 1);
    }

    #[tokio::test]
    async fn test_l2_corrupt_compressed_data_is_deleted() {
        let (store, l2) = make_l2(true);
        let raw = json!({
            "data": "definitely-not-gzip",
            "metadata": {
                "createdAt": "2024-05-01T10:00:00Z",
                "lastAccessed": "2024-05-01T10:00:00Z",
                "accessCount": 0,
                "version": "1.0",
                "compressed": true
            }
        });
        store.insert_raw("cache:p:bad", raw.to_string(), Duration::from_secs(60));

        assert!(l2.get("cache:p:bad").await.unwrap().is_none());
        assert!(store.get_raw("cache:p:bad").is_none());
    }

    #[tokio::test]
    async fn test_l2_store_failure_is_an_error() {
        let (store, l2) = make_l2(true);
        store.set_available(false);

        assert_matches!(l2.get("cache:p:u1").await, Err(Error::Remote(_)));
        assert_err!(l2.ping().await);
        assert!(!l2.is_alive().await);
    }

    #[tokio::test]
    async fn test_l2_keys_and_delete_many() {
        let (_store, l2) = make_l2(false);
        for i in 0..4 {
            l2.set(&format!("cache:a:{}", i), &profile(), 60).await.unwrap();
        }
        l2.set("cache:b:0", &profile(), 60).await.unwrap();

        let keys = l2.keys_matching("cache:a:*").await.unwrap();
        assert_eq!(keys.len(), 4);
        assert_eq!(l2.delete_many(&keys).await.unwrap(), 4);
        assert_eq!(l2.delete_many(&[]).await.unwrap(), 0);
        assert!(l2.get("cache:b:0").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_l2_ping() {
        let (_store, l2) = make_l2(false);
        assert_ok!(l2.ping().await);
        assert!(l2.is_alive().await);
    }
}
