//! Remote Store Interface
//!
//! The network key-value service behind the L2 tier is an external
//! collaborator. Any service that implements [`RemoteStore`] is a valid L2
//! backend; [`super::redis_store::RedisStore`] is the production one and
//! [`InMemoryRemoteStore`] backs tests and local development.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use super::clamp_ttl;
use crate::error::{Error, Result};

/// Asynchronous key-value store consumed by the L2 tier
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Get a raw value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a raw value that expires after `ttl_seconds`
    async fn set_with_expiry(&self, key: &str, ttl_seconds: u64, value: String) -> Result<()>;

    /// Delete a key; returns true if it existed
    async fn del(&self, key: &str) -> Result<bool>;

    /// Delete many keys; returns how many existed
    async fn del_many(&self, keys: &[String]) -> Result<u64> {
        let mut deleted = 0;
        for key in keys {
            if self.del(key).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// List keys matching a glob pattern (`*` and `?` wildcards)
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Liveness probe; a healthy store answers `PONG`
    async fn ping(&self) -> Result<String>;
}

/// Glob matching with `*` (any run) and `?` (any single char)
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<usize> = None;
    let mut mark = 0;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

// =============================================================================
// In-Memory Store
// =============================================================================

struct StoredValue {
    value: String,
    expires_at: Instant,
}

/// In-memory remote store for testing
///
/// Expiry follows `tokio::time`, so paused-time tests control it. The store
/// can be switched "offline" to make every operation fail.
pub struct InMemoryRemoteStore {
    storage: DashMap<String, StoredValue>,
    available: AtomicBool,
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self {
            storage: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemoryRemoteStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the store going down (`false`) or coming back (`true`)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Whether the store currently answers requests
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Write a raw value directly, bypassing availability checks
    pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<String>, ttl: Duration) {
        self.storage.insert(
            key.into(),
            StoredValue {
                value: value.into(),
                expires_at: Instant::now() + clamp_ttl(ttl),
            },
        );
    }

    /// Read a raw value directly, bypassing availability checks
    pub fn get_raw(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.storage
            .get(key)
            .filter(|v| v.expires_at > now)
            .map(|v| v.value.clone())
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.storage.iter().filter(|v| v.expires_at > now).count()
    }

    /// Check if the store holds no live keys
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(Error::Remote("connection refused".into()))
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_available()?;

        let now = Instant::now();
        let expired = match self.storage.get(key) {
            Some(stored) if stored.expires_at > now => return Ok(Some(stored.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.storage.remove(key);
        }
        Ok(None)
    }

    async fn set_with_expiry(&self, key: &str, ttl_seconds: u64, value: String) -> Result<()> {
        self.check_available()?;
        self.insert_raw(key, value, Duration::from_secs(ttl_seconds));
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool> {
        self.check_available()?;

        let now = Instant::now();
        Ok(self
            .storage
            .remove(key)
            .is_some_and(|(_, stored)| stored.expires_at > now))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.check_available()?;

        let now = Instant::now();
        Ok(self
            .storage
            .iter()
            .filter(|entry| entry.expires_at > now && glob_match(pattern, entry.key()))
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn ping(&self) -> Result<String> {
        self.check_available()?;
        Ok("PONG".to_string())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("cache:a:*", "cache:a:1"));
        assert!(glob_match("cache:a:*", "cache:a:"));
        assert!(!glob_match("cache:a:*", "cache:ab:1"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("k?y", "key"));
        assert!(!glob_match("k?y", "kety"));
        assert!(glob_match("a*b*c", "axxbyyc"));
        assert!(!glob_match("a*b*c", "axxbyy"));
        assert!(glob_match("exact", "exact"));
    }

    #[tokio::test]
    async fn test_in_memory_basic_ops() {
        let store = InMemoryRemoteStore::new();

        store.set_with_expiry("k1", 60, "v1".into()).await.unwrap();
        assert_eq!(store.get("k1").await.unwrap(), Some("v1".to_string()));
        assert_eq!(store.get("k2").await.unwrap(), None);

        assert!(store.del("k1").await.unwrap());
        assert!(!store.del("k1").await.unwrap());
        assert_eq!(store.ping().await.unwrap(), "PONG");
    }

    #[tokio::test]
    async fn test_in_memory_keys_and_del_many() {
        let store = InMemoryRemoteStore::new();
        for i in 0..3 {
            store.set_with_expiry(&format!("cache:a:{}", i), 60, "x".into()).await.unwrap();
        }
        store.set_with_expiry("cache:b:0", 60, "y".into()).await.unwrap();

        let mut keys = store.keys("cache:a:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["cache:a:0", "cache:a:1", "cache:a:2"]);

        assert_eq!(store.del_many(&keys).await.unwrap(), 3);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_memory_expiry() {
        let store = InMemoryRemoteStore::new();
        store.set_with_expiry("k", 10, "v".into()).await.unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;

        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.keys("*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_huge_ttl_does_not_overflow() {
        let store = InMemoryRemoteStore::new();
        store.set_with_expiry("k", u64::MAX, "v".into()).await.unwrap();
        store.insert_raw("raw", "v", Duration::MAX);

        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        assert_eq!(store.get_raw("raw").as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_in_memory_unavailable() {
        let store = InMemoryRemoteStore::new();
        store.set_available(false);

        assert_matches!(store.get("k").await, Err(Error::Remote(_)));
        assert_matches!(store.ping().await, Err(Error::Remote(_)));
        assert_matches!(
            store.set_with_expiry("k", 1, "v".into()).await,
            Err(Error::Remote(_))
        );

        store.set_available(true);
        assert!(store.ping().await.is_ok());
    }
}
