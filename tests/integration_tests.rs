//! tiercache Integration Tests
//!
//! End-to-end behaviour through the public API:
//! - Feature 1: Tiered reads, promotion and versioning
//! - Feature 2: Graceful degradation
//! - Feature 3: Namespaces, warm-up and stats
//! - Feature 4: Configuration and lifecycle

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tiercache::cache::{
    CacheConfig, CacheConfigOverrides, CacheManager, CachePreset, GetOptions, InMemoryRemoteStore,
    L1Config, L2Config, SetOptions, WarmItem,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Profile {
    name: String,
}

fn profile(name: &str) -> Profile {
    Profile { name: name.into() }
}

fn config(l1_ttl: u64, l2_ttl: u64) -> CacheConfig {
    CacheConfig {
        l1: L1Config {
            ttl_seconds: l1_ttl,
            ..Default::default()
        },
        l2: L2Config {
            ttl_seconds: l2_ttl,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn make_manager(config: CacheConfig) -> (Arc<InMemoryRemoteStore>, CacheManager) {
    let store = Arc::new(InMemoryRemoteStore::new());
    let manager = CacheManager::new(config, store.clone()).unwrap();
    (store, manager)
}

// =============================================================================
// Feature 1: Tiered Reads
// =============================================================================

mod tiered_read_tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip() {
        let (_store, manager) = make_manager(config(60, 300));

        manager
            .set("profiles", "u1", &profile("Ann"), SetOptions::new().with_ttl(60))
            .await;
        let found: Option<Profile> = manager.get("profiles", "u1", GetOptions::new()).await;

        assert_eq!(found, Some(profile("Ann")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_l1_expiry_served_from_l2() {
        let (_store, manager) = make_manager(config(60, 300));
        manager
            .set("profiles", "u1", &profile("Ann"), SetOptions::new())
            .await;

        let first: Option<Profile> = manager.get("profiles", "u1", GetOptions::new()).await;
        assert_eq!(first, Some(profile("Ann")));

        // Past the L1 TTL, within the L2 TTL
        tokio::time::advance(Duration::from_secs(90)).await;

        let second: Option<Profile> = manager.get("profiles", "u1", GetOptions::new()).await;
        assert_eq!(second, Some(profile("Ann")));
        assert!(manager.stats().l2.hits >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_promotion_on_l2_hit() {
        let (_store, manager) = make_manager(config(60, 300));
        manager
            .set("profiles", "u1", &profile("Ann"), SetOptions::new())
            .await;
        manager.l1().flush_all();

        let _: Option<Profile> = manager.get("profiles", "u1", GetOptions::new()).await;
        assert!(manager.l1().contains(&manager.full_key("profiles", "u1")));

        let _: Option<Profile> = manager.get("profiles", "u1", GetOptions::new()).await;
        let stats = manager.stats();
        assert_eq!(stats.l2.hits, 1);
        assert_eq!(stats.l1.hits, 1);
        assert_eq!(stats.promotions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_expiry_is_a_miss() {
        let (_store, manager) = make_manager(config(60, 300));
        manager
            .set("profiles", "u1", &profile("Ann"), SetOptions::new())
            .await;

        tokio::time::advance(Duration::from_secs(301)).await;

        let found: Option<Profile> = manager.get("profiles", "u1", GetOptions::new()).await;
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_staleness_forces_reload() {
        let (store, manager) = make_manager(config(60, 300));
        manager
            .set(
                "profiles",
                "u1",
                &profile("Old"),
                SetOptions::new().with_version("1.0"),
            )
            .await;
        manager.l1().flush_all();

        let calls = AtomicUsize::new(0);
        let value = manager
            .get_or_load(
                "profiles",
                "u1",
                GetOptions::new().with_version("2.0"),
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(Some(profile("New")))
                },
            )
            .await
            .unwrap();

        assert_eq!(value, Some(profile("New")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let raw: serde_json::Value =
            serde_json::from_str(&store.get_raw("cache:profiles:u1").unwrap()).unwrap();
        assert_eq!(raw["metadata"]["version"], "2.0");
        assert_eq!(manager.stats().stale_invalidations, 1);
    }

    #[tokio::test]
    async fn test_second_instance_reads_through_shared_l2() {
        let store = Arc::new(InMemoryRemoteStore::new());
        let writer = CacheManager::new(config(60, 300), store.clone()).unwrap();
        let reader = CacheManager::new(config(60, 300), store.clone()).unwrap();

        writer
            .set("profiles", "u1", &profile("Ann"), SetOptions::new())
            .await;

        let found: Option<Profile> = reader.get("profiles", "u1", GetOptions::new()).await;
        assert_eq!(found, Some(profile("Ann")));
        assert_eq!(reader.stats().l2.hits, 1);
    }

    #[tokio::test]
    async fn test_compressed_wire_format() {
        let (store, manager) = make_manager(config(60, 300));
        manager
            .set("profiles", "u1", &profile("Ann"), SetOptions::new())
            .await;

        let raw: serde_json::Value =
            serde_json::from_str(&store.get_raw("cache:profiles:u1").unwrap()).unwrap();
        assert!(raw["data"].is_string());
        assert_eq!(raw["metadata"]["compressed"], true);
        assert!(raw["metadata"]["createdAt"].is_string());
        assert!(raw["metadata"]["lastAccessed"].is_string());
        assert_eq!(raw["metadata"]["accessCount"], 0);
    }

    #[tokio::test]
    async fn test_concurrent_misses_are_not_coalesced() {
        let (_store, manager) = make_manager(config(60, 300));
        let calls = AtomicUsize::new(0);
        let (manager, calls) = (&manager, &calls);

        let lookups = (0..5).map(|_| {
            manager.get_or_load("profiles", "hot", GetOptions::new(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                Ok::<_, String>(Some(profile("Ann")))
            })
        });
        let results = futures::future::join_all(lookups).await;

        assert!(results
            .iter()
            .all(|r| r.as_ref().ok() == Some(&Some(profile("Ann")))));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }
}

// =============================================================================
// Feature 2: Graceful Degradation
// =============================================================================

mod degradation_tests {
    use super::*;
    use tiercache::monitoring::HealthStatus;

    #[tokio::test]
    async fn test_l2_down_falls_back_to_loader() {
        let (store, manager) = make_manager(config(60, 300));
        store.set_available(false);

        let value = manager
            .get_or_load("profiles", "u1", GetOptions::new(), || async {
                Ok::<_, String>(Some(profile("Ann")))
            })
            .await;

        assert_eq!(value, Ok(Some(profile("Ann"))));
    }

    #[tokio::test]
    async fn test_l2_down_without_loader_is_none() {
        let (store, manager) = make_manager(config(60, 300));
        store.set_available(false);

        let found: Option<Profile> = manager.get("profiles", "u1", GetOptions::new()).await;
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_degraded_health_keeps_serving() {
        let (store, manager) = make_manager(config(60, 300));
        store.set_available(false);

        let report = manager.health().await;
        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(report.status.is_operational());

        manager
            .set("profiles", "u1", &profile("Ann"), SetOptions::new())
            .await;
        let found: Option<Profile> = manager.get("profiles", "u1", GetOptions::new()).await;
        assert_eq!(found, Some(profile("Ann")));

        store.set_available(true);
        assert_eq!(manager.health().await.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_corrupt_payload_self_heals() {
        let (store, manager) = make_manager(config(60, 300));
        store.insert_raw("cache:profiles:u1", "not json at all", Duration::from_secs(60));

        let value = manager
            .get_or_load("profiles", "u1", GetOptions::new(), || async {
                Ok::<_, String>(Some(profile("Ann")))
            })
            .await
            .unwrap();
        assert_eq!(value, Some(profile("Ann")));

        // The corrupt value was replaced by the loaded one
        let raw: serde_json::Value =
            serde_json::from_str(&store.get_raw("cache:profiles:u1").unwrap()).unwrap();
        assert_eq!(raw["metadata"]["version"], "1.0");
    }
}

// =============================================================================
// Feature 3: Namespaces, Warm-up and Stats
// =============================================================================

mod namespace_and_stats_tests {
    use super::*;

    #[tokio::test]
    async fn test_clear_scoping() {
        let (store, manager) = make_manager(config(60, 300));
        for i in 0..10 {
            manager.set("a", &format!("k{}", i), &i, SetOptions::new()).await;
        }
        for i in 0..5 {
            manager.set("b", &format!("k{}", i), &i, SetOptions::new()).await;
        }

        manager.clear("a").await;

        for i in 0..10 {
            let v: Option<i32> = manager.get("a", &format!("k{}", i), GetOptions::new()).await;
            assert!(v.is_none());
        }
        for i in 0..5 {
            let v: Option<i32> = manager.get("b", &format!("k{}", i), GetOptions::new()).await;
            assert_eq!(v, Some(i));
        }
        assert_eq!(store.len(), 5);
    }

    #[tokio::test]
    async fn test_clear_with_no_matches() {
        let manager = CacheManager::in_memory();
        assert_eq!(manager.clear("empty").await, 0);
    }

    #[tokio::test]
    async fn test_warm_up_then_read() {
        let (_store, manager) = make_manager(config(60, 300));

        let warmed = manager
            .warm_up("countries", || async {
                Ok::<_, String>(vec![
                    WarmItem::new("de", "Germany".to_string()),
                    WarmItem::new("fr", "France".to_string()),
                    WarmItem::new("jp", "Japan".to_string()),
                ])
            })
            .await;
        assert_eq!(warmed, 3);

        let fr: Option<String> = manager.get("countries", "fr", GetOptions::new()).await;
        assert_eq!(fr.as_deref(), Some("France"));
    }

    #[tokio::test]
    async fn test_stats_hit_ratio() {
        let (_store, manager) = make_manager(config(60, 300));
        manager.set("p", "u1", &profile("Ann"), SetOptions::new()).await;

        // 2 L1 hits
        for _ in 0..2 {
            let _: Option<Profile> = manager.get("p", "u1", GetOptions::new()).await;
        }
        // 1 L1 miss + 1 L2 hit
        manager.l1().flush_all();
        let _: Option<Profile> = manager.get("p", "u1", GetOptions::new()).await;
        // 1 L1 miss + 1 L2 miss
        let _: Option<Profile> = manager.get("p", "nobody", GetOptions::new()).await;

        let stats = manager.stats();
        let (h, m) = (3.0, 3.0);
        assert_eq!(stats.total_hits, 3);
        assert_eq!(stats.total_misses, 3);
        assert!((stats.hit_ratio - 100.0 * h / (h + m)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_stats_key_counts() {
        let (_store, manager) = make_manager(config(60, 300));
        for i in 0..3 {
            manager.set("p", &format!("u{}", i), &i, SetOptions::new()).await;
        }

        assert_eq!(manager.stats().l1.keys, Some(3));
        assert_eq!(manager.stats().l2.keys, None);

        let refreshed = manager.refresh_stats().await;
        assert_eq!(refreshed.l2.keys, Some(3));
    }
}

// =============================================================================
// Feature 4: Configuration and Lifecycle
// =============================================================================

mod config_and_lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_session_preset_stores_uncompressed() {
        let store = Arc::new(InMemoryRemoteStore::new());
        let config = CacheConfig::from_preset(CachePreset::Session).unwrap();
        let manager = CacheManager::new(config, store.clone()).unwrap();

        manager
            .set("s", "abc", &profile("Ann"), SetOptions::new())
            .await;

        let raw: serde_json::Value =
            serde_json::from_str(&store.get_raw("session:s:abc").unwrap()).unwrap();
        assert_eq!(raw["data"]["name"], "Ann");
        assert!(raw["metadata"].get("compressed").is_none());
    }

    #[tokio::test]
    async fn test_yaml_overrides_on_top_of_preset() {
        let file = CacheConfigOverrides::from_yaml_str(
            r#"
l1:
  max_keys: 2
l2:
  key_prefix: "app:"
"#,
        )
        .unwrap();
        let overrides = CachePreset::ExternalApi.overrides().merge(file);
        let config = CacheConfig::resolve(overrides).unwrap();

        assert_eq!(config.l1.ttl_seconds, 60);
        assert_eq!(config.l1.max_keys, 2);
        assert_eq!(config.l2.key_prefix, "app:");

        let (store, manager) = make_manager(config);
        for i in 0..3 {
            manager.set("p", &format!("u{}", i), &i, SetOptions::new()).await;
        }
        assert_eq!(manager.l1().len(), 2);
        assert_eq!(store.len(), 3);
        assert!(store.get_raw("app:p:u0").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_and_shutdown() {
        let mut config = config(5, 300);
        config.l1.check_period_seconds = 1;
        let (_store, manager) = make_manager(config);

        manager.set("p", "u1", &1, SetOptions::new()).await;
        manager.start();

        tokio::time::sleep(Duration::from_secs(7)).await;
        // Swept, not just hidden
        assert!(manager.l1().stats().expirations >= 1);

        manager.shutdown().await;
        assert!(!manager.is_running());
        assert!(manager.l1().is_empty());
    }
}
