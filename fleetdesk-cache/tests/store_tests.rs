use fleetdesk_cache::{CacheConfig, CacheError, CacheKey, CacheStore, KeyPattern};
use fleetdesk_types::TenantId;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn tenant(id: &str) -> TenantId {
    TenantId::new(id)
}

fn key(resource: &str, qualifier: &str, t: &str) -> CacheKey {
    CacheKey::new(resource, qualifier, tenant(t))
}

const MINUTE: Duration = Duration::from_secs(60);

// ── get / set ────────────────────────────────────────────────────

#[tokio::test]
async fn get_absent_is_miss() {
    let cache = CacheStore::default();
    assert_eq!(cache.get(&key("contracts", "list", "T1")).await, None);
}

#[tokio::test]
async fn set_then_get() {
    let cache = CacheStore::default();
    let k = key("contracts", "list", "T1");
    cache.set(k.clone(), json!([1, 2, 3]), MINUTE).await;
    assert_eq!(cache.get(&k).await, Some(json!([1, 2, 3])));
}

#[tokio::test]
async fn set_overwrites() {
    let cache = CacheStore::default();
    let k = key("contracts", "list", "T1");
    cache.set(k.clone(), json!(1), MINUTE).await;
    cache.set(k.clone(), json!(2), MINUTE).await;
    assert_eq!(cache.get(&k).await, Some(json!(2)));
    assert_eq!(cache.len().await, 1);
}

#[tokio::test(start_paused = true)]
async fn entry_expires_exactly_at_ttl() {
    let cache = CacheStore::default();
    let k = key("vehicles", "list", "T1");
    cache.set(k.clone(), json!("v"), Duration::from_millis(1000)).await;

    tokio::time::advance(Duration::from_millis(999)).await;
    assert_eq!(cache.get(&k).await, Some(json!("v")));

    tokio::time::advance(Duration::from_millis(2)).await;
    assert_eq!(cache.get(&k).await, None);
    // The expired read evicted the entry.
    assert_eq!(cache.len().await, 0);
}

#[tokio::test(start_paused = true)]
async fn oversized_ttl_is_clamped_instead_of_overflowing() {
    let cache = CacheStore::default();
    let config: CacheConfig = serde_json::from_value(json!({"query_ttl_ms": u64::MAX})).unwrap();
    let a = key("contracts", "list", "T1");
    let b = key("contracts", "detail", "T1");

    cache.set(a.clone(), json!(1), Duration::MAX).await;
    cache.set(b.clone(), json!(2), config.query_ttl()).await;

    tokio::time::advance(Duration::from_secs(86_400)).await;
    assert_eq!(cache.get(&a).await, Some(json!(1)));
    assert_eq!(cache.get(&b).await, Some(json!(2)));
    assert_eq!(cache.purge_expired().await, 0);
}

#[tokio::test(start_paused = true)]
async fn purge_expired_drops_only_stale_entries() {
    let cache = CacheStore::default();
    cache.set(key("a", "x", "T1"), json!(1), Duration::from_secs(1)).await;
    cache.set(key("b", "x", "T1"), json!(2), Duration::from_secs(10)).await;

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(cache.purge_expired().await, 1);
    assert_eq!(cache.len().await, 1);
    assert_eq!(cache.get(&key("b", "x", "T1")).await, Some(json!(2)));
}

#[tokio::test]
async fn typed_get_and_set() {
    let cache = CacheStore::default();
    let k = key("customers", "count", "T1");
    cache.set_from(k.clone(), &42u32, MINUTE).await.unwrap();
    let value: Option<u32> = cache.get_as(&k).await.unwrap();
    assert_eq!(value, Some(42));

    let wrong: Result<Option<String>, _> = cache.get_as(&k).await;
    assert!(matches!(wrong, Err(CacheError::Serialization(_))));
}

// ── invalidation ─────────────────────────────────────────────────

#[tokio::test]
async fn invalidate_reports_existence() {
    let cache = CacheStore::default();
    let k = key("contracts", "list", "T1");
    cache.set(k.clone(), json!(1), MINUTE).await;
    assert!(cache.invalidate(&k).await);
    assert!(!cache.invalidate(&k).await);
}

#[tokio::test]
async fn invalidate_pattern_matches_resource_and_tenant() {
    let cache = CacheStore::default();
    cache.set(key("contracts", "list", "T1"), json!(1), MINUTE).await;
    cache.set(key("contracts", "active", "T1"), json!(2), MINUTE).await;
    cache.set(key("contracts", "list", "T2"), json!(3), MINUTE).await;
    cache.set(key("customers", "list", "T1"), json!(4), MINUTE).await;

    let removed = cache
        .invalidate_pattern(&KeyPattern::resource("contracts", tenant("T1")))
        .await;
    assert_eq!(removed, 2);
    assert!(cache.get(&key("contracts", "list", "T2")).await.is_some());
    assert!(cache.get(&key("customers", "list", "T1")).await.is_some());
}

#[tokio::test]
async fn invalidate_pattern_from_text() {
    let cache = CacheStore::default();
    cache.set(key("dashboard", "summary", "T1"), json!({}), MINUTE).await;
    assert_eq!(cache.invalidate_pattern_str("dashboard:*:T1").await.unwrap(), 1);
    assert!(cache.invalidate_pattern_str("nonsense").await.is_err());
}

#[tokio::test]
async fn invalidate_tenant_leaves_other_tenants() {
    let cache = CacheStore::default();
    cache.set(key("a", "x", "T1"), json!(1), MINUTE).await;
    cache.set(CacheKey::scoped("b", tenant("T1")), json!(2), MINUTE).await;
    cache.set(key("a", "x", "T2"), json!(3), MINUTE).await;

    assert_eq!(cache.invalidate_tenant(&tenant("T1")).await, 2);
    assert_eq!(cache.len().await, 1);
}

// ── get_or_set ───────────────────────────────────────────────────

#[tokio::test]
async fn get_or_set_populates_on_miss_and_reuses() {
    let cache = CacheStore::default();
    let k = key("vehicles", "available", "T1");
    let calls = AtomicUsize::new(0);
    let calls = &calls;

    for _ in 0..3 {
        let value = cache
            .get_or_set(&k, MINUTE, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, CacheError>(json!(["v1"]))
            })
            .await
            .unwrap();
        assert_eq!(value, json!(["v1"]));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn get_or_set_collapses_concurrent_misses() {
    let cache = Arc::new(CacheStore::default());
    let k = key("contracts", "list", "T1");
    let calls = Arc::new(AtomicUsize::new(0));

    let run = |cache: Arc<CacheStore>, calls: Arc<AtomicUsize>, k: CacheKey| async move {
        let calls = &calls;
        cache
            .get_or_set(&k, MINUTE, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, CacheError>(json!("fresh"))
            })
            .await
    };

    let (a, b) = tokio::join!(
        run(cache.clone(), calls.clone(), k.clone()),
        run(cache.clone(), calls.clone(), k.clone()),
    );
    assert_eq!(a.unwrap(), json!("fresh"));
    assert_eq!(b.unwrap(), json!("fresh"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn get_or_set_error_is_not_cached() {
    let cache = CacheStore::default();
    let k = key("payments", "recent", "T1");

    let err = cache
        .get_or_set(&k, MINUTE, || async { Err::<serde_json::Value, _>("backend down") })
        .await;
    assert_eq!(err, Err("backend down"));
    assert_eq!(cache.get(&k).await, None);
}

#[tokio::test]
async fn get_or_set_as_roundtrips_typed_values() {
    let cache = CacheStore::default();
    let k = key("customers", "names", "T1");
    let names: Vec<String> = cache
        .get_or_set_as(&k, MINUTE, || async {
            Ok::<_, CacheError>(vec!["Ada".to_string(), "Lin".to_string()])
        })
        .await
        .unwrap();
    assert_eq!(names, vec!["Ada", "Lin"]);
    assert_eq!(cache.get(&k).await, Some(json!(["Ada", "Lin"])));
}

// ── config & stats ───────────────────────────────────────────────

#[test]
fn default_ttls() {
    let config = CacheConfig::default();
    assert_eq!(config.dashboard_ttl(), Duration::from_secs(180));
    assert_eq!(config.query_ttl(), Duration::from_secs(300));
}

#[test]
fn config_deserializes_partial() {
    let config: CacheConfig = serde_json::from_value(json!({"query_ttl_ms": 1000})).unwrap();
    assert_eq!(config.query_ttl(), Duration::from_secs(1));
    assert_eq!(config.dashboard_ttl(), Duration::from_secs(180));
}

#[tokio::test]
async fn stats_track_hits_and_misses() {
    let cache = CacheStore::default();
    let k = key("a", "b", "T1");
    cache.get(&k).await;
    cache.set(k.clone(), json!(1), MINUTE).await;
    cache.get(&k).await;
    cache.get(&k).await;
    cache.invalidate(&k).await;

    let stats = cache.stats().await;
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.invalidations, 1);
    assert_eq!(stats.entry_count, 0);
    assert!((stats.hit_rate() - 2.0 / 3.0).abs() < 1e-9);
}
