use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clinicdesk_core::infra::cache::{clinic_key, clinic_prefix, ResponseCache};
use clinicdesk_core::ports::clock::Clock;
use serde_json::{json, Value};

struct FakeClock(AtomicI64);

impl FakeClock {
    fn advance(&self, ms: i64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_epoch_ms(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

fn cache() -> (Arc<FakeClock>, ResponseCache) {
    let clock = Arc::new(FakeClock(AtomicI64::new(1_000)));
    let cache = ResponseCache::new(clock.clone(), Duration::from_secs(60));
    (clock, cache)
}

#[test]
fn entries_expire_with_the_clock() {
    let (clock, cache) = cache();
    cache.insert("k", json!(1), None);
    cache.insert("short", json!(2), Some(Duration::from_secs(5)));

    assert_eq!(cache.get("k"), Some(json!(1)));

    clock.advance(5_000);
    assert_eq!(cache.get("short"), None);
    assert_eq!(cache.get("k"), Some(json!(1)));

    clock.advance(55_000);
    assert_eq!(cache.get("k"), None);

    let stats = cache.stats();
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.entries, 0);
}

#[test]
fn prefix_invalidation_is_scoped_to_one_clinic() {
    let (_, cache) = cache();
    cache.insert(clinic_key(1, "costs", "summary"), json!(1), None);
    cache.insert(clinic_key(1, "costs", "quote"), json!(2), None);
    cache.insert(clinic_key(11, "costs", "summary"), json!(3), None);
    cache.insert(clinic_key(1, "plans", "all"), json!(4), None);

    assert_eq!(cache.invalidate_prefix(&clinic_prefix(1, "costs")), 2);
    assert_eq!(cache.stats().entries, 2);
    assert!(cache.get(&clinic_key(11, "costs", "summary")).is_some());

    assert!(cache.invalidate(&clinic_key(1, "plans", "all")));
    assert!(!cache.invalidate("missing"));
    assert_eq!(cache.clear(), 1);
}

#[test]
fn sweep_drops_only_expired_entries() {
    let (clock, cache) = cache();
    cache.insert("a", json!("a"), Some(Duration::from_secs(1)));
    cache.insert("b", json!("b"), Some(Duration::from_secs(10)));

    clock.advance(2_000);
    assert_eq!(cache.sweep(), 1);
    assert_eq!(cache.stats().entries, 1);
}

#[tokio::test]
async fn loader_runs_once_and_errors_are_not_cached() {
    let (_, cache) = cache();
    let calls = AtomicUsize::new(0);

    for _ in 0..3 {
        let v: Result<Value, String> = cache
            .get_or_try_insert("k", None, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!({ "n": 1 }))
            })
            .await;
        assert_eq!(v.unwrap()["n"], 1);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let failed: Result<Value, String> = cache
        .get_or_try_insert("bad", None, || async { Err("down".to_string()) })
        .await;
    assert_eq!(failed.unwrap_err(), "down");
    assert!(cache.get("bad").is_none());
}

#[tokio::test]
async fn invalidation_during_a_load_discards_the_loaded_value() {
    let (_, cache) = cache();
    let key = clinic_key(1, "costs", "summary");

    let v: Result<Value, String> = cache
        .get_or_try_insert(&key, None, || async {
            // a cost write lands while the summary is being computed
            cache.invalidate_prefix(&clinic_prefix(1, "costs"));
            Ok(json!({ "total": 100 }))
        })
        .await;

    assert_eq!(v.unwrap()["total"], 100);
    assert!(cache.get(&key).is_none());

    let fresh: Result<Value, String> =
        cache.get_or_try_insert(&key, None, || async { Ok(json!({ "total": 120 })) }).await;
    assert_eq!(fresh.unwrap()["total"], 120);
    assert_eq!(cache.get(&key), Some(json!({ "total": 120 })));
}

#[tokio::test]
async fn sweeper_stops_when_cache_is_dropped() {
    let (clock, cache) = cache();
    let cache = Arc::new(cache);
    cache.insert("a", json!(1), Some(Duration::from_secs(1)));

    let handle = cache.spawn_sweeper(Duration::from_millis(10));
    clock.advance(5_000);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(cache.stats().entries, 0);

    drop(cache);
    tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
}
