// Integration tests for bulk cache warming
//
// Covers per-key isolation, catalog failures, the concurrency bound and the
// interaction between warm writes and cache-aside resolution.

mod common;

use common::{FakeCatalog, Harness, ScriptedSection};
use county_stats::{
    RegionKey, RegionRecord, StatsError, WarmMetrics, SECTION_GAP_STATUS, SECTION_TOTAL,
};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_warm_stores_degraded_record_and_resolve_uses_it() {
    let h = Harness::new(
        ScriptedSection::new(SECTION_TOTAL)
            .succeed("AA", json!({"pa_count": 1}))
            .succeed("BB", json!({"pa_count": 3})),
        ScriptedSection::new(SECTION_GAP_STATUS)
            .succeed("AA", json!([{"gap_sts": "1", "total": 1}]))
            .fail("BB", "statement timeout"),
        FakeCatalog::with_keys(&["AA", "BB"]),
    );

    let report = h.warmer.warm_all().await.unwrap();
    assert_eq!(report.total_keys, 2);
    assert_eq!(report.stored, 2);
    assert_eq!(report.degraded, 1);
    assert!(report.is_complete_success());
    assert_eq!(h.backend.sets(), 2);

    let stored = h.backend.raw("county:BB").await.unwrap();
    let bb = RegionRecord::from_json(&stored).unwrap();
    assert_eq!(bb.section(SECTION_TOTAL), Some(&json!({"pa_count": 3})));
    assert!(!bb.has_section(SECTION_GAP_STATUS));

    let fetches_after_warm = h.sub_fetches();
    let resolved = h.resolver.resolve(&RegionKey::new("BB")).await.unwrap();
    assert_eq!(resolved, bb);
    assert_eq!(
        h.sub_fetches(),
        fetches_after_warm,
        "warmed key must be a hit"
    );
}

#[tokio::test]
async fn test_one_key_failure_does_not_affect_others() {
    let h = Harness::new(
        ScriptedSection::new(SECTION_TOTAL)
            .succeed("AL", json!({"pa_count": 1}))
            .fail("BX", "connection reset")
            .succeed("CA", json!({"pa_count": 2})),
        ScriptedSection::new(SECTION_GAP_STATUS)
            .succeed("AL", json!([]))
            .fail("BX", "connection reset")
            .succeed("CA", json!([])),
        FakeCatalog::with_keys(&["AL", "BX", "CA"]),
    );

    let report = h.warmer.warm_all().await.unwrap();
    assert_eq!(report.total_keys, 3);
    assert_eq!(report.stored, 2);
    assert_eq!(report.attempted(), 3);
    assert!(!report.is_complete_success());
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(
        &report.failures[0],
        StatsError::WarmKeyFailed { key, .. } if key == "BX"
    ));

    assert!(h.backend.raw("county:AL").await.is_some());
    assert!(h.backend.raw("county:BX").await.is_none());
    assert!(h.backend.raw("county:CA").await.is_some());

    let stats = h.metrics.get_stats();
    assert_eq!(stats.warm_cycles_completed, 1);
    assert_eq!(stats.warm_keys_stored, 2);
    assert_eq!(stats.warm_keys_failed, 1);
}

#[tokio::test]
async fn test_cache_write_failure_counts_against_that_key_only() {
    let h = Harness::new(
        ScriptedSection::new(SECTION_TOTAL)
            .succeed("AL", json!({"pa_count": 1}))
            .succeed("BX", json!({"pa_count": 2})),
        ScriptedSection::new(SECTION_GAP_STATUS)
            .succeed("AL", json!([]))
            .succeed("BX", json!([])),
        FakeCatalog::with_keys(&["AL", "BX"]),
    );
    h.backend.fail_writes_for("county:AL");

    let report = h.warmer.warm_all().await.unwrap();
    assert_eq!(h.backend.sets(), 2, "a write is attempted for every key");
    assert_eq!(report.stored, 1);
    assert_eq!(report.failures.len(), 1);
    assert!(h.backend.raw("county:BX").await.is_some());
}

#[tokio::test]
async fn test_catalog_failure_aborts_cycle() {
    let h = Harness::new(
        ScriptedSection::new(SECTION_TOTAL),
        ScriptedSection::new(SECTION_GAP_STATUS),
        FakeCatalog::failing(),
    );

    let err = h.warmer.warm_all().await.unwrap_err();
    assert!(matches!(err, StatsError::CatalogReadFailed(_)));
    assert_eq!(h.sub_fetches(), 0);
    assert_eq!(h.backend.sets(), 0);

    let stats = h.metrics.get_stats();
    assert_eq!(stats.warm_cycles_started, 1);
    assert_eq!(stats.warm_cycles_failed, 1);
    assert_eq!(stats.warm_cycles_completed, 0);
}

#[tokio::test]
async fn test_catalog_is_read_on_every_cycle() {
    let h = Harness::new(
        ScriptedSection::new(SECTION_TOTAL)
            .succeed("NY", json!({"pa_count": 120}))
            .succeed("AL", json!({"pa_count": 4})),
        ScriptedSection::new(SECTION_GAP_STATUS)
            .succeed("NY", json!([]))
            .succeed("AL", json!([])),
        FakeCatalog::with_keys(&["NY"]),
    );

    let first = h.warmer.warm_all().await.unwrap();
    assert_eq!(first.total_keys, 1);
    assert!(h.backend.raw("county:AL").await.is_none());

    h.catalog.set_keys(&["NY", "AL"]);
    let second = h.warmer.warm_all().await.unwrap();

    assert_eq!(h.catalog.reads(), 2);
    assert_eq!(second.total_keys, 2);
    assert_eq!(second.stored, 2);
    assert_eq!(h.backend.sets(), 3);
    assert!(h.backend.raw("county:AL").await.is_some());
}

#[tokio::test]
async fn test_empty_catalog_completes_immediately() {
    let h = Harness::new(
        ScriptedSection::new(SECTION_TOTAL),
        ScriptedSection::new(SECTION_GAP_STATUS),
        FakeCatalog::with_keys(&[]),
    );

    let report = h.warmer.warm_all().await.unwrap();
    assert_eq!(report.total_keys, 0);
    assert!(report.is_complete_success());
    assert_eq!(h.backend.sets(), 0);
}

#[tokio::test]
async fn test_concurrency_bound_is_respected() {
    let keys: Vec<String> = (0..12).map(|i| format!("R{:02}", i)).collect();
    let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();

    let mut total =
        ScriptedSection::new(SECTION_TOTAL).with_delay(Duration::from_millis(20));
    let mut gap_status = ScriptedSection::new(SECTION_GAP_STATUS);
    for key in &key_refs {
        total = total.succeed(key, json!({"pa_count": 1}));
        gap_status = gap_status.succeed(key, json!([]));
    }

    let catalog = FakeCatalog::with_keys(&key_refs);
    let h = Harness::with_concurrency(total, gap_status, catalog, 3);
    assert_eq!(h.warmer.max_concurrent(), 3);

    let report = h.warmer.warm_all().await.unwrap();
    assert_eq!(report.stored, 12);

    let peak = h.total.max_in_flight.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak in-flight fetches was {}", peak);
    assert!(peak >= 2, "fetches should overlap, peak was {}", peak);
}

#[tokio::test]
async fn test_zero_concurrency_is_clamped() {
    let h = Harness::with_concurrency(
        ScriptedSection::new(SECTION_TOTAL).succeed("AL", json!({"pa_count": 1})),
        ScriptedSection::new(SECTION_GAP_STATUS).succeed("AL", json!([])),
        FakeCatalog::with_keys(&["AL"]),
        0,
    );

    assert_eq!(h.warmer.max_concurrent(), 1);
    let report = h.warmer.warm_all().await.unwrap();
    assert_eq!(report.stored, 1);
}

#[tokio::test]
async fn test_spawned_warm_runs_in_background() {
    let h = Harness::new(
        ScriptedSection::new(SECTION_TOTAL)
            .with_delay(Duration::from_millis(50))
            .succeed("AL", json!({"pa_count": 1})),
        ScriptedSection::new(SECTION_GAP_STATUS).succeed("AL", json!([])),
        FakeCatalog::with_keys(&["AL"]),
    );

    let handle = h.warmer.spawn_warm_all();
    assert!(h.backend.raw("county:AL").await.is_none());

    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.stored, 1);
    assert!(h.backend.raw("county:AL").await.is_some());
}

#[tokio::test]
async fn test_warm_and_resolve_race_leaves_valid_record() {
    let h = Harness::new(
        ScriptedSection::new(SECTION_TOTAL)
            .with_delay(Duration::from_millis(10))
            .succeed("NY", json!({"pa_count": 120})),
        ScriptedSection::new(SECTION_GAP_STATUS).succeed("NY", json!([])),
        FakeCatalog::with_keys(&["NY"]),
    );

    let warm = h.warmer.spawn_warm_all();
    let resolved = h.resolver.resolve(&RegionKey::new("NY")).await.unwrap();
    warm.await.unwrap().unwrap();

    let stored = h.backend.raw("county:NY").await.unwrap();
    let record = RegionRecord::from_json(&stored).unwrap();
    assert_eq!(record, resolved);
    assert!(record.is_complete(&[SECTION_TOTAL, SECTION_GAP_STATUS]));
}

#[tokio::test]
async fn test_warm_metrics_recorded() {
    let h = Harness::new(
        ScriptedSection::new(SECTION_TOTAL)
            .succeed("AA", json!({"pa_count": 1}))
            .succeed("BB", json!({"pa_count": 3})),
        ScriptedSection::new(SECTION_GAP_STATUS)
            .succeed("AA", json!([]))
            .fail("BB", "statement timeout"),
        FakeCatalog::with_keys(&["AA", "BB"]),
    );
    let warm_metrics = Arc::new(WarmMetrics::new().unwrap());
    let warmer = Arc::new(
        (*h.warmer)
            .clone()
            .with_metrics(warm_metrics.clone()),
    );

    let report = warmer.warm_all().await.unwrap();

    let text = warm_metrics.render();
    assert!(text.contains("county_stats_warm_cycles_total{result=\"completed\"} 1"));
    assert!(text.contains("county_stats_warm_keys_total{result=\"stored\"} 2"));
    assert!(text.contains("county_stats_warm_keys_total{result=\"degraded\"} 1"));

    // Degraded keys are a subset of stored keys in both metric sets
    let keys = &warm_metrics.warm_keys_total;
    let stats = h.metrics.get_stats();
    assert_eq!(report.stored, 2);
    assert_eq!(report.degraded, 1);
    assert_eq!(stats.warm_keys_stored, report.stored as u64);
    assert_eq!(
        keys.with_label_values(&["stored"]).get(),
        stats.warm_keys_stored as f64
    );
    assert_eq!(
        keys.with_label_values(&["degraded"]).get(),
        report.degraded as f64
    );
}
