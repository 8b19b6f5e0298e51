// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Hit-rate and latency reporting fed by the manager.

use std::time::Duration;

use dealcache::{CacheManager, Layer, MetricsTracker, Sample};
use dealcache_tier::ClockControl;
use serde_json::json;

#[test]
fn ninety_hits_and_ten_misses() {
    let tracker = MetricsTracker::new();
    for n in 0..100 {
        let hit = n >= 10;
        tracker.record(Sample::new(
            "deals:product",
            Duration::from_millis(2),
            hit,
            hit.then_some(Layer::Memory),
        ));
    }

    let report = tracker.report();
    assert_eq!(report.count, 100);
    assert!((report.hit_rate - 0.9).abs() < 1e-9);
    assert_eq!(report.hits_by_layer.get(&Layer::Memory), Some(&90));

    let targets = tracker.check_targets();
    assert!(!targets.all_passed);
    let hit_rate = targets.checks.iter().find(|check| check.name == "hit_rate").unwrap();
    assert!(!hit_rate.passed);
}

#[tokio::test]
async fn manager_lookups_feed_the_tracker() {
    let control = ClockControl::new();
    let tracker = MetricsTracker::new();
    let cache = CacheManager::builder()
        .clock(control.to_clock())
        .metrics(tracker.clone())
        .build();

    cache.set("deals:product:1", json!(1), None).await;
    for _ in 0..19 {
        assert!(cache.get("deals:product:1").await.hit);
    }
    let _ = cache
        .get_or_compute("deals:search:tv", || async { Ok::<_, std::io::Error>(json!([])) }, None)
        .await
        .unwrap();

    let report = tracker.report();
    assert_eq!(report.count, 20);
    assert!((report.hit_rate - 0.95).abs() < 1e-9);

    // The controlled clock never moves, so every sample takes zero time.
    assert!(tracker.check_targets().all_passed);
    assert!(tracker.slow_endpoints(Duration::from_millis(1)).is_empty());
}

#[test]
fn slow_endpoints_are_ranked_by_mean_latency() {
    let tracker = MetricsTracker::new();
    for (endpoint, millis) in [("deals:search", 300), ("deals:search", 100), ("deals:product", 5), ("deals:view", 150)] {
        tracker.record(Sample::new(endpoint, Duration::from_millis(millis), false, None));
    }

    let slow = tracker.slow_endpoints(Duration::from_millis(100));
    let names: Vec<&str> = slow.iter().map(|s| s.endpoint.as_str()).collect();
    assert_eq!(names, ["deals:search", "deals:view"]);
    assert_eq!(slow[0].count, 2);
}
