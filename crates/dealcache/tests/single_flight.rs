// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Concurrent `get_or_compute` callers share one producer run.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use dealcache::{CacheManager, Error};
use serde_json::json;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hundred_callers_run_the_producer_once() {
    let cache = CacheManager::builder().build();
    let calls = Arc::new(AtomicU32::new(0));

    let tasks: Vec<_> = (0..100)
        .map(|_| {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                cache
                    .get_or_compute(
                        "deals:search:expensive",
                        || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok::<_, std::io::Error>(json!({"deals": [1, 2, 3]}))
                        },
                        None,
                    )
                    .await
            })
        })
        .collect();

    for task in tasks {
        let computed = task.await.unwrap().unwrap();
        assert_eq!(computed.data, json!({"deals": [1, 2, 3]}));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(cache.get("deals:search:expensive").await.hit);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shared_failure_reaches_every_waiter_and_clears() {
    let cache = CacheManager::builder().build();
    let calls = Arc::new(AtomicU32::new(0));

    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                cache
                    .get_or_compute(
                        "deals:product:broken",
                        || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Err::<serde_json::Value, _>("upstream timed out")
                        },
                        None,
                    )
                    .await
            })
        })
        .collect();

    for task in tasks {
        let error = task.await.unwrap().unwrap_err();
        assert!(matches!(error, Error::Compute { ref key, .. } if key == "deals:product:broken"));
        assert!(error.to_string().contains("upstream timed out"));
    }
    assert!(calls.load(Ordering::SeqCst) >= 1);
    assert!(!cache.get("deals:product:broken").await.hit);

    let recovered = cache
        .get_or_compute("deals:product:broken", || async { Ok::<_, std::io::Error>(json!("fixed")) }, None)
        .await
        .unwrap();
    assert!(!recovered.hit);
    assert_eq!(recovered.data, json!("fixed"));
}

#[tokio::test]
async fn cached_values_skip_the_producer() {
    let cache = CacheManager::builder().build();
    cache.set("k", json!(7), None).await;

    let computed = cache
        .get_or_compute("k", || async { Err::<serde_json::Value, _>("must not run") }, None)
        .await
        .unwrap();

    assert!(computed.hit);
    assert_eq!(computed.data, json!(7));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_leader_hands_over_to_a_waiter() {
    let cache = CacheManager::builder().build();

    let leader = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .get_or_compute(
                    "k",
                    || async {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        Ok::<_, std::io::Error>(json!("never"))
                    },
                    None,
                )
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let follower = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .get_or_compute("k", || async { Ok::<_, std::io::Error>(json!("follower")) }, None)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    leader.abort();

    let computed = tokio::time::timeout(Duration::from_secs(5), follower).await.unwrap().unwrap().unwrap();
    assert_eq!(computed.data, json!("follower"));
}
