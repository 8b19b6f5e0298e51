// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for `FlightGroup::work()`.

use std::{
    sync::{
        Arc,
        atomic::{
            AtomicUsize,
            Ordering::{AcqRel, Acquire},
        },
    },
    time::Duration,
};

use futures::{StreamExt, stream::FuturesUnordered};
use keyflight::FlightGroup;

#[tokio::test]
async fn direct_call() {
    let group = FlightGroup::new();
    let result = group
        .work("key", || async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            "Result".to_string()
        })
        .await;
    assert_eq!(result, "Result");
}

#[tokio::test]
async fn parallel_call_runs_once() {
    let call_counter = AtomicUsize::default();

    let group = FlightGroup::new();
    let futures = FuturesUnordered::new();
    for _ in 0..100 {
        futures.push(group.work("key", || async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            call_counter.fetch_add(1, AcqRel);
            "Result".to_string()
        }));
    }

    let results: Vec<String> = futures.collect().await;
    assert_eq!(results.len(), 100);
    assert!(results.iter().all(|out| out == "Result"));
    assert_eq!(call_counter.load(Acquire), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn spawned_callers_share_one_execution() {
    let call_counter = Arc::new(AtomicUsize::default());
    let group: FlightGroup<String, u64> = FlightGroup::new();

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let counter = Arc::clone(&call_counter);
            let fut = group.work("deals:product:7".to_string(), move || async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                counter.fetch_add(1, AcqRel);
                7
            });
            tokio::spawn(fut)
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap(), 7);
    }
    assert_eq!(call_counter.load(Acquire), 1);
    assert_eq!(group.in_flight(), 0);
}

#[tokio::test]
async fn errors_reach_every_waiter() {
    let group: FlightGroup<&str, Result<u32, String>> = FlightGroup::new();
    let futures = FuturesUnordered::new();
    for _ in 0..5 {
        futures.push(group.work("key", || async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err("upstream unavailable".to_string())
        }));
    }

    let results: Vec<_> = futures.collect().await;
    assert!(results.iter().all(|r| r == &Err("upstream unavailable".to_string())));

    // A failed flight does not poison the key.
    assert_eq!(group.work("key", || async { Ok(1) }).await, Ok(1));
}

#[tokio::test]
async fn different_keys_run_independently() {
    let call_counter = AtomicUsize::default();
    let group = FlightGroup::new();

    let (a, b) = tokio::join!(
        group.work("a", || async {
            call_counter.fetch_add(1, AcqRel);
            1
        }),
        group.work("b", || async {
            call_counter.fetch_add(1, AcqRel);
            2
        }),
    );

    assert_eq!((a, b), (1, 2));
    assert_eq!(call_counter.load(Acquire), 2);
}

#[tokio::test]
async fn sequential_calls_do_not_reuse_output() {
    let call_counter = AtomicUsize::default();
    let group = FlightGroup::new();

    for expected in 1..=3 {
        let out = group
            .work("key", || async { call_counter.fetch_add(1, AcqRel) + 1 })
            .await;
        assert_eq!(out, expected);
    }
}

async fn panicking_leader() -> &'static str {
    tokio::time::sleep(Duration::from_millis(50)).await;
    panic!("leader failed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn follower_runs_when_leader_panics() {
    let group: FlightGroup<&'static str, &'static str> = FlightGroup::new();

    let leader = tokio::spawn(group.work("key", panicking_leader));
    tokio::time::sleep(Duration::from_millis(10)).await;
    let follower = tokio::spawn(group.work("key", || async { "follower" }));

    assert!(leader.await.is_err());
    assert_eq!(follower.await.unwrap(), "follower");
    assert_eq!(group.in_flight(), 0);
}

#[tokio::test]
async fn follower_runs_when_leader_is_cancelled() {
    let group: FlightGroup<&'static str, u32> = FlightGroup::new();

    let leader = tokio::spawn(group.work("key", || async {
        tokio::time::sleep(Duration::from_secs(60)).await;
        1
    }));
    tokio::time::sleep(Duration::from_millis(10)).await;
    let follower = group.work("key", || async { 2 });

    leader.abort();
    assert_eq!(follower.await, 2);
}
