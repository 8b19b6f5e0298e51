// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::atomic::{AtomicU64, Ordering};

use dealcache_tier::{CacheEntry, CacheTier, KeyPattern, Layer, TierHealth, TierState, TierStats};
use parking_lot::Mutex;

use crate::telemetry::{CacheActivity, CacheOperation, CacheTelemetry};

/// Wraps an optional tier so its faults never reach callers.
///
/// Every error or timeout becomes a miss (reads) or a no-op (writes), is logged at
/// `WARN`, is counted, and marks the tier [`TierState::Unavailable`]. The next
/// successful operation marks it [`TierState::Available`] again.
///
/// # Examples
///
/// ```
/// use dealcache::TierGuard;
/// use dealcache_tier::{Layer, TierState, testing::MockTier};
///
/// # futures::executor::block_on(async {
/// let mock = MockTier::<u32>::new(Layer::Distributed);
/// mock.fail_when(|_| true);
///
/// let guard = TierGuard::new(mock);
/// assert_eq!(guard.get::<u32>("k").await, None);
/// assert_eq!(guard.state(), TierState::Unavailable);
/// assert_eq!(guard.failures(), 1);
/// # });
/// ```
#[derive(Debug)]
pub struct TierGuard<T> {
    tier: T,
    status: Mutex<Status>,
    failures: AtomicU64,
    telemetry: CacheTelemetry,
}

#[derive(Debug)]
struct Status {
    state: TierState,
    last_error: Option<String>,
}

impl<T> TierGuard<T> {
    /// Guards `tier`.
    pub fn new(tier: T) -> Self {
        Self::with_telemetry(tier, CacheTelemetry::default())
    }

    pub(crate) fn with_telemetry(tier: T, telemetry: CacheTelemetry) -> Self {
        Self {
            tier,
            status: Mutex::new(Status {
                state: TierState::Available,
                last_error: None,
            }),
            failures: AtomicU64::new(0),
            telemetry,
        }
    }

    /// The guarded tier.
    #[must_use]
    pub fn inner(&self) -> &T {
        &self.tier
    }

    /// State observed by the most recent operation or probe.
    #[must_use]
    pub fn state(&self) -> TierState {
        self.status.lock().state
    }

    /// The most recent absorbed error, if the tier is currently unavailable.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.status.lock().last_error.clone()
    }

    /// Number of errors absorbed since creation.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    fn succeeded(&self, layer: Layer) {
        let mut status = self.status.lock();
        if status.state == TierState::Unavailable {
            status.state = TierState::Available;
            status.last_error = None;
            drop(status);
            tracing::info!(cache.layer = layer.as_str(), "cache tier recovered");
        }
    }

    fn failed(&self, layer: Layer, operation: CacheOperation, error: &dealcache_tier::Error) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        {
            let mut status = self.status.lock();
            status.state = TierState::Unavailable;
            status.last_error = Some(error.to_string());
        }
        tracing::warn!(
            cache.layer = layer.as_str(),
            cache.operation = operation.as_str(),
            error = %error,
            "cache tier degraded; treating as miss"
        );
        self.telemetry.record(Some(layer), operation, CacheActivity::Degraded, None);
    }

    fn absorb<R>(&self, layer: Layer, operation: CacheOperation, result: dealcache_tier::Result<R>, fallback: R) -> R {
        match result {
            Ok(value) => {
                self.succeeded(layer);
                value
            }
            Err(error) => {
                self.failed(layer, operation, &error);
                fallback
            }
        }
    }

    /// Reads a live entry; faults read as a miss.
    pub async fn get<V>(&self, key: &str) -> Option<CacheEntry<V>>
    where
        T: CacheTier<V>,
    {
        let result = self.tier.get(key).await;
        self.absorb(self.tier.layer(), CacheOperation::Get, result, None)
    }

    /// Writes an entry; faults are dropped.
    pub async fn insert<V>(&self, key: &str, entry: CacheEntry<V>)
    where
        T: CacheTier<V>,
    {
        let result = self.tier.insert(key, entry).await;
        self.absorb(self.tier.layer(), CacheOperation::Set, result, ());
    }

    /// Removes a key; faults report nothing removed.
    pub async fn invalidate<V>(&self, key: &str) -> bool
    where
        T: CacheTier<V>,
    {
        let result = self.tier.invalidate(key).await;
        self.absorb(self.tier.layer(), CacheOperation::Delete, result, false)
    }

    /// Removes matching keys; faults report zero.
    pub async fn invalidate_pattern<V>(&self, pattern: &KeyPattern) -> u64
    where
        T: CacheTier<V>,
    {
        let result = self.tier.invalidate_pattern(pattern).await;
        self.absorb(self.tier.layer(), CacheOperation::Invalidate, result, 0)
    }

    /// Clears the tier; faults are dropped.
    pub async fn clear<V>(&self)
    where
        T: CacheTier<V>,
    {
        let result = self.tier.clear().await;
        self.absorb(self.tier.layer(), CacheOperation::Clear, result, ());
    }

    /// Counters of the guarded tier.
    pub fn stats<V>(&self) -> TierStats
    where
        T: CacheTier<V>,
    {
        self.tier.stats()
    }

    /// Probes the tier and records the outcome.
    pub async fn health<V>(&self) -> TierHealth
    where
        T: CacheTier<V>,
    {
        let mut health = self.tier.health().await;
        let mut status = self.status.lock();
        match health.state {
            TierState::Available if status.state == TierState::Unavailable => {
                tracing::info!(cache.layer = health.layer.as_str(), "cache tier recovered");
                status.last_error = None;
            }
            TierState::Unavailable => {
                status.last_error.clone_from(&health.last_error);
            }
            _ => {}
        }
        status.state = health.state;
        if health.last_error.is_none() {
            health.last_error.clone_from(&status.last_error);
        }
        health
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use dealcache_tier::testing::{MockTier, TierOp};

    use super::*;

    fn entry(value: u32) -> CacheEntry<u32> {
        CacheEntry::new(value, SystemTime::now(), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn healthy_tier_passes_through() {
        let guard = TierGuard::new(MockTier::<u32>::new(Layer::Distributed));

        guard.insert("k", entry(1)).await;
        assert_eq!(guard.get::<u32>("k").await.map(CacheEntry::into_value), Some(1));
        assert!(guard.invalidate::<u32>("k").await);
        assert_eq!(guard.state(), TierState::Available);
        assert_eq!(guard.failures(), 0);
    }

    #[tokio::test]
    async fn faults_become_misses_and_recover() {
        let mock = MockTier::<u32>::new(Layer::Distributed);
        mock.fail_when(|op| matches!(op, TierOp::Get(_)));
        let guard = TierGuard::new(mock);

        guard.insert("k", entry(1)).await;
        assert_eq!(guard.get::<u32>("k").await, None);
        assert_eq!(guard.state(), TierState::Unavailable);
        assert!(guard.last_error().is_some());

        guard.inner().clear_failures();
        assert!(guard.get::<u32>("k").await.is_some());
        assert_eq!(guard.state(), TierState::Available);
        assert_eq!(guard.last_error(), None);
        assert_eq!(guard.failures(), 1);
    }

    #[tokio::test]
    async fn write_faults_are_dropped() {
        let mock = MockTier::<u32>::new(Layer::Materialized);
        mock.fail_when(|_| true);
        let guard = TierGuard::new(mock);

        guard.insert("k", entry(1)).await;
        assert_eq!(guard.invalidate_pattern::<u32>(&KeyPattern::parse("k*").unwrap()).await, 0);
        guard.clear::<u32>().await;
        assert_eq!(guard.failures(), 3);
    }

    #[tokio::test]
    async fn health_probe_updates_state() {
        let mock = MockTier::<u32>::new(Layer::Distributed);
        mock.fail_when(|op| matches!(op, TierOp::Health));
        let guard = TierGuard::new(mock);

        let health = guard.health::<u32>().await;
        assert_eq!(health.state, TierState::Unavailable);
        assert_eq!(guard.state(), TierState::Unavailable);

        guard.inner().clear_failures();
        let health = guard.health::<u32>().await;
        assert_eq!(health.state, TierState::Available);
        assert_eq!(guard.state(), TierState::Available);
    }
}
