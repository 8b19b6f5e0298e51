// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mock tier implementation for testing.
//!
//! [`MockTier`] is an in-memory tier that records every operation and supports
//! failure injection, for exercising degradation paths without a real backend.

use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;

use crate::{CacheEntry, CacheTier, Clock, Error, KeyPattern, Layer, Result, StatsCounter, TierHealth, TierStats};

/// Recorded tier operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierOp<V> {
    /// A get for the given key.
    Get(String),
    /// An insert of the given entry.
    Insert {
        /// The key that was inserted.
        key: String,
        /// The entry that was inserted.
        entry: CacheEntry<V>,
    },
    /// An invalidation of the given key.
    Invalidate(String),
    /// A pattern invalidation.
    InvalidatePattern(String),
    /// A clear.
    Clear,
    /// A health probe.
    Health,
}

impl<V> TierOp<V> {
    /// Returns the key the operation targets, if any.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Get(key) | Self::Invalidate(key) | Self::Insert { key, .. } => Some(key),
            Self::InvalidatePattern(_) | Self::Clear | Self::Health => None,
        }
    }
}

type FailPredicate<V> = Box<dyn Fn(&TierOp<V>) -> bool + Send + Sync>;

/// A configurable mock tier for testing.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use dealcache_tier::testing::{MockTier, TierOp};
/// use dealcache_tier::{CacheEntry, CacheTier, Clock, Layer};
///
/// # futures::executor::block_on(async {
/// let tier = MockTier::<i32>::new(Layer::Distributed);
/// let entry = CacheEntry::new(42, Clock::system().system_time(), Duration::from_secs(60));
///
/// tier.insert("key", entry).await.unwrap();
/// assert_eq!(*tier.get("key").await.unwrap().unwrap(), 42);
///
/// // Fail every get from now on.
/// tier.fail_when(|op| matches!(op, TierOp::Get(_)));
/// assert!(tier.get("key").await.is_err());
/// # });
/// ```
pub struct MockTier<V> {
    layer: Layer,
    clock: Clock,
    data: Arc<Mutex<HashMap<String, CacheEntry<V>>>>,
    operations: Arc<Mutex<Vec<TierOp<V>>>>,
    fail_when: Arc<Mutex<Option<FailPredicate<V>>>>,
    stats: Arc<StatsCounter>,
}

impl<V> std::fmt::Debug for MockTier<V>
where
    V: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTier")
            .field("layer", &self.layer)
            .field("data", &self.data)
            .field("operations", &self.operations)
            .field("fail_when", &self.fail_when.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl<V> Clone for MockTier<V> {
    fn clone(&self) -> Self {
        Self {
            layer: self.layer,
            clock: self.clock.clone(),
            data: Arc::clone(&self.data),
            operations: Arc::clone(&self.operations),
            fail_when: Arc::clone(&self.fail_when),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<V> MockTier<V> {
    /// Creates an empty mock playing the given layer.
    #[must_use]
    pub fn new(layer: Layer) -> Self {
        Self {
            layer,
            clock: Clock::system(),
            data: Arc::new(Mutex::new(HashMap::new())),
            operations: Arc::new(Mutex::new(Vec::new())),
            fail_when: Arc::new(Mutex::new(None)),
            stats: Arc::new(StatsCounter::new()),
        }
    }

    /// Uses the given clock to decide expiry.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the number of stored entries, expired ones included.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.data.lock().len()
    }

    /// Returns true if the key is stored.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.lock().contains_key(key)
    }

    /// Sets a predicate deciding which operations fail.
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&TierOp<V>) -> bool + Send + Sync + 'static,
    {
        *self.fail_when.lock() = Some(Box::new(predicate));
    }

    /// Clears the failure predicate.
    pub fn clear_failures(&self) {
        *self.fail_when.lock() = None;
    }

    fn should_fail(&self, op: &TierOp<V>) -> bool {
        self.fail_when.lock().as_ref().is_some_and(|predicate| predicate(op))
    }

    fn failure(&self, what: &str) -> Error {
        Error::backend(self.layer, format!("mock: {what} failed"))
    }
}

impl<V: Clone> MockTier<V> {
    /// Returns a clone of all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<TierOp<V>> {
        self.operations.lock().clone()
    }

    /// Returns the recorded operations targeting `key`.
    #[must_use]
    pub fn operations_for(&self, key: &str) -> Vec<TierOp<V>> {
        self.operations.lock().iter().filter(|op| op.key() == Some(key)).cloned().collect()
    }

    /// Clears recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    /// Returns the stored entry without recording an operation.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<CacheEntry<V>> {
        self.data.lock().get(key).cloned()
    }

    /// Checks the failure predicate and records the operation.
    fn begin(&self, op: TierOp<V>, what: &str) -> Result<()> {
        let fail = self.should_fail(&op);
        self.operations.lock().push(op);
        if fail { Err(self.failure(what)) } else { Ok(()) }
    }
}

impl<V> CacheTier<V> for MockTier<V>
where
    V: Clone + Send + Sync,
{
    fn layer(&self) -> Layer {
        self.layer
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry<V>>> {
        self.begin(TierOp::Get(key.to_string()), "get")?;
        let now = self.clock.system_time();
        let found = self.data.lock().get(key).filter(|entry| !entry.is_expired_at(now)).cloned();
        match found {
            Some(entry) => {
                self.stats.hit();
                Ok(Some(entry.with_layer(self.layer)))
            }
            None => {
                self.stats.miss();
                Ok(None)
            }
        }
    }

    async fn insert(&self, key: &str, entry: CacheEntry<V>) -> Result<()> {
        self.begin(
            TierOp::Insert {
                key: key.to_string(),
                entry: entry.clone(),
            },
            "insert",
        )?;
        self.data.lock().insert(key.to_string(), entry);
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<bool> {
        self.begin(TierOp::Invalidate(key.to_string()), "invalidate")?;
        Ok(self.data.lock().remove(key).is_some())
    }

    async fn invalidate_pattern(&self, pattern: &KeyPattern) -> Result<u64> {
        self.begin(TierOp::InvalidatePattern(pattern.to_string()), "invalidate_pattern")?;
        let mut data = self.data.lock();
        let before = data.len();
        data.retain(|key, _| !pattern.matches(key));
        Ok((before - data.len()) as u64)
    }

    async fn clear(&self) -> Result<()> {
        self.begin(TierOp::Clear, "clear")?;
        self.data.lock().clear();
        Ok(())
    }

    fn stats(&self) -> TierStats {
        self.stats.snapshot(self.data.lock().len() as u64)
    }

    async fn health(&self) -> TierHealth {
        match self.begin(TierOp::Health, "health") {
            Ok(()) => TierHealth::available(self.layer),
            Err(error) => TierHealth::unavailable(self.layer, error.to_string()),
        }
    }

    fn len(&self) -> Option<u64> {
        Some(self.data.lock().len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::ClockControl;

    fn entry(value: i32, clock: &Clock, ttl_secs: u64) -> CacheEntry<i32> {
        CacheEntry::new(value, clock.system_time(), Duration::from_secs(ttl_secs))
    }

    #[tokio::test]
    async fn records_operations_in_order() {
        let tier = MockTier::new(Layer::Materialized);
        let clock = Clock::system();
        tier.insert("a", entry(1, &clock, 60)).await.unwrap();
        let _ = tier.get("a").await.unwrap();
        let _ = tier.invalidate("a").await.unwrap();
        tier.clear().await.unwrap();

        let ops = tier.operations();
        assert_eq!(ops.len(), 4);
        assert!(matches!(ops[0], TierOp::Insert { ref key, .. } if key == "a"));
        assert_eq!(ops[1], TierOp::Get("a".to_string()));
        assert_eq!(ops[2], TierOp::Invalidate("a".to_string()));
        assert_eq!(ops[3], TierOp::Clear);
        assert_eq!(tier.operations_for("a").len(), 3);
    }

    #[tokio::test]
    async fn failures_are_recorded_and_reported() {
        let tier = MockTier::<i32>::new(Layer::Distributed);
        tier.fail_when(|op| matches!(op, TierOp::Get(k) if k == "bad"));

        assert!(tier.get("bad").await.is_err());
        assert!(tier.get("good").await.unwrap().is_none());
        assert_eq!(tier.operations().len(), 2);

        tier.fail_when(|op| matches!(op, TierOp::Health));
        assert!(!tier.health().await.is_available());
        tier.clear_failures();
        assert!(tier.health().await.is_available());
    }

    #[tokio::test]
    async fn expired_entries_are_misses() {
        let control = ClockControl::new();
        let clock = control.to_clock();
        let tier = MockTier::new(Layer::Distributed).with_clock(clock.clone());
        tier.insert("k", entry(7, &clock, 1)).await.unwrap();

        assert_eq!(tier.get("k").await.unwrap().map(CacheEntry::into_value), Some(7));
        control.advance(Duration::from_secs(2));
        assert!(tier.get("k").await.unwrap().is_none());

        let stats = tier.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[tokio::test]
    async fn pattern_invalidation_counts_matches() {
        let tier = MockTier::new(Layer::Distributed);
        let clock = Clock::system();
        for key in ["deals:product:1", "deals:product:2", "deals:search:1"] {
            tier.insert(key, entry(0, &clock, 60)).await.unwrap();
        }

        let pattern = KeyPattern::parse("deals:product:*").unwrap();
        assert_eq!(tier.invalidate_pattern(&pattern).await.unwrap(), 2);
        assert!(tier.contains_key("deals:search:1"));
        assert_eq!(tier.len(), Some(1));
    }
}
