// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Materialized-view tier.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use dealcache_tier::{CacheEntry, CacheTier, Clock, KeyPattern, Layer, Result, StatsCounter, TierHealth, TierStats};
use moka::future::Cache;
use parking_lot::{Mutex, RwLock};
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};

use crate::{
    RefreshConfig, RefreshSource,
    source::DynSource,
};

const LAYER: Layer = Layer::Materialized;

/// Outcome of one refresh pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Sources that produced views.
    pub refreshed: Vec<String>,
    /// Sources that failed, with their error.
    pub failed: Vec<(String, String)>,
    /// Views written.
    pub keys_written: u64,
    /// When the pass started.
    pub started_at: Option<SystemTime>,
    /// Wall time of the pass.
    pub duration: Duration,
}

impl RefreshReport {
    /// Returns `true` when every source succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// The materialized-view tier (L3).
///
/// Stores precomputed views produced by registered [`RefreshSource`]s. Reads never
/// compute: a key that no pass has produced is a miss. Writes from the cache manager
/// are accepted too, so write-through keeps L3 consistent with the faster tiers.
///
/// # Examples
///
/// ```
/// use dealcache_refresh::{MaterializedCache, RefreshConfig, RefreshSource, SourceError};
/// use dealcache_tier::CacheTier;
///
/// struct Counts;
///
/// impl RefreshSource<u64> for Counts {
///     fn name(&self) -> &str {
///         "counts"
///     }
///
///     async fn compute(&self) -> Result<Vec<(String, u64)>, SourceError> {
///         Ok(vec![("deals:view:count".to_string(), 3)])
///     }
/// }
///
/// # futures::executor::block_on(async {
/// let l3 = MaterializedCache::new(RefreshConfig::default());
/// l3.register(Counts);
///
/// let report = l3.refresh_now().await;
/// assert_eq!(report.keys_written, 1);
/// assert_eq!(l3.get("deals:view:count").await.unwrap().map(|e| *e.value()), Some(3));
/// # });
/// ```
pub struct MaterializedCache<V> {
    inner: Arc<Inner<V>>,
}

struct Inner<V> {
    config: RefreshConfig,
    clock: Clock,
    views: Cache<String, CacheEntry<V>>,
    sources: RwLock<Vec<Arc<dyn DynSource<V>>>>,
    stats: StatsCounter,
    status: Mutex<Status>,
}

#[derive(Debug, Default)]
struct Status {
    passes: u64,
    failures: u64,
    last_report: Option<RefreshReport>,
}

impl<V> std::fmt::Debug for MaterializedCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaterializedCache")
            .field("config", &self.inner.config)
            .field("sources", &self.inner.sources.read().len())
            .field("status", &*self.inner.status.lock())
            .finish_non_exhaustive()
    }
}

impl<V> Clone for MaterializedCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> MaterializedCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates the tier.
    #[must_use]
    pub fn new(config: RefreshConfig) -> Self {
        Self::with_clock(config, Clock::system())
    }

    /// Creates the tier with a specific clock.
    #[must_use]
    pub fn with_clock(config: RefreshConfig, clock: Clock) -> Self {
        let views = Cache::builder()
            .name("dealcache-materialized")
            .max_capacity(config.max_entries)
            .time_to_live(config.view_ttl())
            .build();

        Self {
            inner: Arc::new(Inner {
                config,
                clock,
                views,
                sources: RwLock::new(Vec::new()),
                stats: StatsCounter::new(),
                status: Mutex::new(Status::default()),
            }),
        }
    }

    /// A tier that stores nothing and reports itself disabled.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(RefreshConfig::disabled())
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &RefreshConfig {
        &self.inner.config
    }

    /// Returns `true` when the tier is switched on.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.config.enabled
    }

    /// Adds a source to every subsequent pass.
    pub fn register<S>(&self, source: S)
    where
        S: RefreshSource<V> + 'static,
    {
        self.inner.sources.write().push(Arc::new(source));
    }

    /// Names of registered sources.
    #[must_use]
    pub fn sources(&self) -> Vec<String> {
        self.inner.sources.read().iter().map(|s| s.name().to_string()).collect()
    }

    /// The report of the most recent pass.
    #[must_use]
    pub fn last_report(&self) -> Option<RefreshReport> {
        self.inner.status.lock().last_report.clone()
    }

    /// Number of source failures since creation.
    #[must_use]
    pub fn refresh_failures(&self) -> u64 {
        self.inner.status.lock().failures
    }

    /// Number of completed passes.
    #[must_use]
    pub fn passes(&self) -> u64 {
        self.inner.status.lock().passes
    }

    /// Recomputes every registered source once.
    ///
    /// A failing source leaves its previous views in place until they expire.
    pub async fn refresh_now(&self) -> RefreshReport {
        let mut report = RefreshReport {
            started_at: Some(self.inner.clock.system_time()),
            ..RefreshReport::default()
        };
        if !self.is_enabled() {
            return report;
        }

        let started = self.inner.clock.instant();
        let sources: Vec<_> = self.inner.sources.read().clone();
        let ttl = self.inner.config.view_ttl();

        for source in sources {
            match source.compute_boxed().await {
                Ok(views) => {
                    let now = self.inner.clock.system_time();
                    for (key, view) in views {
                        let entry = CacheEntry::new(view, now, ttl).with_layer(LAYER);
                        self.inner.views.insert(key, entry).await;
                        report.keys_written += 1;
                    }
                    report.refreshed.push(source.name().to_string());
                }
                Err(error) => {
                    tracing::warn!(
                        cache.layer = LAYER.as_str(),
                        source = source.name(),
                        error = %error,
                        "materialized view refresh failed"
                    );
                    report.failed.push((source.name().to_string(), error.to_string()));
                }
            }
        }

        report.duration = self.inner.clock.instant().saturating_duration_since(started);
        tracing::info!(
            cache.layer = LAYER.as_str(),
            refreshed = report.refreshed.len(),
            failed = report.failed.len(),
            keys = report.keys_written,
            "materialized views refreshed"
        );

        let mut status = self.inner.status.lock();
        status.passes += 1;
        status.failures += report.failed.len() as u64;
        status.last_report = Some(report.clone());
        report
    }

    /// Starts the refresh loop on the current Tokio runtime.
    ///
    /// The first pass runs immediately, then once per interval. Ticks missed while a
    /// pass is running are skipped. A disabled tier spawns a loop that exits at once.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use = "dropping the handle stops the refresh loop"]
    pub fn spawn(&self) -> RefreshHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let this = self.clone();
        let interval = self.inner.config.refresh_interval();

        let task = tokio::spawn(async move {
            if !this.is_enabled() {
                return;
            }
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let _report = this.refresh_now().await;
                    }
                    _ = stop_rx.changed() => break,
                }
            }
            tracing::debug!(cache.layer = LAYER.as_str(), "materialized refresh loop stopped");
        });

        RefreshHandle {
            stop: stop_tx,
            task: Some(task),
        }
    }

    fn is_live(&self, entry: &CacheEntry<V>) -> bool {
        !entry.is_expired_at(self.inner.clock.system_time())
    }
}

/// Owns a running refresh loop. Dropping the handle aborts the loop.
#[derive(Debug)]
pub struct RefreshHandle {
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl RefreshHandle {
    /// Stops the loop after the current pass and waits for it to finish.
    ///
    /// A loop that ended by panicking is reported at `WARN`.
    pub async fn shutdown(mut self) {
        let _ = self.stop.send(true);
        if let Some(task) = self.task.take()
            && let Err(error) = task.await
        {
            tracing::warn!(
                cache.layer = LAYER.as_str(),
                panicked = error.is_panic(),
                error = %error,
                "materialized refresh loop ended abnormally"
            );
        }
    }

    /// Returns `true` once the loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl<V> CacheTier<V> for MaterializedCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn layer(&self) -> Layer {
        LAYER
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry<V>>> {
        if !self.is_enabled() {
            return Ok(None);
        }

        match self.inner.views.get(key).await {
            Some(entry) if self.is_live(&entry) => {
                self.inner.stats.hit();
                Ok(Some(entry.with_layer(LAYER)))
            }
            Some(_) => {
                self.inner.views.invalidate(key).await;
                self.inner.stats.expired(1);
                self.inner.stats.miss();
                Ok(None)
            }
            None => {
                self.inner.stats.miss();
                Ok(None)
            }
        }
    }

    async fn insert(&self, key: &str, entry: CacheEntry<V>) -> Result<()> {
        if self.is_enabled() && self.is_live(&entry) {
            self.inner.views.insert(key.to_string(), entry.with_layer(LAYER)).await;
        }
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<bool> {
        Ok(self.inner.views.remove(key).await.is_some())
    }

    async fn invalidate_pattern(&self, pattern: &KeyPattern) -> Result<u64> {
        let doomed: Vec<Arc<String>> = self
            .inner
            .views
            .iter()
            .filter(|(key, _)| pattern.matches(key))
            .map(|(key, _)| key)
            .collect();

        let mut removed = 0;
        for key in doomed {
            if self.inner.views.remove(key.as_str()).await.is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn clear(&self) -> Result<()> {
        self.inner.views.invalidate_all();
        self.inner.views.run_pending_tasks().await;
        Ok(())
    }

    fn stats(&self) -> TierStats {
        self.inner.stats.snapshot(self.inner.views.entry_count())
    }

    async fn health(&self) -> TierHealth {
        if !self.is_enabled() {
            return TierHealth::disabled(LAYER);
        }
        let status = self.inner.status.lock();
        match &status.last_report {
            Some(report) if !report.failed.is_empty() && report.refreshed.is_empty() => {
                let reason = report
                    .failed
                    .iter()
                    .map(|(source, error)| format!("{source}: {error}"))
                    .collect::<Vec<_>>()
                    .join("; ");
                TierHealth::unavailable(LAYER, reason)
            }
            _ => TierHealth::available(LAYER),
        }
    }

    fn len(&self) -> Option<u64> {
        Some(self.inner.views.entry_count())
    }
}
