// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Rolling latency and hit-rate tracking with SLA checks.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use dealcache_tier::{Layer, hit_rate};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Samples kept by default.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// One measured operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// Time the operation took.
    pub response_time: Duration,
    /// Whether the value came from a cache tier.
    pub cache_hit: bool,
    /// Tier that answered, if any.
    pub layer: Option<Layer>,
    /// Logical endpoint, typically the `service:entity` part of the key.
    pub endpoint: String,
}

impl Sample {
    /// Creates a sample.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, response_time: Duration, cache_hit: bool, layer: Option<Layer>) -> Self {
        Self {
            response_time,
            cache_hit,
            layer,
            endpoint: endpoint.into(),
        }
    }
}

/// Aggregates over the current window. Latencies are in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReport {
    /// Samples in the window.
    pub count: usize,
    /// Mean latency.
    pub avg_ms: f64,
    /// Fastest sample.
    pub min_ms: f64,
    /// Slowest sample.
    pub max_ms: f64,
    /// Median, nearest rank.
    pub p50_ms: f64,
    /// 95th percentile, nearest rank.
    pub p95_ms: f64,
    /// 99th percentile, nearest rank.
    pub p99_ms: f64,
    /// Share of samples served from cache, in `[0, 1]`.
    pub hit_rate: f64,
    /// Hits per answering tier.
    pub hits_by_layer: BTreeMap<Layer, u64>,
}

/// An endpoint whose mean latency is above a threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlowEndpoint {
    /// The endpoint.
    pub endpoint: String,
    /// Samples recorded for it.
    pub count: usize,
    /// Mean latency in milliseconds.
    pub avg_ms: f64,
    /// Slowest sample in milliseconds.
    pub max_ms: f64,
}

/// Service-level targets checked by [`MetricsTracker::check_targets`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SlaTargets {
    /// Ceiling for overall p95 latency.
    pub p95_ms: f64,
    /// Floor for the overall hit rate.
    pub min_hit_rate: f64,
    /// Ceiling for p95 latency of memory-tier hits.
    pub l1_p95_ms: f64,
}

impl Default for SlaTargets {
    fn default() -> Self {
        Self {
            p95_ms: 100.0,
            min_hit_rate: 0.95,
            l1_p95_ms: 10.0,
        }
    }
}

/// Outcome of one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetCheck {
    /// Target name.
    pub name: &'static str,
    /// Threshold.
    pub target: f64,
    /// Measured value.
    pub actual: f64,
    /// Whether the target is met.
    pub passed: bool,
}

/// Outcome of every target.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetReport {
    /// Individual checks.
    pub checks: Vec<TargetCheck>,
    /// `true` when every check passed.
    pub all_passed: bool,
}

/// Records operation latencies in a bounded rolling window.
///
/// Cloning yields another handle to the same window.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use dealcache::{MetricsTracker, Sample};
/// use dealcache_tier::Layer;
///
/// let tracker = MetricsTracker::new();
/// tracker.record(Sample::new("deals:product", Duration::from_millis(2), true, Some(Layer::Memory)));
/// tracker.record(Sample::new("deals:product", Duration::from_millis(40), false, None));
///
/// let report = tracker.report();
/// assert_eq!(report.count, 2);
/// assert!((report.hit_rate - 0.5).abs() < f64::EPSILON);
/// ```
#[derive(Debug, Clone)]
pub struct MetricsTracker {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    capacity: usize,
    targets: SlaTargets,
    samples: Mutex<VecDeque<Sample>>,
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsTracker {
    /// A tracker keeping [`DEFAULT_CAPACITY`] samples and checking the default targets.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// A tracker keeping at most `capacity` samples (at least one).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_targets(capacity, SlaTargets::default())
    }

    /// A tracker with custom targets.
    #[must_use]
    pub fn with_targets(capacity: usize, targets: SlaTargets) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Inner {
                capacity,
                targets,
                samples: Mutex::new(VecDeque::with_capacity(capacity.min(1_024))),
            }),
        }
    }

    /// The targets used by [`check_targets`](Self::check_targets).
    #[must_use]
    pub fn targets(&self) -> &SlaTargets {
        &self.inner.targets
    }

    /// Adds a sample, dropping the oldest one when the window is full.
    pub fn record(&self, sample: Sample) {
        let mut samples = self.inner.samples.lock();
        if samples.len() == self.inner.capacity {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    /// Samples currently in the window.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.samples.lock().len()
    }

    /// Returns `true` when nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every sample.
    pub fn reset(&self) {
        self.inner.samples.lock().clear();
    }

    /// Aggregates the current window. An empty window reports zeros.
    #[must_use]
    pub fn report(&self) -> MetricsReport {
        let samples = self.inner.samples.lock();
        if samples.is_empty() {
            return MetricsReport::default();
        }

        let mut latencies: Vec<f64> = samples.iter().map(|s| millis(s.response_time)).collect();
        latencies.sort_by(f64::total_cmp);

        let hits = samples.iter().filter(|s| s.cache_hit).count() as u64;
        let mut hits_by_layer = BTreeMap::new();
        for layer in samples.iter().filter(|s| s.cache_hit).filter_map(|s| s.layer) {
            *hits_by_layer.entry(layer).or_insert(0) += 1;
        }

        MetricsReport {
            count: latencies.len(),
            avg_ms: mean(&latencies),
            min_ms: latencies[0],
            max_ms: latencies[latencies.len() - 1],
            p50_ms: percentile(&latencies, 50.0),
            p95_ms: percentile(&latencies, 95.0),
            p99_ms: percentile(&latencies, 99.0),
            hit_rate: hit_rate(hits, latencies.len() as u64 - hits),
            hits_by_layer,
        }
    }

    /// Endpoints whose mean latency exceeds `threshold`, slowest first.
    #[must_use]
    pub fn slow_endpoints(&self, threshold: Duration) -> Vec<SlowEndpoint> {
        let threshold = millis(threshold);
        let mut by_endpoint: HashMap<String, Vec<f64>> = HashMap::new();
        for sample in self.inner.samples.lock().iter() {
            by_endpoint
                .entry(sample.endpoint.clone())
                .or_default()
                .push(millis(sample.response_time));
        }

        let mut slow: Vec<SlowEndpoint> = by_endpoint
            .into_iter()
            .map(|(endpoint, latencies)| SlowEndpoint {
                endpoint,
                count: latencies.len(),
                avg_ms: mean(&latencies),
                max_ms: latencies.iter().copied().fold(0.0, f64::max),
            })
            .filter(|endpoint| endpoint.avg_ms > threshold)
            .collect();
        slow.sort_by(|a, b| b.avg_ms.total_cmp(&a.avg_ms).then_with(|| a.endpoint.cmp(&b.endpoint)));
        slow
    }

    /// Compares the window with the configured targets.
    ///
    /// Latency targets pass on an empty window; the hit-rate target does not.
    #[must_use]
    pub fn check_targets(&self) -> TargetReport {
        let targets = &self.inner.targets;
        let report = self.report();

        let mut l1: Vec<f64> = self
            .inner
            .samples
            .lock()
            .iter()
            .filter(|s| s.cache_hit && s.layer == Some(Layer::Memory))
            .map(|s| millis(s.response_time))
            .collect();
        l1.sort_by(f64::total_cmp);
        let l1_p95 = if l1.is_empty() { 0.0 } else { percentile(&l1, 95.0) };

        let checks = vec![
            TargetCheck {
                name: "p95_response_time_ms",
                target: targets.p95_ms,
                actual: report.p95_ms,
                passed: report.p95_ms <= targets.p95_ms,
            },
            TargetCheck {
                name: "hit_rate",
                target: targets.min_hit_rate,
                actual: report.hit_rate,
                passed: report.count > 0 && report.hit_rate >= targets.min_hit_rate,
            },
            TargetCheck {
                name: "l1_p95_response_time_ms",
                target: targets.l1_p95_ms,
                actual: l1_p95,
                passed: l1_p95 <= targets.l1_p95_ms,
            },
        ];
        let all_passed = checks.iter().all(|check| check.passed);
        TargetReport { checks, all_passed }
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1_000.0
}

#[expect(clippy::cast_precision_loss, reason = "sample counts stay far below 2^52")]
fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Nearest-rank percentile of an ascending, non-empty slice.
#[expect(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "rank is within 1..=len"
)]
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn nearest_rank_percentiles() {
        let tracker = MetricsTracker::new();
        for i in 1..=100 {
            tracker.record(Sample::new("e", ms(i), false, None));
        }

        let report = tracker.report();
        assert_eq!(report.count, 100);
        assert!((report.p50_ms - 50.0).abs() < 1e-9);
        assert!((report.p95_ms - 95.0).abs() < 1e-9);
        assert!((report.p99_ms - 99.0).abs() < 1e-9);
        assert!((report.min_ms - 1.0).abs() < 1e-9);
        assert!((report.max_ms - 100.0).abs() < 1e-9);
        assert!((report.avg_ms - 50.5).abs() < 1e-9);
    }

    #[test]
    fn single_sample_is_every_percentile() {
        let tracker = MetricsTracker::new();
        tracker.record(Sample::new("e", ms(7), true, Some(Layer::Memory)));

        let report = tracker.report();
        assert!((report.p50_ms - 7.0).abs() < 1e-9);
        assert!((report.p99_ms - 7.0).abs() < 1e-9);
        assert_eq!(report.hits_by_layer.get(&Layer::Memory), Some(&1));
    }

    #[test]
    fn window_drops_oldest() {
        let tracker = MetricsTracker::with_capacity(3);
        for i in 1..=5 {
            tracker.record(Sample::new("e", ms(i), false, None));
        }

        assert_eq!(tracker.len(), 3);
        assert!((tracker.report().min_ms - 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_report_is_zeroed() {
        let tracker = MetricsTracker::new();
        assert_eq!(tracker.report(), MetricsReport::default());

        let targets = tracker.check_targets();
        assert!(!targets.all_passed);
        assert!(targets.checks.iter().filter(|c| c.name != "hit_rate").all(|c| c.passed));
    }

    #[test]
    fn slow_endpoints_sorted_worst_first() {
        let tracker = MetricsTracker::new();
        tracker.record(Sample::new("deals:search", ms(300), false, None));
        tracker.record(Sample::new("deals:search", ms(100), false, None));
        tracker.record(Sample::new("deals:product", ms(500), false, None));
        tracker.record(Sample::new("deals:category", ms(5), true, Some(Layer::Memory)));

        let slow = tracker.slow_endpoints(ms(150));

        let names: Vec<_> = slow.iter().map(|s| s.endpoint.as_str()).collect();
        assert_eq!(names, ["deals:product", "deals:search"]);
        assert!((slow[1].avg_ms - 200.0).abs() < 1e-9);
        assert!((slow[1].max_ms - 300.0).abs() < 1e-9);
        assert_eq!(slow[1].count, 2);
    }

    #[test]
    fn targets_pass_and_fail() {
        let tracker = MetricsTracker::new();
        for _ in 0..99 {
            tracker.record(Sample::new("e", ms(2), true, Some(Layer::Memory)));
        }
        tracker.record(Sample::new("e", ms(80), false, None));

        assert!(tracker.check_targets().all_passed);

        tracker.record(Sample::new("e", ms(80), false, None));
        for _ in 0..10 {
            tracker.record(Sample::new("e", ms(250), false, None));
        }

        let report = tracker.check_targets();
        assert!(!report.all_passed);
        let failed: Vec<_> = report.checks.iter().filter(|c| !c.passed).map(|c| c.name).collect();
        assert_eq!(failed, ["p95_response_time_ms", "hit_rate"]);
    }

    #[test]
    fn reset_clears_window() {
        let tracker = MetricsTracker::new();
        let other = tracker.clone();
        tracker.record(Sample::new("e", ms(1), true, None));
        other.reset();
        assert!(tracker.is_empty());
    }
}
