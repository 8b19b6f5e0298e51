// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// A point-in-time snapshot of a tier's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierStats {
    /// Lookups that returned a live entry.
    pub hits: u64,
    /// Lookups that found nothing or an expired entry.
    pub misses: u64,
    /// Entries removed to make room for new ones.
    pub evictions: u64,
    /// Entries dropped because their TTL elapsed.
    pub expirations: u64,
    /// Entries currently held, when the tier tracks size.
    pub current_size: u64,
    /// `hits / (hits + misses)`, or `0.0` before the first lookup.
    pub hit_rate: f64,
}

impl TierStats {
    /// Builds a snapshot and derives the hit rate.
    #[must_use]
    pub fn new(hits: u64, misses: u64, evictions: u64, expirations: u64, current_size: u64) -> Self {
        Self {
            hits,
            misses,
            evictions,
            expirations,
            current_size,
            hit_rate: hit_rate(hits, misses),
        }
    }

    /// Total lookups.
    #[must_use]
    pub fn requests(&self) -> u64 {
        self.hits + self.misses
    }
}

/// Computes `hits / (hits + misses)` as a fraction in `[0.0, 1.0]`.
#[must_use]
#[expect(clippy::cast_precision_loss, reason = "counters far below 2^52 in practice")]
pub fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 { 0.0 } else { hits as f64 / total as f64 }
}

/// Lock-free counters backing [`TierStats`].
#[derive(Debug, Default)]
pub struct StatsCounter {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl StatsCounter {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a hit.
    pub fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a miss.
    pub fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts `n` evictions.
    pub fn evicted(&self, n: u64) {
        self.evictions.fetch_add(n, Ordering::Relaxed);
    }

    /// Counts `n` expirations.
    pub fn expired(&self, n: u64) {
        self.expirations.fetch_add(n, Ordering::Relaxed);
    }

    /// Zeroes every counter.
    pub fn reset(&self) {
        for counter in [&self.hits, &self.misses, &self.evictions, &self.expirations] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Takes a snapshot with the given current size.
    #[must_use]
    pub fn snapshot(&self, current_size: u64) -> TierStats {
        TierStats::new(
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.evictions.load(Ordering::Relaxed),
            self.expirations.load(Ordering::Relaxed),
            current_size,
        )
    }
}
