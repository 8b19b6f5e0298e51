// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Chunked bulk work with retries and partial-failure reporting.
//!
//! A batch never aborts: every chunk or item runs, and the [`BatchResult`] tells how
//! many succeeded and where the failures were.

mod backoff;
mod products;

use std::{fmt::Display, time::Duration};

use dealcache_tier::Clock;
use futures::{StreamExt, stream};
use serde::{Deserialize, Serialize, Serializer};

use self::backoff::Backoff;
pub use self::products::ProductBatch;

/// Tuning for a [`BatchProcessor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BatchOptions {
    /// Items per chunk.
    pub batch_size: usize,
    /// Chunks driven at once; 1 is sequential.
    pub max_concurrent: usize,
    /// Whether failed chunks are retried.
    pub retry_on_error: bool,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds. Doubles per retry.
    pub base_delay_ms: u64,
    /// Upper bound of a retry delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Spreads each delay over ±25%.
    pub jitter: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_concurrent: 1,
            retry_on_error: true,
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 5_000,
            jitter: false,
        }
    }
}

impl BatchOptions {
    /// Delay before the first retry.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Upper bound of a retry delay.
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// A chunk or item that failed after its retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchError {
    /// Offset of the item, or of the chunk's first item, in the input.
    pub index: usize,
    /// The last error.
    pub error: String,
}

/// Summary of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    /// Input items.
    pub total: usize,
    /// Items that succeeded.
    pub processed: usize,
    /// Items that failed.
    pub failed: usize,
    /// Failures ordered by index.
    pub errors: Vec<BatchError>,
    /// Wall time of the whole batch.
    #[serde(rename = "durationMs", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

impl BatchResult {
    /// Wall time in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> u128 {
        self.duration.as_millis()
    }

    /// Returns `true` when nothing failed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

/// Outputs of [`BatchProcessor::process_parallel`].
#[derive(Debug, Clone)]
pub struct ParallelResult<O> {
    /// Counts and failures.
    pub summary: BatchResult,
    /// One slot per input item, in input order; `None` where the item failed.
    pub outputs: Vec<Option<O>>,
}

/// Drives bulk work through caller-supplied async operations.
///
/// # Examples
///
/// ```
/// use dealcache::batch::{BatchOptions, BatchProcessor};
///
/// # futures::executor::block_on(async {
/// let processor = BatchProcessor::new(BatchOptions {
///     batch_size: 10,
///     retry_on_error: false,
///     ..BatchOptions::default()
/// });
///
/// let result = processor
///     .process_chunks((0..25).collect(), |chunk: Vec<u32>| async move {
///         if chunk.contains(&12) { Err("bad chunk") } else { Ok(()) }
///     })
///     .await;
///
/// assert_eq!((result.processed, result.failed), (20, 5));
/// assert_eq!(result.errors[0].index, 10);
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct BatchProcessor {
    options: BatchOptions,
    backoff: Backoff,
    clock: Clock,
}

impl BatchProcessor {
    /// A processor with `options`. A zero batch size or concurrency is raised to 1.
    #[must_use]
    pub fn new(mut options: BatchOptions) -> Self {
        options.batch_size = options.batch_size.max(1);
        options.max_concurrent = options.max_concurrent.max(1);
        let backoff = Backoff::new(&options);
        Self {
            options,
            backoff,
            clock: Clock::system(),
        }
    }

    /// Measures batch durations on `clock`.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// The options in effect.
    #[must_use]
    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Splits `items` into chunks and runs `op` on each.
    ///
    /// Up to `max_concurrent` chunks run at once. A failing chunk is retried with
    /// exponential backoff when `retry_on_error` is set; if it still fails, all of its
    /// items count as failed and one error is recorded at the chunk's first index.
    pub async fn process_chunks<T, F, Fut, E>(&self, items: Vec<T>, op: F) -> BatchResult
    where
        T: Clone,
        F: Fn(Vec<T>) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        let started = self.clock.instant();
        let total = items.len();
        let size = self.options.batch_size;

        let chunks: Vec<(usize, Vec<T>)> = items
            .chunks(size)
            .enumerate()
            .map(|(n, chunk)| (n * size, chunk.to_vec()))
            .collect();

        let op = &op;
        let outcomes: Vec<(usize, usize, Result<(), String>)> = stream::iter(chunks)
            .map(|(index, chunk)| async move {
                let len = chunk.len();
                let outcome = self.retrying(index, || op(chunk.clone())).await;
                (index, len, outcome)
            })
            .buffer_unordered(self.options.max_concurrent)
            .collect()
            .await;

        let mut result = BatchResult {
            total,
            processed: 0,
            failed: 0,
            errors: Vec::new(),
            duration: Duration::ZERO,
        };
        for (index, len, outcome) in outcomes {
            match outcome {
                Ok(()) => result.processed += len,
                Err(error) => {
                    result.failed += len;
                    result.errors.push(BatchError { index, error });
                }
            }
        }
        result.errors.sort_by_key(|e| e.index);
        result.duration = self.clock.instant().saturating_duration_since(started);

        log_summary("chunks", &result);
        result
    }

    /// Runs `op` on every item, at most `max_concurrent` at once.
    ///
    /// Failing items are retried like chunks. Outputs keep input order.
    pub async fn process_parallel<T, O, F, Fut, E>(&self, items: Vec<T>, max_concurrent: usize, op: F) -> ParallelResult<O>
    where
        T: Clone,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<O, E>>,
        E: Display,
    {
        let started = self.clock.instant();
        let total = items.len();

        let op = &op;
        let outcomes: Vec<Result<O, String>> = stream::iter(items.into_iter().enumerate())
            .map(|(index, item)| async move { self.retrying(index, || op(item.clone())).await })
            .buffered(max_concurrent.max(1))
            .collect()
            .await;

        let mut summary = BatchResult {
            total,
            processed: 0,
            failed: 0,
            errors: Vec::new(),
            duration: Duration::ZERO,
        };
        let outputs = outcomes
            .into_iter()
            .enumerate()
            .map(|(index, outcome)| match outcome {
                Ok(output) => {
                    summary.processed += 1;
                    Some(output)
                }
                Err(error) => {
                    summary.failed += 1;
                    summary.errors.push(BatchError { index, error });
                    None
                }
            })
            .collect();
        summary.duration = self.clock.instant().saturating_duration_since(started);

        log_summary("items", &summary);
        ParallelResult { summary, outputs }
    }

    async fn retrying<O, E, Fut>(&self, index: usize, mut attempt: impl FnMut() -> Fut) -> Result<O, String>
    where
        Fut: Future<Output = Result<O, E>>,
        E: Display,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Ok(output) => return Ok(output),
                Err(error) if self.options.retry_on_error && retries < self.options.max_retries => {
                    let delay = self.backoff.delay(retries);
                    tracing::debug!(
                        batch.index = index,
                        batch.retry = retries + 1,
                        batch.delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "batch operation failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retries += 1;
                }
                Err(error) => {
                    tracing::warn!(batch.index = index, batch.retries = retries, error = %error, "batch operation failed");
                    return Err(error.to_string());
                }
            }
        }
    }
}

fn log_summary(unit: &'static str, result: &BatchResult) {
    tracing::info!(
        batch.unit = unit,
        batch.total = result.total,
        batch.processed = result.processed,
        batch.failed = result.failed,
        batch.duration_ms = u64::try_from(result.duration_ms()).unwrap_or(u64::MAX),
        "batch completed"
    );
}
