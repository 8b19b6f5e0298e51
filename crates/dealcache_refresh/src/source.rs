// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use futures::future::BoxFuture;

/// Error produced by a refresh source.
pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// Computes one or more materialized views.
///
/// Each pass replaces the views the source returns. A source typically runs a single
/// aggregate query against the persistent store and emits a handful of well-known keys.
///
/// # Examples
///
/// ```
/// use dealcache_refresh::{RefreshSource, SourceError};
///
/// struct TopDeals;
///
/// impl RefreshSource<u32> for TopDeals {
///     fn name(&self) -> &str {
///         "top-deals"
///     }
///
///     async fn compute(&self) -> Result<Vec<(String, u32)>, SourceError> {
///         Ok(vec![("deals:view:top-count".to_string(), 25)])
///     }
/// }
/// ```
pub trait RefreshSource<V>: Send + Sync {
    /// Name used in logs and reports.
    fn name(&self) -> &str;

    /// Produces the `(key, view)` pairs for this pass.
    fn compute(&self) -> impl Future<Output = Result<Vec<(String, V)>, SourceError>> + Send;
}

/// Object-safe form of [`RefreshSource`] so heterogeneous sources share one registry.
pub(crate) trait DynSource<V>: Send + Sync {
    fn name(&self) -> &str;

    fn compute_boxed(&self) -> BoxFuture<'_, Result<Vec<(String, V)>, SourceError>>;
}

impl<V, S> DynSource<V> for S
where
    V: 'static,
    S: RefreshSource<V>,
{
    fn name(&self) -> &str {
        RefreshSource::name(self)
    }

    fn compute_boxed(&self) -> BoxFuture<'_, Result<Vec<(String, V)>, SourceError>> {
        Box::pin(self.compute())
    }
}
