// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Errors surfaced by the cache manager and its companions.

use std::sync::Arc;

use dealcache_tier::PatternError;

use crate::{rate_limit::RateLimitExceeded, store::StoreError};

/// A type-erased error that can be shared between the waiters of one computation.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// Errors returned by [`CacheManager`](crate::CacheManager) and friends.
///
/// Tier faults never appear here: the distributed and materialized tiers degrade to
/// misses instead. The error is `Clone` so a single failed computation can be handed
/// to every caller that waited on it.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The producer passed to `get_or_compute` failed.
    #[error("computing `{key}` failed: {source}")]
    Compute {
        /// Key being computed.
        key: String,
        /// The producer's error.
        #[source]
        source: SharedError,
    },

    /// A value could not be converted to or from JSON.
    #[error("value for `{key}` could not be (de)serialized: {source}")]
    Serialization {
        /// Key of the value.
        key: String,
        /// The underlying cause.
        #[source]
        source: Arc<serde_json::Error>,
    },

    /// A provider's daily quota is spent.
    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),

    /// The provider has no configured quota.
    #[error("no quota is configured for provider `{0}`")]
    UnknownProvider(String),

    /// The persistent store rejected an operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An invalidation pattern could not be parsed.
    #[error(transparent)]
    Pattern(#[from] PatternError),

    /// A configuration value could not be parsed.
    #[error("invalid value `{value}` for `{name}`")]
    Config {
        /// Setting name.
        name: String,
        /// Rejected value.
        value: String,
    },
}

impl Error {
    pub(crate) fn compute(key: &str, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Compute {
            key: key.to_string(),
            source: Arc::from(source.into()),
        }
    }

    pub(crate) fn serialization(key: &str, source: serde_json::Error) -> Self {
        Self::Serialization {
            key: key.to_string(),
            source: Arc::new(source),
        }
    }

    /// Returns the quota details when this is a rate-limit rejection.
    #[must_use]
    pub fn as_rate_limited(&self) -> Option<&RateLimitExceeded> {
        match self {
            Self::RateLimited(exceeded) => Some(exceeded),
            _ => None,
        }
    }
}

/// Result alias for this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
