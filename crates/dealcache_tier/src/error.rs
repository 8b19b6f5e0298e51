// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for tier operations.

use std::time::Duration;

use crate::{Layer, PatternError};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An error from a tier operation.
///
/// Tier errors never reach cache callers: the manager turns them into misses.
/// They exist so that tiers can report what went wrong for logging and health.
///
/// # Example
///
/// ```
/// use dealcache_tier::{Error, Layer};
///
/// let error = Error::backend(Layer::Distributed, "connection reset");
/// assert_eq!(error.layer(), Some(Layer::Distributed));
/// ```
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The operation did not complete in time.
    #[error("{layer} operation timed out after {after:?}")]
    Timeout {
        /// Tier that timed out.
        layer: Layer,
        /// Time budget that was exceeded.
        after: Duration,
    },

    /// The backend could not be reached.
    #[error("{layer} is unavailable: {reason}")]
    Unavailable {
        /// Tier that is unavailable.
        layer: Layer,
        /// Why the tier is unavailable.
        reason: String,
    },

    /// The backend reported a failure.
    #[error("{layer} backend error: {source}")]
    Backend {
        /// Tier that failed.
        layer: Layer,
        /// The underlying cause.
        #[source]
        source: BoxError,
    },

    /// A stored value could not be encoded or decoded.
    #[error("{layer} payload could not be (de)serialized: {source}")]
    Serialization {
        /// Tier that failed.
        layer: Layer,
        /// The underlying cause.
        #[source]
        source: BoxError,
    },

    /// A pattern could not be parsed.
    #[error(transparent)]
    Pattern(#[from] PatternError),
}

impl Error {
    /// Creates a backend error from any cause.
    pub fn backend(layer: Layer, cause: impl Into<BoxError>) -> Self {
        Self::Backend {
            layer,
            source: cause.into(),
        }
    }

    /// Creates a serialization error from any cause.
    pub fn serialization(layer: Layer, cause: impl Into<BoxError>) -> Self {
        Self::Serialization {
            layer,
            source: cause.into(),
        }
    }

    /// Returns the tier the error came from.
    #[must_use]
    pub fn layer(&self) -> Option<Layer> {
        match self {
            Self::Timeout { layer, .. } | Self::Unavailable { layer, .. } | Self::Backend { layer, .. } | Self::Serialization { layer, .. } => {
                Some(*layer)
            }
            Self::Pattern(_) => None,
        }
    }

    /// Returns `true` for timeouts.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// A specialized [`Result`] type for tier operations.
pub type Result<T> = std::result::Result<T, Error>;
