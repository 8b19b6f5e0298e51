// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use serde::Serialize;

use crate::Layer;

/// Whether a tier is serving requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TierState {
    /// The tier answers requests.
    Available,
    /// The tier is configured but its backend is failing or unreachable.
    Unavailable,
    /// The tier is switched off by configuration.
    Disabled,
}

/// Health of a single tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierHealth {
    /// The tier being described.
    pub layer: Layer,
    /// Current state.
    pub state: TierState,
    /// The most recent failure, if the tier is unavailable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl TierHealth {
    /// A tier that answers requests.
    #[must_use]
    pub fn available(layer: Layer) -> Self {
        Self {
            layer,
            state: TierState::Available,
            last_error: None,
        }
    }

    /// A tier whose backend is failing.
    #[must_use]
    pub fn unavailable(layer: Layer, error: impl Into<String>) -> Self {
        Self {
            layer,
            state: TierState::Unavailable,
            last_error: Some(error.into()),
        }
    }

    /// A tier switched off by configuration.
    #[must_use]
    pub fn disabled(layer: Layer) -> Self {
        Self {
            layer,
            state: TierState::Disabled,
            last_error: None,
        }
    }

    /// Returns `true` when the tier is available.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.state == TierState::Available
    }
}
