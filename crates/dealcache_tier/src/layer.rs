// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies one of the storage tiers, ordered from fastest to slowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Layer {
    /// In-process memory tier (L1).
    #[serde(rename = "l1")]
    Memory,
    /// Shared distributed tier (L2).
    #[serde(rename = "l2")]
    Distributed,
    /// Database-backed materialized views (L3).
    #[serde(rename = "l3")]
    Materialized,
}

impl Layer {
    /// All layers in lookup order.
    pub const ALL: [Self; 3] = [Self::Memory, Self::Distributed, Self::Materialized];

    /// Returns the short name used in logs and reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "l1",
            Self::Distributed => "l2",
            Self::Materialized => "l3",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_str_matches_serialized_form() {
        for layer in Layer::ALL {
            let json = serde_json::to_string(&layer).unwrap();
            assert_eq!(json, format!("\"{}\"", layer.as_str()));
        }
    }

    #[test]
    fn layers_order_from_fastest() {
        assert!(Layer::Memory < Layer::Distributed);
        assert!(Layer::Distributed < Layer::Materialized);
    }
}
