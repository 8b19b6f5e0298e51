// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! The database-backed tier (L3): precomputed views refreshed ahead of expiry.
//!
//! A [`MaterializedCache`] holds views produced by registered [`RefreshSource`]s.
//! A background loop started with [`MaterializedCache::spawn`] recomputes them on a fixed
//! interval; views live for at least one interval so readers always find the last
//! successful result. Reads never trigger computation.

mod config;
mod source;
mod tier;

pub use config::RefreshConfig;
pub use source::{RefreshSource, SourceError};
pub use tier::{MaterializedCache, RefreshHandle, RefreshReport};
