// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;

use dealcache_redis::RedisCache;
use dealcache_refresh::MaterializedCache;
use dealcache_tier::{CacheTier, KeyPattern};
use serde_json::Value;

use super::{BatchOptions, BatchProcessor, BatchResult};
use crate::{
    CacheManager, Result,
    store::{ProductRecord, ProductStore, product_key},
};

/// Bulk product writes that keep the cache consistent with the store.
///
/// Every write invalidates the `deals:product:<id>` keys of the touched records and
/// then each configured list pattern, so derived listings are recomputed on next read.
#[derive(Debug)]
pub struct ProductBatch<S, R = RedisCache<Value>, M = MaterializedCache<Value>> {
    processor: BatchProcessor,
    store: S,
    cache: CacheManager<R, M>,
    list_patterns: Vec<String>,
}

impl<S, R, M> ProductBatch<S, R, M>
where
    S: ProductStore,
    R: CacheTier<Value>,
    M: CacheTier<Value>,
{
    /// Bulk helpers over `store` and `cache` with default [`BatchOptions`].
    pub fn new(store: S, cache: CacheManager<R, M>) -> Self {
        Self {
            processor: BatchProcessor::default(),
            store,
            cache,
            list_patterns: Vec::new(),
        }
    }

    /// Replaces the batch options.
    #[must_use]
    pub fn with_options(mut self, options: BatchOptions) -> Self {
        self.processor = BatchProcessor::new(options);
        self
    }

    /// Adds patterns, such as `deals:list:*`, invalidated after every bulk write.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pattern`](crate::Error::Pattern) for a pattern with more than one `*`.
    pub fn with_list_patterns<I, P>(mut self, patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        for pattern in patterns {
            let pattern = pattern.into();
            KeyPattern::parse(&pattern)?;
            self.list_patterns.push(pattern);
        }
        Ok(self)
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Inserts `records` chunk by chunk.
    pub async fn bulk_insert(&self, records: Vec<ProductRecord>) -> BatchResult {
        let result = self
            .processor
            .process_chunks(records, |chunk| async move {
                let ids = ids_of(&chunk);
                self.store.insert_many(chunk).await?;
                self.invalidate_products(&ids).await;
                Ok::<_, crate::store::StoreError>(())
            })
            .await;
        self.invalidate_lists(&result).await;
        result
    }

    /// Replaces existing `records` chunk by chunk.
    pub async fn bulk_update(&self, records: Vec<ProductRecord>) -> BatchResult {
        let result = self
            .processor
            .process_chunks(records, |chunk| async move {
                let ids = ids_of(&chunk);
                self.store.update_many(chunk).await?;
                self.invalidate_products(&ids).await;
                Ok::<_, crate::store::StoreError>(())
            })
            .await;
        self.invalidate_lists(&result).await;
        result
    }

    /// Deletes `ids` chunk by chunk.
    pub async fn bulk_delete(&self, ids: Vec<String>) -> BatchResult {
        let result = self
            .processor
            .process_chunks(ids, |chunk| async move {
                self.store.delete_many(&chunk).await?;
                self.invalidate_products(&chunk).await;
                Ok::<_, crate::store::StoreError>(())
            })
            .await;
        self.invalidate_lists(&result).await;
        result
    }

    /// Reads `ids` from the cache, fetching misses from the store and caching them.
    ///
    /// Returns one slot per id in input order; `None` when the store has no such record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`](crate::Error::Store) when the store fails. Cached
    /// values that no longer decode are treated as misses.
    pub async fn bulk_read(&self, ids: &[String]) -> Result<Vec<Option<ProductRecord>>> {
        let keys: Vec<String> = ids.iter().map(|id| product_key(id)).collect();
        let cached = self.cache.get_multiple(&keys).await;

        let mut found: HashMap<&str, ProductRecord> = HashMap::new();
        let mut missing: Vec<String> = Vec::new();
        for (id, value) in ids.iter().zip(cached) {
            match value.and_then(|value| serde_json::from_value::<ProductRecord>(value).ok()) {
                Some(record) => {
                    found.insert(id.as_str(), record);
                }
                None => missing.push(id.clone()),
            }
        }

        let mut fetched: HashMap<String, ProductRecord> = HashMap::new();
        for chunk in missing.chunks(self.processor.options().batch_size) {
            for record in self.store.get_many(chunk).await? {
                fetched.insert(record.id.clone(), record);
            }
        }

        if !fetched.is_empty() {
            let entries: Vec<(String, Value)> = fetched
                .values()
                .filter_map(|record| Some((record.cache_key(), serde_json::to_value(record).ok()?)))
                .collect();
            self.cache.set_multiple(entries, None).await;
        }

        tracing::debug!(
            batch.requested = ids.len(),
            batch.cached = found.len(),
            batch.fetched = fetched.len(),
            "bulk read completed"
        );

        Ok(ids
            .iter()
            .map(|id| found.get(id.as_str()).cloned().or_else(|| fetched.get(id).cloned()))
            .collect())
    }

    async fn invalidate_products(&self, ids: &[String]) {
        futures::future::join_all(ids.iter().map(|id| async move { self.cache.delete(&product_key(id)).await })).await;
    }

    async fn invalidate_lists(&self, result: &BatchResult) {
        if result.processed == 0 {
            return;
        }
        for pattern in &self.list_patterns {
            match self.cache.invalidate_pattern(pattern).await {
                Ok(removed) => tracing::debug!(cache.pattern = %pattern, removed, "list keys invalidated"),
                Err(error) => tracing::warn!(cache.pattern = %pattern, error = %error, "list invalidation failed"),
            }
        }
    }
}

fn ids_of(records: &[ProductRecord]) -> Vec<String> {
    records.iter().map(|record| record.id.clone()).collect()
}
