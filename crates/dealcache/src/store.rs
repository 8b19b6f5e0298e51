// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The persistent product store the cache sits in front of.

use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dealcache_refresh::{RefreshSource, SourceError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A discounted product listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    /// Stable identifier.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Category slug.
    pub category: String,
    /// Current price.
    pub price: f64,
    /// Price before the discount.
    pub original_price: f64,
    /// Last change.
    pub updated_at: DateTime<Utc>,
}

impl ProductRecord {
    /// Discount in percent, zero when the original price is unknown or lower.
    #[must_use]
    pub fn discount_percent(&self) -> f64 {
        if self.original_price <= 0.0 || self.price >= self.original_price {
            return 0.0;
        }
        (1.0 - self.price / self.original_price) * 100.0
    }

    /// Cache key under which the record is stored.
    #[must_use]
    pub fn cache_key(&self) -> String {
        product_key(&self.id)
    }
}

/// Cache key of a product: `deals:product:<id>`.
#[must_use]
pub fn product_key(id: &str) -> String {
    format!("deals:product:{id}")
}

/// A failed store operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("product store {operation} failed: {message}")]
pub struct StoreError {
    operation: &'static str,
    message: String,
}

impl StoreError {
    /// Creates an error for the named operation.
    #[must_use]
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }

    /// The failing operation.
    #[must_use]
    pub fn operation(&self) -> &'static str {
        self.operation
    }
}

/// Bulk access to persisted products.
///
/// Failures propagate to the caller; the cache never masks them.
pub trait ProductStore: Send + Sync {
    /// Fetches the records that exist among `ids`, in no particular order.
    fn get_many(&self, ids: &[String]) -> impl Future<Output = Result<Vec<ProductRecord>, StoreError>> + Send;

    /// Inserts new records, returning how many were written.
    fn insert_many(&self, records: Vec<ProductRecord>) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Replaces existing records, returning how many were found.
    fn update_many(&self, records: Vec<ProductRecord>) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Deletes records, returning how many existed.
    fn delete_many(&self, ids: &[String]) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Every record.
    fn list(&self) -> impl Future<Output = Result<Vec<ProductRecord>, StoreError>> + Send;
}

impl<S: ProductStore> ProductStore for Arc<S> {
    fn get_many(&self, ids: &[String]) -> impl Future<Output = Result<Vec<ProductRecord>, StoreError>> + Send {
        (**self).get_many(ids)
    }

    fn insert_many(&self, records: Vec<ProductRecord>) -> impl Future<Output = Result<u64, StoreError>> + Send {
        (**self).insert_many(records)
    }

    fn update_many(&self, records: Vec<ProductRecord>) -> impl Future<Output = Result<u64, StoreError>> + Send {
        (**self).update_many(records)
    }

    fn delete_many(&self, ids: &[String]) -> impl Future<Output = Result<u64, StoreError>> + Send {
        (**self).delete_many(ids)
    }

    fn list(&self) -> impl Future<Output = Result<Vec<ProductRecord>, StoreError>> + Send {
        (**self).list()
    }
}

/// In-process [`ProductStore`] for tests and demos.
///
/// Writes touching an id registered with [`fail_on`](Self::fail_on) fail as a whole.
#[derive(Debug, Default)]
pub struct MemoryProductStore {
    records: DashMap<String, ProductRecord>,
    failing: Mutex<HashSet<String>>,
}

impl MemoryProductStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every operation that touches `id` fail.
    pub fn fail_on(&self, id: impl Into<String>) {
        self.failing.lock().insert(id.into());
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` when no record is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// A stored record.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<ProductRecord> {
        self.records.get(id).map(|r| r.value().clone())
    }

    fn check<'a>(&self, operation: &'static str, ids: impl IntoIterator<Item = &'a str>) -> Result<(), StoreError> {
        let failing = self.failing.lock();
        match ids.into_iter().find(|id| failing.contains(*id)) {
            Some(id) => Err(StoreError::new(operation, format!("record `{id}` rejected"))),
            None => Ok(()),
        }
    }
}

impl ProductStore for MemoryProductStore {
    async fn get_many(&self, ids: &[String]) -> Result<Vec<ProductRecord>, StoreError> {
        self.check("get_many", ids.iter().map(String::as_str))?;
        Ok(ids.iter().filter_map(|id| self.get(id)).collect())
    }

    async fn insert_many(&self, records: Vec<ProductRecord>) -> Result<u64, StoreError> {
        self.check("insert_many", records.iter().map(|r| r.id.as_str()))?;
        let mut written = 0;
        for record in records {
            self.records.insert(record.id.clone(), record);
            written += 1;
        }
        Ok(written)
    }

    async fn update_many(&self, records: Vec<ProductRecord>) -> Result<u64, StoreError> {
        self.check("update_many", records.iter().map(|r| r.id.as_str()))?;
        let mut updated = 0;
        for record in records {
            if let Some(mut existing) = self.records.get_mut(&record.id) {
                *existing = record;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete_many(&self, ids: &[String]) -> Result<u64, StoreError> {
        self.check("delete_many", ids.iter().map(String::as_str))?;
        Ok(ids.iter().filter(|id| self.records.remove(id.as_str()).is_some()).count() as u64)
    }

    async fn list(&self) -> Result<Vec<ProductRecord>, StoreError> {
        let mut records: Vec<_> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }
}

/// Key of the best current discounts.
pub const TOP_DISCOUNTS_VIEW: &str = "deals:view:top-discounts";
/// Key of the per-category product counts.
pub const CATEGORY_COUNTS_VIEW: &str = "deals:view:category-counts";
/// Key of the most recently updated deals.
pub const RECENT_VIEW: &str = "deals:view:recent";

/// Computes the aggregate deal views served by the materialized tier.
#[derive(Debug)]
pub struct DealViews<S> {
    store: S,
    limit: usize,
}

impl<S> DealViews<S> {
    /// Views over `store`, listing at most 20 deals each.
    pub fn new(store: S) -> Self {
        Self { store, limit: 20 }
    }

    /// Changes how many deals the list views hold.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

impl<S: ProductStore> RefreshSource<Value> for DealViews<S> {
    fn name(&self) -> &str {
        "deal-views"
    }

    async fn compute(&self) -> Result<Vec<(String, Value)>, SourceError> {
        let records = self.store.list().await?;

        let mut by_discount: Vec<&ProductRecord> = records.iter().filter(|r| r.discount_percent() > 0.0).collect();
        by_discount.sort_by(|a, b| b.discount_percent().total_cmp(&a.discount_percent()).then_with(|| a.id.cmp(&b.id)));
        by_discount.truncate(self.limit);

        let mut categories: BTreeMap<&str, u64> = BTreeMap::new();
        for record in &records {
            *categories.entry(record.category.as_str()).or_default() += 1;
        }

        let mut recent: Vec<&ProductRecord> = records.iter().collect();
        recent.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        recent.truncate(self.limit);

        Ok(vec![
            (TOP_DISCOUNTS_VIEW.to_string(), json!(by_discount)),
            (CATEGORY_COUNTS_VIEW.to_string(), json!(categories)),
            (RECENT_VIEW.to_string(), json!(recent)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn record(id: &str, category: &str, price: f64, original: f64, minute: u32) -> ProductRecord {
        ProductRecord {
            id: id.to_string(),
            title: format!("Product {id}"),
            category: category.to_string(),
            price,
            original_price: original,
            updated_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, minute, 0).unwrap(),
        }
    }

    #[test]
    fn discount_percent() {
        assert!((record("a", "c", 75.0, 100.0, 0).discount_percent() - 25.0).abs() < 1e-9);
        assert!(record("a", "c", 100.0, 90.0, 0).discount_percent().abs() < f64::EPSILON);
        assert!(record("a", "c", 10.0, 0.0, 0).discount_percent().abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn crud_round_trip() {
        let store = MemoryProductStore::new();
        assert_eq!(store.insert_many(vec![record("1", "tv", 1.0, 2.0, 0), record("2", "tv", 1.0, 2.0, 0)]).await, Ok(2));
        assert_eq!(store.update_many(vec![record("2", "audio", 1.0, 2.0, 1), record("3", "tv", 1.0, 2.0, 0)]).await, Ok(1));
        assert_eq!(store.get("2").map(|r| r.category), Some("audio".to_string()));
        assert_eq!(store.delete_many(&["1".to_string(), "9".to_string()]).await, Ok(1));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_ids_reject_the_whole_call() {
        let store = MemoryProductStore::new();
        store.fail_on("bad");

        let error = store
            .insert_many(vec![record("ok", "tv", 1.0, 2.0, 0), record("bad", "tv", 1.0, 2.0, 0)])
            .await
            .unwrap_err();
        assert_eq!(error.operation(), "insert_many");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn deal_views_aggregate_the_store() {
        let store = MemoryProductStore::new();
        store
            .insert_many(vec![
                record("a", "tv", 50.0, 100.0, 1),
                record("b", "tv", 90.0, 100.0, 3),
                record("c", "audio", 20.0, 100.0, 2),
                record("d", "audio", 100.0, 100.0, 0),
            ])
            .await
            .unwrap();

        let views: BTreeMap<String, Value> = DealViews::new(store).with_limit(2).compute().await.unwrap().into_iter().collect();

        let top: Vec<&str> = views[TOP_DISCOUNTS_VIEW]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["id"].as_str().unwrap())
            .collect();
        assert_eq!(top, ["c", "a"]);
        assert_eq!(views[CATEGORY_COUNTS_VIEW], json!({"audio": 2, "tv": 2}));

        let recent: Vec<&str> = views[RECENT_VIEW]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["id"].as_str().unwrap())
            .collect();
        assert_eq!(recent, ["b", "c"]);
    }
}
