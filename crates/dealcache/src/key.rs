// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Write as _};

use serde_json::Value;
use xxhash_rust::xxh3::xxh3_64;

/// A cache key of the form `service:entity:identifier[:paramHash]`.
///
/// `paramHash` is the XXH3-64 hash, as 16 lowercase hex digits, of the parameters
/// serialized as JSON with object keys sorted at every level. Two parameter objects
/// holding the same pairs therefore produce the same key however they were built.
///
/// # Examples
///
/// ```
/// use dealcache::{CacheKey, KeyDescriptor};
/// use serde_json::json;
///
/// let a = CacheKey::generate(&KeyDescriptor::new("deals", "search", "laptops").with_params(json!({"page": 2, "sort": "price"})));
/// let b = CacheKey::generate(&KeyDescriptor::new("deals", "search", "laptops").with_params(json!({"sort": "price", "page": 2})));
///
/// assert_eq!(a, b);
/// assert!(a.as_str().starts_with("deals:search:laptops:"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Builds the key for a descriptor.
    #[must_use]
    pub fn generate(descriptor: &KeyDescriptor) -> Self {
        let mut key = format!("{}:{}:{}", descriptor.service, descriptor.entity, descriptor.identifier);
        if let Some(params) = &descriptor.params {
            let _ = write!(key, ":{:016x}", param_hash(params));
        }
        Self(key)
    }

    /// The key text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the key, returning its text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// The `service:entity` part of the key, used to group latency samples.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        endpoint_of(&self.0)
    }
}

pub(crate) fn endpoint_of(key: &str) -> &str {
    match key.match_indices(':').nth(1) {
        Some((at, _)) => &key[..at],
        None => key,
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

/// The parts a [`CacheKey`] is built from.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyDescriptor {
    /// Owning service, e.g. `deals`.
    pub service: String,
    /// Entity kind, e.g. `product`.
    pub entity: String,
    /// Entity identifier, e.g. a product id or a search term.
    pub identifier: String,
    /// Optional query parameters, hashed into the key.
    pub params: Option<Value>,
}

impl KeyDescriptor {
    /// Creates a descriptor without parameters.
    #[must_use]
    pub fn new(service: impl Into<String>, entity: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            entity: entity.into(),
            identifier: identifier.into(),
            params: None,
        }
    }

    /// Sets the parameters.
    #[must_use]
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }
}

fn param_hash(params: &Value) -> u64 {
    let mut canonical = String::new();
    write_canonical(params, &mut canonical);
    xxh3_64(canonical.as_bytes())
}

/// Writes compact JSON with object keys sorted, independent of map ordering features.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
