// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! JSON encoding of entries stored in Redis.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dealcache_tier::CacheEntry;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

#[derive(Serialize)]
struct EnvelopeRef<'a, V> {
    v: &'a V,
    s: u64,
    e: u64,
}

#[derive(Deserialize)]
struct Envelope<V> {
    v: V,
    s: u64,
    e: u64,
}

pub(crate) fn encode<V: Serialize>(entry: &CacheEntry<V>) -> serde_json::Result<String> {
    serde_json::to_string(&EnvelopeRef {
        v: entry.value(),
        s: to_millis(entry.stored_at()),
        e: to_millis(entry.expires_at()),
    })
}

pub(crate) fn decode<V: DeserializeOwned>(raw: &str) -> serde_json::Result<CacheEntry<V>> {
    let envelope: Envelope<V> = serde_json::from_str(raw)?;
    Ok(CacheEntry::from_parts(envelope.v, from_millis(envelope.s), from_millis(envelope.e)))
}

pub(crate) fn to_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

fn from_millis(millis: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_form_is_compact_json() {
        let stored = UNIX_EPOCH + Duration::from_secs(10);
        let entry = CacheEntry::new(serde_json::json!({"price": 9.5}), stored, Duration::from_secs(5));

        let raw = encode(&entry).unwrap();

        assert_eq!(raw, r#"{"v":{"price":9.5},"s":10000,"e":15000}"#);
        let back: CacheEntry<serde_json::Value> = decode(&raw).unwrap();
        assert_eq!(back.expires_at(), entry.expires_at());
        assert_eq!(back.value(), entry.value());
    }

    #[test]
    fn foreign_payload_is_rejected() {
        assert!(decode::<u32>("not json").is_err());
        assert!(decode::<u32>(r#"{"v":"text","s":0,"e":0}"#).is_err());
    }
}
