// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Coalesces duplicate async work into a single execution per key.
//!
//! [`FlightGroup`] lets many concurrent callers ask for the same keyed computation while only
//! one of them runs it. Every caller that joins a flight before it settles receives a clone of
//! the output, errors included when the output is a `Result`. When the flight settles its key is
//! released, so outputs are never reused by later callers: a `FlightGroup` is a stampede guard,
//! not a cache.
//!
//! # Example
//!
//! ```
//! use keyflight::FlightGroup;
//!
//! # async fn example() {
//! let group: FlightGroup<String, u64> = FlightGroup::new();
//!
//! let price = group
//!     .work("deals:product:1".to_string(), || async {
//!         // Runs once even when called concurrently.
//!         42
//!     })
//!     .await;
//! assert_eq!(price, 42);
//! # }
//! ```
//!
//! # Cancellation and Panics
//!
//! The caller running the computation holds the flight's slot. If that caller panics or its
//! future is dropped, the slot is released empty and the next waiting caller runs its own
//! closure. Callers that already received the output are unaffected.

use std::{
    borrow::Borrow,
    collections::HashMap,
    fmt,
    hash::Hash,
    sync::{Arc, Weak},
};

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;

type SharedMapping<K, T> = Arc<SyncMutex<HashMap<K, Weak<Slot<T>>>>>;

/// Holds the output of one flight. Callers queue on the lock; the first one to find it empty runs.
struct Slot<T> {
    output: AsyncMutex<Option<T>>,
}

/// Groups concurrent computations by key.
///
/// Cloning a `FlightGroup` yields a handle to the same set of flights.
pub struct FlightGroup<K, T> {
    mapping: SharedMapping<K, T>,
}

impl<K, T> fmt::Debug for FlightGroup<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlightGroup").field("flights", &self.mapping.lock().len()).finish()
    }
}

impl<K, T> Clone for FlightGroup<K, T> {
    fn clone(&self) -> Self {
        Self {
            mapping: Arc::clone(&self.mapping),
        }
    }
}

impl<K, T> Default for FlightGroup<K, T> {
    fn default() -> Self {
        Self {
            mapping: Arc::default(),
        }
    }
}

impl<K, T> FlightGroup<K, T>
where
    K: Hash + Eq + Clone,
{
    /// Creates an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `func` for `key` unless a flight for `key` is already running, in which case
    /// the call waits for that flight and returns a clone of its output.
    ///
    /// The returned future does not borrow the group.
    pub fn work<F, Fut>(&self, key: K, func: F) -> impl Future<Output = T> + use<K, T, F, Fut>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
        T: Clone,
    {
        let slot = self.join(&key);
        let mapping = Arc::clone(&self.mapping);

        async move {
            let mut output = slot.output.lock().await;
            if let Some(value) = output.as_ref() {
                return value.clone();
            }

            let value = func().await;
            *output = Some(value.clone());
            drop(output);

            release(&mapping, &key, &slot);
            value
        }
    }

    /// Number of flights with at least one live caller.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.mapping.lock().values().filter(|slot| slot.strong_count() > 0).count()
    }

    /// Returns `true` while a flight for `key` has live callers.
    #[must_use]
    pub fn is_in_flight<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.mapping.lock().get(key).is_some_and(|slot| slot.strong_count() > 0)
    }

    fn join(&self, key: &K) -> Arc<Slot<T>> {
        let mut mapping = self.mapping.lock();
        if let Some(slot) = mapping.get(key).and_then(Weak::upgrade) {
            return slot;
        }

        // No flight, or every caller of the previous one went away.
        let slot = Arc::new(Slot {
            output: AsyncMutex::new(None),
        });
        mapping.insert(key.clone(), Arc::downgrade(&slot));
        slot
    }
}

/// Frees `key` if it still refers to `slot`.
fn release<K, T>(mapping: &SharedMapping<K, T>, key: &K, slot: &Arc<Slot<T>>)
where
    K: Hash + Eq,
{
    let mut mapping = mapping.lock();
    if mapping.get(key).is_some_and(|current| std::ptr::eq(current.as_ptr(), Arc::as_ptr(slot))) {
        mapping.remove(key);
    }
}
