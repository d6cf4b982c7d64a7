//! In-process cache tier.
//!
//! Holds hot entries for the lifetime of the process. Reads and writes are
//! synchronous and never touch I/O. The map is sharded, so concurrent callers
//! on different keys do not contend on a single lock.
//!
//! The store never expires anything by itself: whether an entry is fresh is
//! decided by the caller comparing `stored_at` against its own TTL, so two
//! callers can read the same entry under different policies.

use std::any::Any;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tierline_core::{CacheEntry, CacheKey, KeyPattern};
use tracing::debug;

/// A type-erased value plus the time it was written.
#[derive(Clone)]
struct Slot {
    value: Arc<dyn Any + Send + Sync>,
    stored_at: DateTime<Utc>,
}

/// Fast, non-persistent cache tier.
#[derive(Default)]
pub struct FastStore {
    entries: DashMap<CacheKey, Slot>,
}

impl FastStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the entry under `key` if one exists with payload type `T`.
    ///
    /// An entry written with a different type reads as absent.
    pub fn get<T>(&self, key: &CacheKey) -> Option<CacheEntry<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let slot = self.entries.get(key)?.value().clone();
        match slot.value.downcast_ref::<T>() {
            Some(value) => Some(CacheEntry::new(key.clone(), value.clone(), slot.stored_at)),
            None => {
                debug!(key = %key, "fast store entry has a different type, treating as miss");
                None
            }
        }
    }

    /// Store `data` under `key`, stamping it with the current time.
    ///
    /// Always overwrites. Returns the stamp.
    pub fn set<T>(&self, key: &CacheKey, data: T) -> DateTime<Utc>
    where
        T: Send + Sync + 'static,
    {
        let stored_at = Utc::now();
        self.entries.insert(
            key.clone(),
            Slot {
                value: Arc::new(data),
                stored_at,
            },
        );
        stored_at
    }

    /// Copy an entry read from another tier, keeping its original stamp.
    pub fn promote<T>(&self, entry: &CacheEntry<T>)
    where
        T: Clone + Send + Sync + 'static,
    {
        self.entries.insert(
            entry.key.clone(),
            Slot {
                value: Arc::new(entry.data.clone()),
                stored_at: entry.stored_at,
            },
        );
    }

    /// Remove a single key. Returns whether it was present.
    pub fn remove(&self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every key whose logical name matches `pattern`.
    pub fn remove_matching(&self, pattern: &KeyPattern) -> usize {
        let mut removed = 0;
        self.entries.retain(|key, _| {
            if pattern.matches_key(key) {
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for FastStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastStore")
            .field("entries", &self.entries.len())
            .finish()
    }
}
