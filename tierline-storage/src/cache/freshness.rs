//! Read results carrying their provenance.
//!
//! Every successful read says where the value came from and, when it was
//! served past its TTL, why.

use chrono::{DateTime, Utc};
use std::time::Duration;

use tierline_core::{CacheEntry, StaleDataWarning};

/// Where a `read_through` value was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadSource {
    /// Fresh entry from the in-process tier.
    FastStore,
    /// Fresh entry from the durable tier (promoted into the fast tier).
    DurableStore,
    /// Live fetch.
    Remote,
    /// Expired or unchecked entry served because the network is unavailable.
    StaleFallback,
}

/// Result of a successful read, carrying staleness metadata.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    /// The value.
    value: T,
    /// When the serving tier wrote this value.
    stored_at: DateTime<Utc>,
    source: ReadSource,
    warning: Option<StaleDataWarning>,
}

impl<T> CacheRead<T> {
    /// A fresh value from one of the cache tiers.
    pub fn from_cache(entry: CacheEntry<T>, source: ReadSource) -> Self {
        Self {
            value: entry.data,
            stored_at: entry.stored_at,
            source,
            warning: None,
        }
    }

    /// A value that was just fetched from the remote.
    pub fn from_remote(value: T, stored_at: DateTime<Utc>) -> Self {
        Self {
            value,
            stored_at,
            source: ReadSource::Remote,
            warning: None,
        }
    }

    /// A possibly outdated value served while offline.
    pub fn stale(entry: CacheEntry<T>) -> Self {
        let warning = StaleDataWarning {
            key: entry.key.logical().to_string(),
            stored_at: entry.stored_at,
            age: entry.age(),
        };
        Self {
            value: entry.data,
            stored_at: entry.stored_at,
            source: ReadSource::StaleFallback,
            warning: Some(warning),
        }
    }

    /// Consume the wrapper and return the underlying value.
    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn stored_at(&self) -> DateTime<Utc> {
        self.stored_at
    }

    pub fn source(&self) -> ReadSource {
        self.source
    }

    /// Present only when the value was served stale because the network was
    /// unavailable.
    pub fn warning(&self) -> Option<&StaleDataWarning> {
        self.warning.as_ref()
    }

    pub fn is_stale(&self) -> bool {
        self.warning.is_some()
    }

    /// True unless the value came from a live fetch.
    pub fn served_from_cache(&self) -> bool {
        self.source != ReadSource::Remote
    }

    /// Duration since the value was stored.
    pub fn staleness(&self) -> Duration {
        Utc::now()
            .signed_duration_since(self.stored_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Map the inner value to a new type.
    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            stored_at: self.stored_at,
            source: self.source,
            warning: self.warning,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}
