//! Cache entries and remote responses.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::error::ApplicationError;
use crate::key::CacheKey;

/// A value held by one of the cache tiers.
///
/// `stored_at` is stamped once by the tier that wrote the entry, from that
/// tier's wall clock.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub key: CacheKey,
    pub data: T,
    pub stored_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn new(key: CacheKey, data: T, stored_at: DateTime<Utc>) -> Self {
        Self {
            key,
            data,
            stored_at,
        }
    }

    /// Time elapsed since the entry was written, as of `now`.
    ///
    /// Entries stamped in the future (clock skew between tiers) have age zero.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.stored_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Time elapsed since the entry was written.
    pub fn age(&self) -> Duration {
        self.age_at(Utc::now())
    }

    /// Fresh iff `now - stored_at < ttl`.
    pub fn is_fresh_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.age_at(now) < ttl
    }

    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.is_fresh_at(ttl, Utc::now())
    }

    pub fn into_data(self) -> T {
        self.data
    }

    /// Map the payload, keeping key and timestamp.
    pub fn map<U, F>(self, f: F) -> CacheEntry<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheEntry {
            key: self.key,
            data: f(self.data),
            stored_at: self.stored_at,
        }
    }
}

/// What a fetch function resolves with when it did not fail at the
/// transport level.
///
/// Mirrors the `{ data, error }` shape most remote clients hand back. A
/// response with `error` set is an application failure regardless of `data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteResponse<T> {
    pub data: Option<T>,
    pub error: Option<ApplicationError>,
}

impl<T> RemoteResponse<T> {
    /// A successful response carrying data.
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    /// A response carrying an application error.
    pub fn error(error: ApplicationError) -> Self {
        Self {
            data: None,
            error: Some(error),
        }
    }

    /// A response with neither data nor error.
    pub fn empty() -> Self {
        Self {
            data: None,
            error: None,
        }
    }
}

impl<T> From<Result<Option<T>, ApplicationError>> for RemoteResponse<T> {
    fn from(result: Result<Option<T>, ApplicationError>) -> Self {
        match result {
            Ok(data) => Self { data, error: None },
            Err(error) => Self::error(error),
        }
    }
}
