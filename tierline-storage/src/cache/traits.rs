//! Collaborator traits and the cacheable value marker.
//!
//! The cache never talks to a disk or a network interface directly. It
//! reaches its collaborators through the traits below, so tests and embedders
//! can substitute any medium or probe.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tierline_core::StoreError;

/// Marker trait for values the cache can hold.
///
/// # Implementation Requirements
///
/// - `Clone` so the fast tier can hand out copies of a shared value
/// - `Serialize` and `DeserializeOwned` for the durable tier
/// - `Send + Sync + 'static` for async compatibility
///
/// Blanket-implemented; there is nothing to implement by hand.
pub trait Cacheable: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Cacheable for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// A string-keyed persistent store the durable tier writes through.
///
/// Implementations should be thread-safe and support concurrent access.
/// Writes are last-writer-wins; no transactional guarantees are expected
/// across calls.
#[async_trait]
pub trait DurableMedium: Send + Sync {
    /// Get the raw value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// List every key in the medium, including keys the cache does not own.
    async fn list_all_keys(&self) -> Result<Vec<String>, StoreError>;

    /// Remove several keys at once, returning how many existed.
    async fn remove_many(&self, keys: &[String]) -> Result<u64, StoreError>;
}

/// A platform check answering "am I online?".
///
/// Latency is unspecified and may be unbounded; callers wrap it in
/// [`NetworkMonitor`](super::reachability::NetworkMonitor) to bound it.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn probe(&self) -> bool;
}
