//! Two-tier cache with network-aware fallback.
//!
//! This module provides a read-through cache over a fast in-process tier and
//! a durable tier backed by any [`DurableMedium`], with LMDB as the shipped
//! on-disk medium.
//!
//! # Design Philosophy
//!
//! Every read says where its value came from. Callers receive a
//! [`CacheRead<T>`] carrying the [`ReadSource`] and, when the network was
//! down and the value was served past its TTL, a stale-data warning. Offline
//! behaviour is opt-in per read through `critical_data`.
//!
//! # Example
//!
//! ```ignore
//! let read = cache
//!     .read_through("user:42", || fetch_profile(42), &CacheOptions::new())
//!     .await?;
//!
//! if let Some(read) = read {
//!     if let Some(warning) = read.warning() {
//!         tracing::warn!(%warning, "showing cached profile");
//!     }
//! }
//! ```

pub mod durable_store;
pub mod fast_store;
pub mod freshness;
pub mod lmdb_medium;
pub mod memory_medium;
pub mod metrics;
pub mod reachability;
pub mod read_through;
pub mod traits;

pub use durable_store::{DurableStore, EvictionReport};
pub use fast_store::FastStore;
pub use freshness::{CacheRead, ReadSource};
pub use lmdb_medium::{LmdbMedium, LmdbMediumError};
pub use memory_medium::InMemoryMedium;
pub use metrics::MetricsCollector;
pub use reachability::{AlwaysReachable, NetworkMonitor, TcpConnectProbe};
pub use read_through::ReadThroughCache;
pub use traits::{Cacheable, DurableMedium, ReachabilityProbe};
