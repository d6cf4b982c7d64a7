//! TIERLINE Core - Cache Data Types
//!
//! Pure data structures shared by the cache tiers and the read-through
//! orchestrator. This crate performs no I/O.

pub mod config;
pub mod entry;
pub mod error;
pub mod key;
pub mod metrics;
pub mod options;
pub mod retry;

pub use config::{EvictionMode, TierlineConfig};
pub use entry::{CacheEntry, RemoteResponse};
pub use error::{
    ApplicationError, ConfigError, ReadThroughError, StaleDataWarning, StoreError, TierlineError,
    TierlineResult, TransportError,
};
pub use key::{CacheKey, KeyPattern};
pub use metrics::{CachePerformanceMetrics, Outcome};
pub use options::{CacheOptions, DEFAULT_TTL};
pub use retry::{BackoffStrategy, RetryPolicy};

/// Timestamp type using UTC timezone.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
