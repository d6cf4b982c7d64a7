//! TIERLINE Storage - Tiered Read-Through Cache
//!
//! Cache tiers, durable media, reachability checks and the read-through
//! orchestrator. Plain data types live in `tierline-core`.

pub mod cache;

// Re-export cache types for embedders
pub use cache::{
    AlwaysReachable, CacheRead, Cacheable, DurableMedium, DurableStore, EvictionReport, FastStore,
    InMemoryMedium, LmdbMedium, LmdbMediumError, MetricsCollector, NetworkMonitor,
    ReachabilityProbe, ReadSource, ReadThroughCache, TcpConnectProbe,
};
