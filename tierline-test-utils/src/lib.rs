//! TIERLINE Test Utilities
//!
//! Centralized test infrastructure for the TIERLINE workspace:
//! - Controllable reachability probes and failure-injecting media
//! - Scripted fetch functions that count and time their calls
//! - Proptest generators for names, stamps and options
//! - Test fixtures and custom assertions

// Re-export core types for convenience
pub use tierline_core::{
    ApplicationError, CacheEntry, CacheKey, CacheOptions, CachePerformanceMetrics, EvictionMode,
    KeyPattern, Outcome, ReadThroughError, RemoteResponse, StoreError, TierlineConfig, Timestamp,
    TransportError,
};
pub use tierline_storage::{
    CacheRead, DurableMedium, InMemoryMedium, MetricsCollector, ReachabilityProbe, ReadSource,
    ReadThroughCache,
};

use std::future::Ready;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

// ============================================================================
// TRACING
// ============================================================================

/// Install a fmt subscriber for test output. Safe to call from every test.
///
/// Honors `RUST_LOG`; defaults to debug output for the tierline crates.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tierline_storage=debug,tierline_core=debug,warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// MOCK PROBES
// ============================================================================

/// Probe whose answer the test flips at will.
#[derive(Debug)]
pub struct StaticProbe {
    online: AtomicBool,
    calls: AtomicUsize,
}

impl StaticProbe {
    pub fn online() -> Self {
        Self {
            online: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn offline() -> Self {
        Self {
            online: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// How many times the probe was consulted.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReachabilityProbe for StaticProbe {
    async fn probe(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.online.load(Ordering::SeqCst)
    }
}

/// Probe that never answers.
#[derive(Debug, Default)]
pub struct HangingProbe;

#[async_trait]
impl ReachabilityProbe for HangingProbe {
    async fn probe(&self) -> bool {
        std::future::pending::<bool>().await
    }
}

// ============================================================================
// MOCK MEDIA
// ============================================================================

/// In-memory medium that fails reads or writes on demand.
#[derive(Debug, Default)]
pub struct FlakyMedium {
    inner: InMemoryMedium,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FlakyMedium {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// The healthy medium underneath, bypassing injected failures.
    pub fn inner(&self) -> &InMemoryMedium {
        &self.inner
    }

    fn check(&self, flag: &AtomicBool, operation: &str) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::medium(operation, "injected failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DurableMedium for FlakyMedium {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check(&self.fail_reads, "get")?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.check(&self.fail_writes, "set")?;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.check(&self.fail_writes, "remove")?;
        self.inner.remove(key).await
    }

    async fn list_all_keys(&self) -> Result<Vec<String>, StoreError> {
        self.check(&self.fail_reads, "list_all_keys")?;
        self.inner.list_all_keys().await
    }

    async fn remove_many(&self, keys: &[String]) -> Result<u64, StoreError> {
        self.check(&self.fail_writes, "remove_many")?;
        self.inner.remove_many(keys).await
    }
}

// ============================================================================
// SCRIPTED FETCHERS
// ============================================================================

/// One scripted fetch result.
pub type FetchResult<T> = Result<RemoteResponse<T>, TransportError>;

/// A fetch function that replays a script and records every call.
///
/// Once the script runs out, the last step repeats.
#[derive(Debug, Clone)]
pub struct ScriptedFetch<T> {
    script: Arc<Vec<FetchResult<T>>>,
    calls: Arc<AtomicUsize>,
    call_times: Arc<Mutex<Vec<tokio::time::Instant>>>,
}

impl<T: Clone + Send + Sync + 'static> ScriptedFetch<T> {
    pub fn new(script: Vec<FetchResult<T>>) -> Self {
        assert!(!script.is_empty(), "a fetch script needs at least one step");
        Self {
            script: Arc::new(script),
            calls: Arc::new(AtomicUsize::new(0)),
            call_times: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always succeeds with `value`.
    pub fn returning(value: T) -> Self {
        Self::new(vec![Ok(RemoteResponse::ok(value))])
    }

    /// Always fails at the transport level.
    pub fn failing(message: &str) -> Self {
        Self::new(vec![Err(TransportError::new(message))])
    }

    /// Fails `failures` times, then succeeds with `value`.
    pub fn failing_then(failures: usize, value: T) -> Self {
        let mut script: Vec<FetchResult<T>> = (0..failures)
            .map(|i| Err(TransportError::new(format!("transient failure {}", i + 1))))
            .collect();
        script.push(Ok(RemoteResponse::ok(value)));
        Self::new(script)
    }

    /// Always answers with an application error.
    pub fn rejecting(error: ApplicationError) -> Self {
        Self::new(vec![Ok(RemoteResponse::error(error))])
    }

    /// Always answers with neither data nor error.
    pub fn empty() -> Self {
        Self::new(vec![Ok(RemoteResponse::empty())])
    }

    /// A closure suitable for `read_through`. Clones share the call log.
    pub fn fetcher(&self) -> impl FnMut() -> Ready<FetchResult<T>> + Send {
        let this = self.clone();
        move || std::future::ready(this.next())
    }

    fn next(&self) -> FetchResult<T> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_times
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(tokio::time::Instant::now());
        let step = index.min(self.script.len() - 1);
        self.script[step].clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Instants at which each call happened, in call order.
    pub fn call_times(&self) -> Vec<tokio::time::Instant> {
        self.call_times
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for cache inputs.

    use super::*;
    use proptest::prelude::*;

    /// A logical key name such as `user:42` or `order:7`.
    pub fn arb_logical_name() -> impl Strategy<Value = String> {
        ("[a-z]{1,8}", 0u32..10_000).prop_map(|(kind, id)| format!("{}:{}", kind, id))
    }

    /// A set of distinct logical names.
    pub fn arb_distinct_names(max: usize) -> impl Strategy<Value = Vec<String>> {
        prop::collection::btree_set(arb_logical_name(), 1..=max)
            .prop_map(|names| names.into_iter().collect())
    }

    /// Epoch-millisecond stamps within 2020-2030.
    pub fn arb_stored_at_ms() -> impl Strategy<Value = i64> {
        1_577_836_800_000i64..1_893_456_000_000i64
    }

    /// A timestamp within 2020-2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        arb_stored_at_ms().prop_map(|ms| {
            chrono::DateTime::from_timestamp_millis(ms).unwrap_or_else(chrono::Utc::now)
        })
    }

    /// Read options with any combination of flags and a short TTL.
    pub fn arb_cache_options() -> impl Strategy<Value = CacheOptions> {
        (0u64..600, any::<bool>(), any::<bool>(), any::<bool>()).prop_map(
            |(ttl_secs, force_refresh, critical_data, persist_to_storage)| CacheOptions {
                ttl: std::time::Duration::from_secs(ttl_secs),
                force_refresh,
                critical_data,
                persist_to_storage,
            },
        )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built caches and values for common testing scenarios.

    use super::*;
    use serde::{Deserialize, Serialize};

    pub type TestCache = ReadThroughCache<InMemoryMedium, StaticProbe>;

    /// A small structured payload.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Profile {
        pub id: u64,
        pub name: String,
    }

    impl Profile {
        pub fn new(id: u64, name: &str) -> Self {
            Self {
                id,
                name: name.to_string(),
            }
        }
    }

    /// Namespace `ns:`, eviction sampled on every call and run inline.
    pub fn deterministic_config() -> TierlineConfig {
        TierlineConfig {
            namespace: "ns:".to_string(),
            eviction_probability: 1.0,
            eviction_mode: EvictionMode::Inline,
            ..TierlineConfig::default()
        }
    }

    /// An online cache over an in-memory medium.
    pub fn test_cache() -> (TestCache, Arc<StaticProbe>) {
        test_cache_with(deterministic_config())
    }

    pub fn test_cache_with(config: TierlineConfig) -> (TestCache, Arc<StaticProbe>) {
        let probe = Arc::new(StaticProbe::online());
        let cache = ReadThroughCache::new(
            Arc::new(InMemoryMedium::new()),
            Arc::clone(&probe),
            Arc::new(MetricsCollector::new()),
            config,
        )
        .expect("valid config");
        (cache, probe)
    }

    /// Write a raw persisted entry with an explicit stamp, bypassing the
    /// store's clock.
    pub async fn seed_durable<M: DurableMedium>(
        medium: &M,
        key: &CacheKey,
        data: &str,
        stored_at_ms: i64,
    ) -> Result<(), StoreError> {
        let payload = format!(r#"{{"data":"{}","storedAt":{}}}"#, data, stored_at_ms);
        medium.set(key.as_str(), payload).await
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for read results and counters.

    use super::*;

    /// Assert that a read succeeded with a value from `source`.
    #[track_caller]
    pub fn assert_served_from<T: std::fmt::Debug>(
        result: &Result<Option<CacheRead<T>>, ReadThroughError>,
        source: ReadSource,
    ) {
        match result {
            Ok(Some(read)) => assert_eq!(read.source(), source, "wrong read source"),
            other => panic!("Expected a value from {:?}, got: {:?}", source, other),
        }
    }

    /// Assert that a read failed because the network was unavailable.
    #[track_caller]
    pub fn assert_offline<T: std::fmt::Debug>(
        result: &Result<Option<CacheRead<T>>, ReadThroughError>,
    ) {
        match result {
            Err(ReadThroughError::NetworkUnavailable { .. }) => {}
            other => panic!("Expected NetworkUnavailable, got: {:?}", other),
        }
    }

    /// Assert hit, miss and error counters at once.
    #[track_caller]
    pub fn assert_counts(metrics: &CachePerformanceMetrics, hits: u64, misses: u64, errors: u64) {
        assert_eq!(
            (metrics.hit_count, metrics.miss_count, metrics.error_count),
            (hits, misses, errors),
            "(hits, misses, errors) mismatch in {:?}",
            metrics
        );
        assert_eq!(metrics.total_requests, metrics.hit_count + metrics.miss_count);
    }
}
