//! Two-tier read-through cache with offline fallback.
//!
//! This module implements the core caching logic: route a read through the
//! fast tier, then the durable tier, then the network, and write fetched
//! values back into both tiers.
//!
//! # Read Path
//!
//! 1. Fast tier, if the entry is younger than the TTL.
//! 2. Durable tier, same test. A hit is promoted into the fast tier with its
//!    original `stored_at`.
//! 3. Reachability check. Offline reads of critical data are served from
//!    whatever is cached, fresh or not, with a [`StaleDataWarning`].
//!    Otherwise an offline read fails with `NetworkUnavailable` and the fetch
//!    is never called.
//! 4. Fetch with retry and exponential backoff.
//! 5. Write-back to both tiers, then schedule size enforcement.
//!
//! Concurrent misses on one key each fetch; there is no request coalescing.
//!
//! [`StaleDataWarning`]: tierline_core::StaleDataWarning

use std::future::Future;
use std::sync::Arc;

use tierline_core::{
    CachePerformanceMetrics, CacheEntry, CacheKey, CacheOptions, EvictionMode, KeyPattern, Outcome,
    ReadThroughError, RemoteResponse, StoreError, TierlineConfig, TierlineResult, TransportError,
};
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::durable_store::{DurableStore, EvictionReport};
use super::fast_store::FastStore;
use super::freshness::{CacheRead, ReadSource};
use super::metrics::MetricsCollector;
use super::reachability::NetworkMonitor;
use super::traits::{Cacheable, DurableMedium, ReachabilityProbe};

/// Read-through cache over a fast in-process tier and a durable tier.
///
/// # Type Parameters
///
/// - `M`: The durable medium backing the second tier
/// - `P`: The reachability probe consulted before fetching
///
/// # Example
///
/// ```ignore
/// let cache = ReadThroughCache::with_defaults(
///     Arc::new(LmdbMedium::new("/var/lib/app/cache", 64)?),
///     Arc::new(TcpConnectProbe::new("10.0.0.1:443".parse()?)),
/// );
///
/// let profile = cache
///     .read_through(
///         "user:42",
///         || async { api.profile(42).await },
///         &CacheOptions::new().with_critical_data(true),
///     )
///     .await?;
/// ```
pub struct ReadThroughCache<M, P>
where
    M: DurableMedium + 'static,
    P: ReachabilityProbe,
{
    /// In-process tier.
    fast: Arc<FastStore>,
    /// Durable tier.
    durable: Arc<DurableStore<M>>,
    /// Bounded reachability check.
    network: Arc<NetworkMonitor<P>>,
    /// Shared counters.
    metrics: Arc<MetricsCollector>,
    config: TierlineConfig,
}

impl<M, P> ReadThroughCache<M, P>
where
    M: DurableMedium + 'static,
    P: ReachabilityProbe,
{
    /// Create a cache over `medium`, consulting `probe` before each fetch.
    ///
    /// # Errors
    ///
    /// Returns `TierlineError::Config` if `config` fails
    /// [`TierlineConfig::validate`]. An empty namespace would otherwise let
    /// `clear_all` and eviction claim every key in a shared medium.
    pub fn new(
        medium: Arc<M>,
        probe: Arc<P>,
        metrics: Arc<MetricsCollector>,
        config: TierlineConfig,
    ) -> TierlineResult<Self> {
        config.validate()?;
        Ok(Self::assemble(medium, probe, metrics, config))
    }

    /// Create a cache with default configuration and its own collector.
    pub fn with_defaults(medium: Arc<M>, probe: Arc<P>) -> Self {
        Self::assemble(
            medium,
            probe,
            Arc::new(MetricsCollector::new()),
            TierlineConfig::default(),
        )
    }

    fn assemble(
        medium: Arc<M>,
        probe: Arc<P>,
        metrics: Arc<MetricsCollector>,
        config: TierlineConfig,
    ) -> Self {
        Self {
            fast: Arc::new(FastStore::new()),
            durable: Arc::new(DurableStore::from_config(medium, &config)),
            network: Arc::new(NetworkMonitor::from_config(probe, &config)),
            metrics,
            config,
        }
    }

    /// Assemble a cache from already-built parts.
    ///
    /// The parts are taken as given; `config` is not validated and the
    /// durable store keeps whatever namespace it was built with.
    pub fn from_parts(
        fast: Arc<FastStore>,
        durable: Arc<DurableStore<M>>,
        network: Arc<NetworkMonitor<P>>,
        metrics: Arc<MetricsCollector>,
        config: TierlineConfig,
    ) -> Self {
        Self {
            fast,
            durable,
            network,
            metrics,
            config,
        }
    }

    pub fn config(&self) -> &TierlineConfig {
        &self.config
    }

    pub fn fast_store(&self) -> &FastStore {
        &self.fast
    }

    pub fn durable_store(&self) -> &DurableStore<M> {
        &self.durable
    }

    pub fn network(&self) -> &NetworkMonitor<P> {
        &self.network
    }

    pub fn metrics_collector(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Key for a logical name in this cache's namespace.
    pub fn key(&self, name: &str) -> CacheKey {
        self.durable.key(name)
    }

    /// Read `name` through the cache, calling `fetch` only when no tier can
    /// answer.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(read))` with the value and where it came from
    /// - `Ok(None)` when the remote answered with neither data nor error
    /// - `Err(_)` when offline with nothing cached, when every fetch attempt
    ///   failed, or when the remote reported an application error
    pub async fn read_through<T, F, Fut>(
        &self,
        name: &str,
        mut fetch: F,
        options: &CacheOptions,
    ) -> Result<Option<CacheRead<T>>, ReadThroughError>
    where
        T: Cacheable,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<RemoteResponse<T>, TransportError>> + Send,
    {
        let started = Instant::now();
        let key = self.key(name);

        if options.reads_fast_tier() {
            if let Some(entry) = self.fast.get::<T>(&key) {
                if entry.is_fresh(options.ttl) {
                    debug!(key = %key, "fast tier hit");
                    self.record(Outcome::Hit, started);
                    return Ok(Some(CacheRead::from_cache(entry, ReadSource::FastStore)));
                }
            }
        }

        if options.reads_durable_tier() {
            if let Some(entry) = self.durable.get::<T>(&key).await {
                if entry.is_fresh(options.ttl) {
                    debug!(key = %key, "durable tier hit, promoting");
                    self.fast.promote(&entry);
                    self.record(Outcome::Hit, started);
                    return Ok(Some(CacheRead::from_cache(entry, ReadSource::DurableStore)));
                }
            }
        }

        debug!(key = %key, "cache miss");

        if !self.network.is_reachable().await {
            if options.critical_data {
                if let Some(entry) = self.stale_entry::<T>(&key, options).await {
                    let read = CacheRead::stale(entry);
                    if let Some(warning) = read.warning() {
                        warn!(key = %key, age_secs = warning.age.as_secs(), "network unavailable, serving stale data");
                    }
                    self.record(Outcome::Hit, started);
                    return Ok(Some(read));
                }
            }
            warn!(key = %key, "network unavailable and nothing cached");
            self.record(Outcome::Error, started);
            return Err(ReadThroughError::NetworkUnavailable {
                key: name.to_string(),
            });
        }

        let response = match self.fetch_with_retry(name, &mut fetch).await {
            Ok(response) => response,
            Err(e) => {
                self.record(Outcome::Error, started);
                return Err(e);
            }
        };

        match response {
            RemoteResponse {
                error: Some(error), ..
            } => {
                warn!(key = %key, error = %error, "remote reported an error");
                self.record(Outcome::Error, started);
                Err(ReadThroughError::Application {
                    key: name.to_string(),
                    error,
                })
            }
            RemoteResponse {
                data: Some(data),
                error: None,
            } => {
                let stored_at = self.fast.set(&key, data.clone());
                if options.persist_to_storage {
                    self.write_durable(&key, &data).await;
                }
                self.record(Outcome::Miss, started);
                Ok(Some(CacheRead::from_remote(data, stored_at)))
            }
            RemoteResponse {
                data: None,
                error: None,
            } => {
                debug!(key = %key, "remote returned no data");
                self.record(Outcome::Miss, started);
                Ok(None)
            }
        }
    }

    /// Any cached entry for `key`, regardless of age.
    async fn stale_entry<T: Cacheable>(
        &self,
        key: &CacheKey,
        options: &CacheOptions,
    ) -> Option<CacheEntry<T>> {
        if let Some(entry) = self.fast.get::<T>(key) {
            return Some(entry);
        }
        if options.persist_to_storage {
            return self.durable.get::<T>(key).await;
        }
        None
    }

    /// Call `fetch` until it stops failing at the transport level or the
    /// retry policy is exhausted.
    async fn fetch_with_retry<T, F, Fut>(
        &self,
        name: &str,
        fetch: &mut F,
    ) -> Result<RemoteResponse<T>, ReadThroughError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<RemoteResponse<T>, TransportError>> + Send,
    {
        let policy = &self.config.retry;
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match fetch().await {
                Ok(response) => return Ok(response),
                Err(e) if attempt >= max_attempts => {
                    warn!(key = name, attempts = attempt, error = %e, "fetch failed, giving up");
                    return Err(ReadThroughError::Transport {
                        key: name.to_string(),
                        attempts: attempt,
                        last_error: e,
                    });
                }
                Err(e) => {
                    let delay = policy.backoff.delay_after_attempt(attempt);
                    warn!(
                        key = name,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Persist a fetched value and schedule size enforcement.
    ///
    /// Failures are logged only; the fetched value is still returned.
    async fn write_durable<T: Cacheable>(&self, key: &CacheKey, data: &T) {
        if let Err(e) = self.durable.set(key, data).await {
            warn!(key = %key, error = %e, "durable write failed");
            return;
        }

        let max_items = self.config.max_durable_items;
        match (self.config.eviction_mode, Handle::try_current()) {
            (EvictionMode::Background, Ok(handle)) => {
                let durable = Arc::clone(&self.durable);
                handle.spawn(async move {
                    durable.enforce_size_limit(max_items).await;
                });
            }
            _ => {
                self.durable.enforce_size_limit(max_items).await;
            }
        }
    }

    fn record(&self, outcome: Outcome, started: Instant) {
        self.metrics.record_outcome(outcome, started.elapsed());
    }

    /// Remove one logical key from both tiers.
    pub async fn invalidate(&self, name: &str) -> Result<(), StoreError> {
        let key = self.key(name);
        self.fast.remove(&key);
        self.durable.remove_key(&key).await
    }

    /// Remove every key whose logical name matches `pattern` from both tiers.
    ///
    /// Returns the number of durable entries removed.
    pub async fn invalidate_matching(
        &self,
        pattern: impl Into<KeyPattern>,
    ) -> Result<u64, StoreError> {
        let pattern = pattern.into();
        let fast_removed = self.fast.remove_matching(&pattern);
        let removed = self.durable.remove_matching(&pattern).await?;
        debug!(pattern = %pattern, fast_removed, durable_removed = removed, "invalidated by pattern");
        Ok(removed)
    }

    /// Remove every namespaced entry from both tiers. Keys outside the
    /// namespace, including the persisted metrics, survive.
    pub async fn clear_all(&self) -> Result<u64, StoreError> {
        self.fast.clear();
        self.durable.clear_all_namespaced().await
    }

    pub fn metrics(&self) -> CachePerformanceMetrics {
        self.metrics.snapshot()
    }

    /// Zero the counters and drop the persisted snapshot.
    pub async fn reset_metrics(&self) -> Result<(), StoreError> {
        self.metrics.reset();
        self.durable.medium().remove(&self.config.metrics_key).await
    }

    /// Write the current snapshot under the configured metrics key.
    pub async fn persist_metrics(&self) -> Result<(), StoreError> {
        let snapshot = self.metrics.snapshot();
        let payload = serde_json::to_string(&snapshot).map_err(|e| StoreError::Serialization {
            key: self.config.metrics_key.clone(),
            reason: e.to_string(),
        })?;
        self.durable
            .medium()
            .set(&self.config.metrics_key, payload)
            .await
    }

    /// Read the persisted snapshot and seed the collector with it.
    ///
    /// Returns `Ok(None)` when nothing was persisted.
    pub async fn load_persisted_metrics(
        &self,
    ) -> Result<Option<CachePerformanceMetrics>, StoreError> {
        let Some(raw) = self.durable.medium().get(&self.config.metrics_key).await? else {
            return Ok(None);
        };
        let snapshot: CachePerformanceMetrics =
            serde_json::from_str(&raw).map_err(|e| StoreError::Deserialization {
                key: self.config.metrics_key.clone(),
                reason: e.to_string(),
            })?;
        self.metrics.restore(&snapshot);
        Ok(Some(snapshot))
    }

    /// Run a sampled size enforcement against the configured cap.
    pub async fn enforce_size_limit(&self) -> EvictionReport {
        self.durable
            .enforce_size_limit(self.config.max_durable_items)
            .await
    }
}

impl<M, P> Clone for ReadThroughCache<M, P>
where
    M: DurableMedium + 'static,
    P: ReachabilityProbe,
{
    fn clone(&self) -> Self {
        Self {
            fast: Arc::clone(&self.fast),
            durable: Arc::clone(&self.durable),
            network: Arc::clone(&self.network),
            metrics: Arc::clone(&self.metrics),
            config: self.config.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory_medium::InMemoryMedium;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tierline_core::ApplicationError;

    #[derive(Default)]
    struct Switch {
        offline: AtomicBool,
    }

    impl Switch {
        fn go_offline(&self) {
            self.offline.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ReachabilityProbe for Switch {
        async fn probe(&self) -> bool {
            !self.offline.load(Ordering::SeqCst)
        }
    }

    type TestCache = ReadThroughCache<InMemoryMedium, Switch>;

    fn test_config() -> TierlineConfig {
        TierlineConfig {
            namespace: "ns:".to_string(),
            eviction_probability: 1.0,
            eviction_mode: EvictionMode::Inline,
            ..TierlineConfig::default()
        }
    }

    fn build(config: TierlineConfig) -> (TestCache, Arc<Switch>) {
        let probe = Arc::new(Switch::default());
        let cache = ReadThroughCache::new(
            Arc::new(InMemoryMedium::new()),
            Arc::clone(&probe),
            Arc::new(MetricsCollector::new()),
            config,
        )
        .expect("valid config");
        (cache, probe)
    }

    fn counting(
        calls: &Arc<AtomicUsize>,
        value: &'static str,
    ) -> impl FnMut() -> std::future::Ready<Result<RemoteResponse<String>, TransportError>> + Send
    {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(RemoteResponse::ok(value.to_string())))
        }
    }

    fn failing(
        calls: &Arc<AtomicUsize>,
    ) -> impl FnMut() -> std::future::Ready<Result<RemoteResponse<String>, TransportError>> + Send
    {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Err(TransportError::new("connection reset")))
        }
    }

    #[tokio::test]
    async fn test_new_rejects_empty_namespace() {
        let medium = Arc::new(InMemoryMedium::new());
        medium
            .set("other_app:session", "keep".to_string())
            .await
            .expect("seed");

        let result = ReadThroughCache::new(
            Arc::clone(&medium),
            Arc::new(Switch::default()),
            Arc::new(MetricsCollector::new()),
            TierlineConfig {
                namespace: String::new(),
                ..test_config()
            },
        );

        assert!(matches!(
            result,
            Err(tierline_core::TierlineError::Config(
                tierline_core::ConfigError::InvalidValue { ref field, .. }
            )) if field == "namespace"
        ));
        assert!(medium
            .get("other_app:session")
            .await
            .expect("medium read")
            .is_some());
    }

    #[tokio::test]
    async fn test_cold_miss_fetches_and_writes_both_tiers() {
        let (cache, _) = build(test_config());
        let calls = Arc::new(AtomicUsize::new(0));

        let read = cache
            .read_through("user:1", counting(&calls, "alice"), &CacheOptions::new())
            .await
            .expect("read should succeed")
            .expect("value present");

        assert_eq!(read.source(), ReadSource::Remote);
        assert_eq!(read.value(), "alice");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.fast_store().contains(&cache.key("user:1")));
        assert!(cache
            .durable_store()
            .get::<String>(&cache.key("user:1"))
            .await
            .is_some());

        let metrics = cache.metrics();
        assert_eq!(metrics.miss_count, 1);
        assert_eq!(metrics.total_requests, 1);
    }

    #[tokio::test]
    async fn test_fresh_fast_hit_skips_fetch() {
        let (cache, _) = build(test_config());
        let calls = Arc::new(AtomicUsize::new(0));
        let options = CacheOptions::new();

        cache
            .read_through("k", counting(&calls, "v"), &options)
            .await
            .expect("first read");
        let read = cache
            .read_through("k", counting(&calls, "v"), &options)
            .await
            .expect("second read")
            .expect("value present");

        assert_eq!(read.source(), ReadSource::FastStore);
        assert!(read.served_from_cache());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.metrics().hit_count, 1);
    }

    #[tokio::test]
    async fn test_durable_hit_promotes_with_original_stamp() {
        let (cache, _) = build(test_config());
        let key = cache.key("k");
        let stamp = cache
            .durable_store()
            .set(&key, &"from-disk".to_string())
            .await
            .expect("seed durable");

        let calls = Arc::new(AtomicUsize::new(0));
        let read = cache
            .read_through("k", counting(&calls, "remote"), &CacheOptions::new())
            .await
            .expect("read")
            .expect("value present");

        assert_eq!(read.source(), ReadSource::DurableStore);
        assert_eq!(read.value(), "from-disk");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let promoted = cache.fast_store().get::<String>(&key).expect("promoted");
        assert_eq!(
            promoted.stored_at.timestamp_millis(),
            stamp.timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_force_refresh_always_fetches() {
        let (cache, _) = build(test_config());
        let calls = Arc::new(AtomicUsize::new(0));
        let options = CacheOptions::new().with_force_refresh(true);

        for _ in 0..3 {
            let read = cache
                .read_through("k", counting(&calls, "v"), &options)
                .await
                .expect("read")
                .expect("value");
            assert_eq!(read.source(), ReadSource::Remote);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_persist_skips_durable_tier() {
        let (cache, _) = build(test_config());
        let calls = Arc::new(AtomicUsize::new(0));
        let options = CacheOptions::new().with_persist_to_storage(false);

        cache
            .read_through("k", counting(&calls, "v"), &options)
            .await
            .expect("read");

        assert!(cache.fast_store().contains(&cache.key("k")));
        assert!(cache.durable_store().medium().is_empty().await);
    }

    #[tokio::test]
    async fn test_offline_critical_serves_stale() {
        let (cache, probe) = build(test_config());
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .read_through("k", counting(&calls, "cached"), &CacheOptions::new())
            .await
            .expect("warm");
        probe.go_offline();

        let options = CacheOptions::new()
            .with_ttl(Duration::ZERO)
            .with_critical_data(true);
        let read = cache
            .read_through("k", counting(&calls, "remote"), &options)
            .await
            .expect("stale read")
            .expect("value");

        assert_eq!(read.source(), ReadSource::StaleFallback);
        assert_eq!(read.value(), "cached");
        let warning = read.warning().expect("warning attached");
        assert_eq!(warning.key, "k");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.metrics().hit_count, 1);
    }

    #[tokio::test]
    async fn test_offline_critical_falls_back_to_durable() {
        let (cache, probe) = build(test_config());
        cache
            .durable_store()
            .set(&cache.key("k"), &"disk".to_string())
            .await
            .expect("seed");
        probe.go_offline();

        let calls = Arc::new(AtomicUsize::new(0));
        let options = CacheOptions::new()
            .with_ttl(Duration::ZERO)
            .with_critical_data(true);
        let read = cache
            .read_through("k", counting(&calls, "remote"), &options)
            .await
            .expect("stale read")
            .expect("value");

        assert_eq!(read.source(), ReadSource::StaleFallback);
        assert_eq!(read.value(), "disk");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_offline_without_cache_fails_without_fetching() {
        let (cache, probe) = build(test_config());
        probe.go_offline();
        let calls = Arc::new(AtomicUsize::new(0));

        let err = cache
            .read_through(
                "k",
                counting(&calls, "v"),
                &CacheOptions::new().with_critical_data(true),
            )
            .await
            .expect_err("offline read should fail");

        assert!(err.is_offline());
        assert_eq!(err.key(), "k");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let metrics = cache.metrics();
        assert_eq!(metrics.error_count, 1);
        assert_eq!(metrics.miss_count, 1);
    }

    #[tokio::test]
    async fn test_offline_non_critical_ignores_stale_entry() {
        let (cache, probe) = build(test_config());
        let calls = Arc::new(AtomicUsize::new(0));
        cache
            .read_through("k", counting(&calls, "cached"), &CacheOptions::new())
            .await
            .expect("warm");
        probe.go_offline();

        let err = cache
            .read_through(
                "k",
                counting(&calls, "remote"),
                &CacheOptions::new().with_ttl(Duration::ZERO),
            )
            .await
            .expect_err("non-critical offline read should fail");
        assert!(matches!(err, ReadThroughError::NetworkUnavailable { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failures_retry_with_backoff() {
        let (cache, _) = build(test_config());
        let calls = Arc::new(AtomicUsize::new(0));
        let started = Instant::now();

        let err = cache
            .read_through("k", failing(&calls), &CacheOptions::new())
            .await
            .expect_err("all attempts fail");

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            ReadThroughError::Transport {
                attempts,
                last_error,
                ..
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error.message, "connection reset");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3));
        assert!(elapsed < Duration::from_millis(3_100));
        assert_eq!(cache.metrics().error_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_after_transient_failure() {
        let (cache, _) = build(test_config());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let fetch = move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(if attempt == 0 {
                Err(TransportError::new("timeout"))
            } else {
                Ok(RemoteResponse::ok("late".to_string()))
            })
        };

        let read = cache
            .read_through("k", fetch, &CacheOptions::new())
            .await
            .expect("second attempt succeeds")
            .expect("value");
        assert_eq!(read.value(), "late");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_application_error_is_not_retried_or_cached() {
        let (cache, _) = build(test_config());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let fetch = move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok::<_, TransportError>(RemoteResponse::<String>::error(
                ApplicationError::new("not found").with_status(404),
            )))
        };

        let err = cache
            .read_through("k", fetch, &CacheOptions::new())
            .await
            .expect_err("application error surfaces");

        assert!(matches!(err, ReadThroughError::Application { .. }));
        assert!(!err.is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.fast_store().is_empty());
        assert!(cache.durable_store().medium().is_empty().await);
    }

    #[tokio::test]
    async fn test_empty_response_returns_none() {
        let (cache, _) = build(test_config());
        let read = cache
            .read_through(
                "k",
                || std::future::ready(Ok::<_, TransportError>(RemoteResponse::<String>::empty())),
                &CacheOptions::new(),
            )
            .await
            .expect("empty is not an error");

        assert!(read.is_none());
        assert!(cache.fast_store().is_empty());
        assert_eq!(cache.metrics().miss_count, 1);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let (cache, _) = build(test_config());
        let calls = Arc::new(AtomicUsize::new(0));
        for name in ["user:1", "user:2", "order:1"] {
            cache
                .read_through(name, counting(&calls, "v"), &CacheOptions::new())
                .await
                .expect("warm");
        }

        cache.invalidate("order:1").await.expect("invalidate");
        assert!(!cache.fast_store().contains(&cache.key("order:1")));
        assert_eq!(cache.durable_store().count().await.expect("count"), 2);

        assert_eq!(cache.clear_all().await.expect("clear"), 2);
        assert!(cache.fast_store().is_empty());
    }

    #[tokio::test]
    async fn test_metrics_persistence_round_trip() {
        let (cache, _) = build(test_config());
        let calls = Arc::new(AtomicUsize::new(0));
        cache
            .read_through("k", counting(&calls, "v"), &CacheOptions::new())
            .await
            .expect("read");

        cache.persist_metrics().await.expect("persist");
        let raw = cache
            .durable_store()
            .medium()
            .get("tierline_metrics")
            .await
            .expect("medium read");
        assert!(raw.is_some());

        cache.clear_all().await.expect("clear");
        let loaded = cache
            .load_persisted_metrics()
            .await
            .expect("load")
            .expect("snapshot survives clear_all");
        assert_eq!(loaded.miss_count, 1);

        cache.reset_metrics().await.expect("reset");
        assert_eq!(cache.metrics().total_requests, 0);
        assert!(cache.load_persisted_metrics().await.expect("load").is_none());
    }

    #[tokio::test]
    async fn test_write_back_enforces_size_limit_inline() {
        let config = TierlineConfig {
            max_durable_items: 4,
            ..test_config()
        };
        let (cache, _) = build(config);
        let calls = Arc::new(AtomicUsize::new(0));

        for i in 0..10 {
            cache
                .read_through(&format!("k{i}"), counting(&calls, "v"), &CacheOptions::new())
                .await
                .expect("read");
        }

        let count = cache.durable_store().count().await.expect("count");
        assert!(count <= 5, "durable tier holds {count} entries");
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let (cache, _) = build(test_config());
        let other = cache.clone();
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .read_through("k", counting(&calls, "v"), &CacheOptions::new())
            .await
            .expect("read");
        let read = other
            .read_through("k", counting(&calls, "v"), &CacheOptions::new())
            .await
            .expect("read")
            .expect("value");

        assert_eq!(read.source(), ReadSource::FastStore);
        assert_eq!(other.metrics().total_requests, 2);
    }
}
