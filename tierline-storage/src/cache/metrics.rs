//! Cache performance counters.
//!
//! Every counter is an atomic so recording from many tasks at once never
//! blocks and never fails. A snapshot reads each counter independently; it
//! is consistent per field, not across fields.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tierline_core::{CachePerformanceMetrics, Outcome};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

/// Shortest period accepted by [`MetricsCollector::spawn_periodic_reset`].
pub const MIN_RESET_PERIOD: Duration = Duration::from_millis(1);

/// Shared, injectable metrics sink for one cache instance.
#[derive(Debug)]
pub struct MetricsCollector {
    hit_count: AtomicU64,
    miss_count: AtomicU64,
    error_count: AtomicU64,
    total_requests: AtomicU64,
    total_response_time_ms: AtomicU64,
    /// Epoch milliseconds of the last reset.
    last_reset_at_ms: AtomicI64,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            total_requests: AtomicU64::new(0),
            total_response_time_ms: AtomicU64::new(0),
            last_reset_at_ms: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }

    /// Seed a collector from a previously persisted snapshot.
    pub fn from_snapshot(snapshot: &CachePerformanceMetrics) -> Self {
        let collector = Self::new();
        collector.restore(snapshot);
        collector
    }

    /// Record one terminal outcome.
    ///
    /// `Error` counts as a miss too.
    pub fn record_outcome(&self, outcome: Outcome, response_time: Duration) {
        let elapsed_ms = u64::try_from(response_time.as_millis()).unwrap_or(u64::MAX);

        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_ms
            .fetch_add(elapsed_ms, Ordering::Relaxed);

        match outcome {
            Outcome::Hit => {
                self.hit_count.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Miss => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Error => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                self.error_count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Copy the current counters.
    pub fn snapshot(&self) -> CachePerformanceMetrics {
        CachePerformanceMetrics {
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_response_time_ms: self.total_response_time_ms.load(Ordering::Relaxed),
            last_reset_at: self.last_reset_at(),
        }
    }

    /// Zero every counter and stamp the reset time.
    pub fn reset(&self) {
        let before = self.snapshot();
        self.hit_count.store(0, Ordering::Relaxed);
        self.miss_count.store(0, Ordering::Relaxed);
        self.error_count.store(0, Ordering::Relaxed);
        self.total_requests.store(0, Ordering::Relaxed);
        self.total_response_time_ms.store(0, Ordering::Relaxed);
        self.last_reset_at_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);

        info!(
            hit_count = before.hit_count,
            miss_count = before.miss_count,
            error_count = before.error_count,
            total_requests = before.total_requests,
            "cache metrics reset"
        );
    }

    /// Overwrite the counters with a snapshot.
    pub fn restore(&self, snapshot: &CachePerformanceMetrics) {
        self.hit_count.store(snapshot.hit_count, Ordering::Relaxed);
        self.miss_count.store(snapshot.miss_count, Ordering::Relaxed);
        self.error_count.store(snapshot.error_count, Ordering::Relaxed);
        self.total_requests
            .store(snapshot.total_requests, Ordering::Relaxed);
        self.total_response_time_ms
            .store(snapshot.total_response_time_ms, Ordering::Relaxed);
        self.last_reset_at_ms
            .store(snapshot.last_reset_at.timestamp_millis(), Ordering::Relaxed);
    }

    pub fn last_reset_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_reset_at_ms.load(Ordering::Relaxed))
            .unwrap_or_else(Utc::now)
    }

    /// Reset the counters every `period` until the returned task is aborted.
    ///
    /// The first reset happens one full period after the call. Periods below
    /// [`MIN_RESET_PERIOD`] are raised to it.
    pub fn spawn_periodic_reset(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        let period = if period < MIN_RESET_PERIOD {
            warn!(requested_ms = period.as_millis() as u64, "reset period too short, clamping");
            MIN_RESET_PERIOD
        } else {
            period
        };

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;

            info!(period_secs = period.as_secs(), "periodic metrics reset started");
            loop {
                ticker.tick().await;
                self.reset();
            }
        })
    }
}
