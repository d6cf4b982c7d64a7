//! Cache performance metrics snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal outcome of a cache operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Served from a cache tier without a live fetch.
    Hit,
    /// Required a live fetch.
    Miss,
    /// Ended in a failure. Counted as a miss as well.
    Error,
}

impl Outcome {
    pub fn is_hit(self) -> bool {
        matches!(self, Self::Hit)
    }

    pub fn is_error(self) -> bool {
        matches!(self, Self::Error)
    }
}

/// Point-in-time copy of the cache counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachePerformanceMetrics {
    pub hit_count: u64,
    pub miss_count: u64,
    pub error_count: u64,
    pub total_requests: u64,
    pub total_response_time_ms: u64,
    pub last_reset_at: DateTime<Utc>,
}

impl CachePerformanceMetrics {
    /// All-zero counters reset at `at`.
    pub fn zeroed(at: DateTime<Utc>) -> Self {
        Self {
            hit_count: 0,
            miss_count: 0,
            error_count: 0,
            total_requests: 0,
            total_response_time_ms: 0,
            last_reset_at: at,
        }
    }

    /// Fraction of requests served from cache (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.hit_count as f64 / self.total_requests as f64
        }
    }

    /// Fraction of requests that ended in an error (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.error_count as f64 / self.total_requests as f64
        }
    }

    pub fn average_response_time_ms(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.total_response_time_ms as f64 / self.total_requests as f64
        }
    }
}

impl Default for CachePerformanceMetrics {
    fn default() -> Self {
        Self::zeroed(Utc::now())
    }
}
