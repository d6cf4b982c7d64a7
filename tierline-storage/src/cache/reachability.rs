//! Network reachability with a bounded time budget.
//!
//! A platform probe can hang. [`NetworkMonitor`] races it against a timeout
//! and answers "reachable" when the budget runs out, so an indecisive check
//! never blocks a read; the fetch that follows will fail fast instead.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tierline_core::TierlineConfig;
use tracing::debug;

use super::traits::ReachabilityProbe;

/// Default probe budget.
pub const DEFAULT_REACHABILITY_TIMEOUT: Duration = Duration::from_secs(3);

/// Bounded-latency wrapper around a [`ReachabilityProbe`].
pub struct NetworkMonitor<P: ReachabilityProbe> {
    probe: Arc<P>,
    timeout: Duration,
}

impl<P: ReachabilityProbe> NetworkMonitor<P> {
    pub fn new(probe: Arc<P>) -> Self {
        Self {
            probe,
            timeout: DEFAULT_REACHABILITY_TIMEOUT,
        }
    }

    pub fn from_config(probe: Arc<P>, config: &TierlineConfig) -> Self {
        Self {
            probe,
            timeout: config.reachability_timeout,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Is the network usable right now?
    ///
    /// Resolves within the configured budget. A probe that does not answer in
    /// time counts as reachable.
    pub async fn is_reachable(&self) -> bool {
        match tokio::time::timeout(self.timeout, self.probe.probe()).await {
            Ok(reachable) => reachable,
            Err(_) => {
                debug!(timeout_ms = self.timeout.as_millis() as u64, "reachability probe timed out, assuming online");
                true
            }
        }
    }
}

/// Probe that reports reachable when a TCP connection to `addr` succeeds.
#[derive(Debug, Clone)]
pub struct TcpConnectProbe {
    addr: SocketAddr,
}

impl TcpConnectProbe {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

#[async_trait]
impl ReachabilityProbe for TcpConnectProbe {
    async fn probe(&self) -> bool {
        match tokio::net::TcpStream::connect(self.addr).await {
            Ok(_) => true,
            Err(e) => {
                debug!(addr = %self.addr, error = %e, "reachability connect failed");
                false
            }
        }
    }
}

/// Probe that always answers reachable, for deployments without a
/// meaningful offline state.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReachable;

#[async_trait]
impl ReachabilityProbe for AlwaysReachable {
    async fn probe(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(bool);

    #[async_trait]
    impl ReachabilityProbe for Fixed {
        async fn probe(&self) -> bool {
            self.0
        }
    }

    struct Hangs;

    #[async_trait]
    impl ReachabilityProbe for Hangs {
        async fn probe(&self) -> bool {
            std::future::pending::<()>().await;
            false
        }
    }

    #[tokio::test]
    async fn test_passes_probe_answer_through() {
        assert!(NetworkMonitor::new(Arc::new(Fixed(true))).is_reachable().await);
        assert!(!NetworkMonitor::new(Arc::new(Fixed(false))).is_reachable().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_probe_times_out_optimistically() {
        let monitor = NetworkMonitor::new(Arc::new(Hangs));
        let started = tokio::time::Instant::now();

        assert!(monitor.is_reachable().await);
        let elapsed = started.elapsed();
        assert!(elapsed >= DEFAULT_REACHABILITY_TIMEOUT);
        assert!(elapsed < DEFAULT_REACHABILITY_TIMEOUT + Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_timeout() {
        let config = TierlineConfig {
            reachability_timeout: Duration::from_millis(250),
            ..TierlineConfig::default()
        };
        let monitor = NetworkMonitor::from_config(Arc::new(Hangs), &config);
        let started = tokio::time::Instant::now();
        assert!(monitor.is_reachable().await);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_tcp_probe_against_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind local listener");
        let addr = listener.local_addr().expect("listener addr");

        let probe = TcpConnectProbe::new(addr);
        assert!(probe.probe().await);

        drop(listener);
        assert!(!probe.probe().await);
    }

    #[tokio::test]
    async fn test_always_reachable() {
        assert!(NetworkMonitor::new(Arc::new(AlwaysReachable)).is_reachable().await);
    }
}
