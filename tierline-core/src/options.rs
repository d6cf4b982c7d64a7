//! Per-read cache options.

use std::time::Duration;

use crate::config::TierlineConfig;

/// Default freshness window for cached entries.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Options controlling a single `read_through` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    /// Entries younger than this are served without a fetch.
    pub ttl: Duration,
    /// Skip both read tiers and always fetch.
    pub force_refresh: bool,
    /// When offline, serve whatever is cached (even expired) instead of failing.
    pub critical_data: bool,
    /// Whether the durable tier participates for this key.
    pub persist_to_storage: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            force_refresh: false,
            critical_data: false,
            persist_to_storage: true,
        }
    }
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options seeded from the configured default TTL.
    pub fn from_config(config: &TierlineConfig) -> Self {
        Self {
            ttl: config.default_ttl,
            ..Self::default()
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }

    pub fn with_critical_data(mut self, critical_data: bool) -> Self {
        self.critical_data = critical_data;
        self
    }

    pub fn with_persist_to_storage(mut self, persist_to_storage: bool) -> Self {
        self.persist_to_storage = persist_to_storage;
        self
    }

    /// Whether the read tiers are consulted before fetching.
    pub fn reads_fast_tier(&self) -> bool {
        !self.force_refresh
    }

    pub fn reads_durable_tier(&self) -> bool {
        !self.force_refresh && self.persist_to_storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = CacheOptions::default();
        assert_eq!(options.ttl, Duration::from_secs(300));
        assert!(!options.force_refresh);
        assert!(!options.critical_data);
        assert!(options.persist_to_storage);
        assert!(options.reads_fast_tier());
        assert!(options.reads_durable_tier());
    }

    #[test]
    fn test_builder() {
        let options = CacheOptions::new()
            .with_ttl(Duration::from_secs(30))
            .with_force_refresh(true)
            .with_critical_data(true)
            .with_persist_to_storage(false);

        assert_eq!(options.ttl, Duration::from_secs(30));
        assert!(options.force_refresh);
        assert!(options.critical_data);
        assert!(!options.persist_to_storage);
        assert!(!options.reads_fast_tier());
        assert!(!options.reads_durable_tier());
    }

    #[test]
    fn test_memory_only_still_reads_fast_tier() {
        let options = CacheOptions::new().with_persist_to_storage(false);
        assert!(options.reads_fast_tier());
        assert!(!options.reads_durable_tier());
    }

    #[test]
    fn test_from_config_uses_default_ttl() {
        let config = TierlineConfig {
            default_ttl: Duration::from_secs(42),
            ..TierlineConfig::default()
        };
        assert_eq!(CacheOptions::from_config(&config).ttl, Duration::from_secs(42));
    }
}
