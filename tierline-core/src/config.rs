//! Configuration types

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ConfigError, TierlineError, TierlineResult};
use crate::options::DEFAULT_TTL;
use crate::retry::RetryPolicy;

/// How size-limit enforcement is scheduled after a durable write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionMode {
    /// Spawned as a separate task; the caller never waits on it.
    #[default]
    Background,
    /// Awaited in the write path before `read_through` returns.
    Inline,
}

/// Master configuration for a cache instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierlineConfig {
    /// Prefix carried by every key the cache manages.
    pub namespace: String,
    /// TTL used by `CacheOptions::from_config`.
    #[serde(with = "duration_ms")]
    pub default_ttl: Duration,
    /// Durable tier entry cap enforced by eviction.
    pub max_durable_items: usize,
    /// Chance that a post-write enforcement actually scans the medium.
    pub eviction_probability: f64,
    /// Share of entries removed when the cap is exceeded.
    pub eviction_fraction: f64,
    pub eviction_mode: EvictionMode,
    /// Budget for a reachability probe before assuming the network is up.
    #[serde(with = "duration_ms")]
    pub reachability_timeout: Duration,
    pub retry: RetryPolicy,
    /// Medium key for the persisted metrics snapshot. Must live outside
    /// `namespace`.
    pub metrics_key: String,
}

impl Default for TierlineConfig {
    fn default() -> Self {
        Self {
            namespace: "tierline:".to_string(),
            default_ttl: DEFAULT_TTL,
            max_durable_items: 500,
            eviction_probability: 0.1,
            eviction_fraction: 0.2,
            eviction_mode: EvictionMode::Background,
            reachability_timeout: Duration::from_secs(3),
            retry: RetryPolicy::default(),
            metrics_key: "tierline_metrics".to_string(),
        }
    }
}

impl TierlineConfig {
    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `TIERLINE_NAMESPACE`: Key namespace prefix (default: `tierline:`)
    /// - `TIERLINE_DEFAULT_TTL_SECS`: Default TTL in seconds (default: 300)
    /// - `TIERLINE_MAX_DURABLE_ITEMS`: Durable tier cap (default: 500)
    /// - `TIERLINE_EVICTION_PROBABILITY`: Sampling rate for eviction (default: 0.1)
    /// - `TIERLINE_REACHABILITY_TIMEOUT_MS`: Probe budget in ms (default: 3000)
    /// - `TIERLINE_RETRY_MAX_ATTEMPTS`: Fetch attempts per read (default: 3)
    ///
    /// The result is validated, so an empty `TIERLINE_NAMESPACE` is rejected.
    pub fn from_env() -> TierlineResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source, then validate.
    pub fn from_lookup<F>(lookup: F) -> TierlineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            namespace: lookup("TIERLINE_NAMESPACE").unwrap_or(defaults.namespace),
            default_ttl: lookup("TIERLINE_DEFAULT_TTL_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.default_ttl),
            max_durable_items: lookup("TIERLINE_MAX_DURABLE_ITEMS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_durable_items),
            eviction_probability: lookup("TIERLINE_EVICTION_PROBABILITY")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.eviction_probability),
            reachability_timeout: lookup("TIERLINE_REACHABILITY_TIMEOUT_MS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.reachability_timeout),
            retry: RetryPolicy {
                max_attempts: lookup("TIERLINE_RETRY_MAX_ATTEMPTS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.retry.max_attempts),
                ..defaults.retry
            },
            ..defaults
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document. Missing fields take their defaults.
    pub fn from_toml_str(source: &str) -> TierlineResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - namespace is non-empty
    /// - max_durable_items > 0
    /// - eviction_probability and eviction_fraction in (0.0, 1.0]
    /// - reachability_timeout is positive
    /// - retry.max_attempts >= 1
    /// - metrics_key does not fall inside the namespace
    pub fn validate(&self) -> TierlineResult<()> {
        if self.namespace.is_empty() {
            return Err(invalid("namespace", &self.namespace, "namespace must not be empty"));
        }

        if self.max_durable_items == 0 {
            return Err(invalid(
                "max_durable_items",
                self.max_durable_items,
                "max_durable_items must be greater than 0",
            ));
        }

        if !(self.eviction_probability > 0.0 && self.eviction_probability <= 1.0) {
            return Err(invalid(
                "eviction_probability",
                self.eviction_probability,
                "eviction_probability must be in (0.0, 1.0]",
            ));
        }

        if !(self.eviction_fraction > 0.0 && self.eviction_fraction <= 1.0) {
            return Err(invalid(
                "eviction_fraction",
                self.eviction_fraction,
                "eviction_fraction must be in (0.0, 1.0]",
            ));
        }

        if self.reachability_timeout.is_zero() {
            return Err(invalid(
                "reachability_timeout",
                format!("{:?}", self.reachability_timeout),
                "reachability_timeout must be positive",
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(invalid(
                "retry.max_attempts",
                self.retry.max_attempts,
                "max_attempts must be at least 1",
            ));
        }

        if self.metrics_key.starts_with(&self.namespace) {
            return Err(invalid(
                "metrics_key",
                &self.metrics_key,
                "metrics_key must not start with the cache namespace",
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> TierlineError {
    TierlineError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    })
}

/// Serde adapter storing a `Duration` as whole milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::BackoffStrategy;

    #[test]
    fn test_default_is_valid() {
        let config = TierlineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_ttl, Duration::from_secs(300));
        assert_eq!(config.reachability_timeout, Duration::from_secs(3));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.eviction_mode, EvictionMode::Background);
    }

    #[test]
    fn test_validate_rejects_empty_namespace() {
        let config = TierlineConfig {
            namespace: String::new(),
            ..TierlineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TierlineError::Config(ConfigError::InvalidValue { field, .. })) if field == "namespace"
        ));
    }

    #[test]
    fn test_validate_rejects_bad_probability() {
        for probability in [0.0, -0.5, 1.5, f64::NAN] {
            let config = TierlineConfig {
                eviction_probability: probability,
                ..TierlineConfig::default()
            };
            assert!(config.validate().is_err(), "accepted {}", probability);
        }
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let config = TierlineConfig {
            retry: RetryPolicy::default().with_max_attempts(0),
            ..TierlineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_metrics_key_in_namespace() {
        let config = TierlineConfig {
            metrics_key: "tierline:metrics".to_string(),
            ..TierlineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_lookup_reads_overrides() {
        let config = TierlineConfig::from_lookup(|name| match name {
            "TIERLINE_NAMESPACE" => Some("svc:".to_string()),
            "TIERLINE_RETRY_MAX_ATTEMPTS" => Some("5".to_string()),
            "TIERLINE_MAX_DURABLE_ITEMS" => Some("not a number".to_string()),
            _ => None,
        })
        .expect("valid overrides");

        assert_eq!(config.namespace, "svc:");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.max_durable_items, 500);
    }

    #[test]
    fn test_from_lookup_rejects_empty_namespace() {
        let result = TierlineConfig::from_lookup(|name| {
            (name == "TIERLINE_NAMESPACE").then(String::new)
        });
        assert!(matches!(
            result,
            Err(TierlineError::Config(ConfigError::InvalidValue { field, .. })) if field == "namespace"
        ));
    }

    #[test]
    fn test_from_lookup_rejects_zero_attempts() {
        let result = TierlineConfig::from_lookup(|name| {
            (name == "TIERLINE_RETRY_MAX_ATTEMPTS").then(|| "0".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = TierlineConfig::from_toml_str(
            r#"
            namespace = "app_cache_"
            default_ttl = 60000
            max_durable_items = 50
            eviction_mode = "inline"

            [retry]
            max_attempts = 5
            backoff = { kind = "fixed", delay_ms = 10 }
            "#,
        )
        .expect("valid toml");

        assert_eq!(config.namespace, "app_cache_");
        assert_eq!(config.default_ttl, Duration::from_secs(60));
        assert_eq!(config.max_durable_items, 50);
        assert_eq!(config.eviction_mode, EvictionMode::Inline);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.backoff, BackoffStrategy::Fixed { delay_ms: 10 });
        // Untouched fields keep their defaults
        assert_eq!(config.reachability_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_from_toml_invalid() {
        let result = TierlineConfig::from_toml_str("max_durable_items = \"many\"");
        assert!(matches!(
            result,
            Err(TierlineError::Config(ConfigError::Parse { .. }))
        ));

        let result = TierlineConfig::from_toml_str("max_durable_items = 0");
        assert!(matches!(
            result,
            Err(TierlineError::Config(ConfigError::InvalidValue { .. }))
        ));
    }
}
