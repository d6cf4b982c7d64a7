//! Durable cache tier adapter.
//!
//! Serializes entries to a [`DurableMedium`] as JSON
//! `{"data": <T>, "storedAt": <epoch-ms>}` under namespaced keys, and bounds
//! the number of entries with an approximate-LRU sweep.
//!
//! # Failure Model
//!
//! Reads fail soft: a medium error or a corrupt payload is logged and
//! reported as absent. Writes and removals return their error so the caller
//! can decide; the orchestrator logs and carries on.
//!
//! # Eviction
//!
//! [`DurableStore::enforce_size_limit`] only scans the medium on a sampled
//! fraction of calls (default 1 in 10). A scan reads every namespaced
//! entry's `storedAt`, sorts ascending and, if the count exceeds the cap,
//! removes the oldest `eviction_fraction` of entries in one batch. The write
//! path stays O(1); the cap is enforced lazily and in batches.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tierline_core::{CacheEntry, CacheKey, KeyPattern, StoreError, TierlineConfig};
use tracing::{debug, info, warn};

use super::traits::DurableMedium;

/// On-medium shape of an entry, borrowed for writing.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PersistedEntryRef<'a, T> {
    data: &'a T,
    stored_at: i64,
}

/// On-medium shape of an entry, owned for reading.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedEntry<T> {
    data: T,
    stored_at: i64,
}

/// Only the timestamp, for eviction scans that do not need the payload.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedStamp {
    stored_at: Option<i64>,
}

/// Outcome of a size-limit enforcement call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EvictionReport {
    /// Whether the sampler admitted this call and a scan happened.
    pub sampled: bool,
    /// Namespaced entries found by the scan.
    pub scanned: usize,
    /// Entries removed.
    pub removed: u64,
}

impl EvictionReport {
    fn skipped() -> Self {
        Self::default()
    }
}

/// Durable tier over any [`DurableMedium`].
pub struct DurableStore<M: DurableMedium> {
    medium: Arc<M>,
    namespace: String,
    eviction_probability: f64,
    eviction_fraction: f64,
}

impl<M: DurableMedium> DurableStore<M> {
    /// Create a store with default eviction tuning (1-in-10 sampling, 20% batch).
    pub fn new(medium: Arc<M>, namespace: impl Into<String>) -> Self {
        let defaults = TierlineConfig::default();
        Self {
            medium,
            namespace: namespace.into(),
            eviction_probability: defaults.eviction_probability,
            eviction_fraction: defaults.eviction_fraction,
        }
    }

    /// Create a store using the namespace and eviction tuning of `config`.
    pub fn from_config(medium: Arc<M>, config: &TierlineConfig) -> Self {
        Self {
            medium,
            namespace: config.namespace.clone(),
            eviction_probability: config.eviction_probability,
            eviction_fraction: config.eviction_fraction,
        }
    }

    /// Override the eviction sampling rate and batch fraction.
    pub fn with_eviction(mut self, probability: f64, fraction: f64) -> Self {
        self.eviction_probability = probability;
        self.eviction_fraction = fraction;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The underlying medium.
    pub fn medium(&self) -> &M {
        &self.medium
    }

    /// Build a key in this store's namespace.
    pub fn key(&self, name: &str) -> CacheKey {
        CacheKey::new(&self.namespace, name)
    }

    /// Read the entry under `key`.
    ///
    /// Fails soft: medium errors and undecodable payloads are logged and
    /// reported as `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<CacheEntry<T>> {
        let raw = match self.medium.get(key.as_str()).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "durable read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str::<PersistedEntry<T>>(&raw) {
            Ok(persisted) => match DateTime::from_timestamp_millis(persisted.stored_at) {
                Some(stored_at) => Some(CacheEntry::new(key.clone(), persisted.data, stored_at)),
                None => {
                    warn!(
                        key = %key,
                        stored_at = persisted.stored_at,
                        "durable entry stamp out of range, treating as miss"
                    );
                    None
                }
            },
            Err(e) => {
                warn!(key = %key, error = %e, "durable entry is corrupt, treating as miss");
                None
            }
        }
    }

    /// Write `data` under `key`, stamped with the current time.
    pub async fn set<T: Serialize>(
        &self,
        key: &CacheKey,
        data: &T,
    ) -> Result<DateTime<Utc>, StoreError> {
        let stored_at = Utc::now();
        let payload = serde_json::to_string(&PersistedEntryRef {
            data,
            stored_at: stored_at.timestamp_millis(),
        })
        .map_err(|e| StoreError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        self.medium.set(key.as_str(), payload).await?;
        Ok(stored_at)
    }

    pub async fn remove_key(&self, key: &CacheKey) -> Result<(), StoreError> {
        self.medium.remove(key.as_str()).await
    }

    /// Every key in the medium that carries this store's namespace.
    pub async fn namespaced_keys(&self) -> Result<Vec<CacheKey>, StoreError> {
        let keys = self.medium.list_all_keys().await?;
        Ok(keys
            .iter()
            .filter_map(|raw| CacheKey::parse(&self.namespace, raw))
            .collect())
    }

    pub async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.namespaced_keys().await?.len())
    }

    /// Remove every namespaced key whose logical name matches `pattern`.
    pub async fn remove_matching(&self, pattern: &KeyPattern) -> Result<u64, StoreError> {
        let doomed: Vec<String> = self
            .namespaced_keys()
            .await?
            .into_iter()
            .filter(|key| pattern.matches_key(key))
            .map(CacheKey::into_string)
            .collect();

        if doomed.is_empty() {
            return Ok(0);
        }
        self.medium.remove_many(&doomed).await
    }

    /// Remove every key carrying this store's namespace. Foreign keys survive.
    pub async fn clear_all_namespaced(&self) -> Result<u64, StoreError> {
        let doomed: Vec<String> = self
            .namespaced_keys()
            .await?
            .into_iter()
            .map(CacheKey::into_string)
            .collect();

        if doomed.is_empty() {
            return Ok(0);
        }
        self.medium.remove_many(&doomed).await
    }

    /// Sampled size-limit enforcement.
    ///
    /// Most calls return immediately; roughly `eviction_probability` of them
    /// run [`enforce_size_limit_now`](Self::enforce_size_limit_now).
    pub async fn enforce_size_limit(&self, max_items: usize) -> EvictionReport {
        if !self.sample() {
            return EvictionReport::skipped();
        }
        self.enforce_size_limit_now(max_items).await
    }

    /// Unsampled size-limit enforcement.
    ///
    /// Never fails: scan or removal errors are logged and reported as zero
    /// removals.
    pub async fn enforce_size_limit_now(&self, max_items: usize) -> EvictionReport {
        let keys = match self.namespaced_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "eviction scan failed");
                return EvictionReport {
                    sampled: true,
                    ..EvictionReport::default()
                };
            }
        };

        let scanned = keys.len();
        if scanned <= max_items {
            debug!(scanned, max_items, "durable tier within size limit");
            return EvictionReport {
                sampled: true,
                scanned,
                removed: 0,
            };
        }

        // Unreadable entries sort as "now" so they are not evicted first.
        let now = Utc::now();
        let mut stamped = Vec::with_capacity(scanned);
        for key in keys {
            let stored_at = self.read_stamp(&key).await.unwrap_or(now);
            stamped.push((stored_at, key));
        }
        stamped.sort_by(|a, b| a.0.cmp(&b.0));

        let batch = eviction_batch(scanned, self.eviction_fraction);
        let victims: Vec<String> = stamped
            .into_iter()
            .take(batch)
            .map(|(_, key)| key.into_string())
            .collect();

        match self.medium.remove_many(&victims).await {
            Ok(removed) => {
                info!(scanned, max_items, removed, "evicted oldest durable entries");
                EvictionReport {
                    sampled: true,
                    scanned,
                    removed,
                }
            }
            Err(e) => {
                warn!(error = %e, "eviction removal failed");
                EvictionReport {
                    sampled: true,
                    scanned,
                    removed: 0,
                }
            }
        }
    }

    async fn read_stamp(&self, key: &CacheKey) -> Option<DateTime<Utc>> {
        let raw = self.medium.get(key.as_str()).await.ok().flatten()?;
        let stamp: PersistedStamp = serde_json::from_str(&raw).ok()?;
        DateTime::from_timestamp_millis(stamp.stored_at?)
    }

    fn sample(&self) -> bool {
        self.eviction_probability >= 1.0 || rand::random::<f64>() < self.eviction_probability
    }
}

/// Number of entries removed by one sweep over `count` entries.
///
/// Rounds up so a store one entry over its cap still loses at least one.
fn eviction_batch(count: usize, fraction: f64) -> usize {
    ((count as f64) * fraction).ceil().min(count as f64) as usize
}
