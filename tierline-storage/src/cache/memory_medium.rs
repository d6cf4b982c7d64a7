//! Process-local durable medium.
//!
//! Useful for tests and for embedders that want the two-tier behaviour
//! without a disk. Contents do not survive the process.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tierline_core::StoreError;
use tokio::sync::RwLock;

use super::traits::DurableMedium;

/// In-memory [`DurableMedium`] backed by an ordered map.
#[derive(Debug, Default)]
pub struct InMemoryMedium {
    values: RwLock<BTreeMap<String, String>>,
}

impl InMemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys held, namespaced or not.
    pub async fn len(&self) -> usize {
        self.values.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.values.read().await.is_empty()
    }
}

#[async_trait]
impl DurableMedium for InMemoryMedium {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.values.write().await.remove(key);
        Ok(())
    }

    async fn list_all_keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.values.read().await.keys().cloned().collect())
    }

    async fn remove_many(&self, keys: &[String]) -> Result<u64, StoreError> {
        let mut values = self.values.write().await;
        Ok(keys
            .iter()
            .filter(|key| values.remove(key.as_str()).is_some())
            .count() as u64)
    }
}
