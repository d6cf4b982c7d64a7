//! LMDB-backed durable medium.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a memory-mapped,
//! crash-safe key-value store that survives process restarts.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The medium uses:
//! - Read transactions for `get` and `list_all_keys`
//! - Write transactions for `set`, `remove` and `remove_many`
//!
//! `remove_many` deletes the whole batch in a single write transaction, so
//! an eviction sweep is applied atomically.

use std::path::Path;

use async_trait::async_trait;
use heed::types::Str;
use heed::{Database, Env, EnvOpenOptions};
use tierline_core::StoreError;

use super::traits::DurableMedium;

/// Error type for LMDB medium operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbMediumError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Opening failures surface as a medium error during `open`.
impl From<LmdbMediumError> for StoreError {
    fn from(e: LmdbMediumError) -> Self {
        StoreError::medium("open", e)
    }
}

fn txn_error(e: heed::Error) -> LmdbMediumError {
    LmdbMediumError::Transaction(e.to_string())
}

/// Map a heed failure to a `StoreError` naming the medium operation.
fn op_error(operation: &'static str) -> impl Fn(heed::Error) -> StoreError {
    move |e| StoreError::medium(operation, e)
}

/// LMDB-backed [`DurableMedium`] with string keys and values.
///
/// # Example
///
/// ```ignore
/// use tierline_storage::cache::{DurableStore, LmdbMedium};
///
/// let medium = Arc::new(LmdbMedium::new("/var/lib/app/cache", 64)?);
/// let durable = DurableStore::new(medium, "tierline:");
/// ```
pub struct LmdbMedium {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Str, Str>,
}

impl LmdbMedium {
    /// Open (or create) an LMDB medium.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Database cannot be created
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbMediumError> {
        // Ensure directory exists
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per path by this process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbMediumError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_error)?;

        let db: Database<Str, Str> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbMediumError::DbOpen(e.to_string()))?;

        wtxn.commit().map_err(txn_error)?;

        Ok(Self { env, db })
    }

    /// Number of keys stored, namespaced or not.
    pub fn entry_count(&self) -> Result<u64, LmdbMediumError> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        self.db.len(&rtxn).map_err(txn_error)
    }
}

#[async_trait]
impl DurableMedium for LmdbMedium {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let rtxn = self.env.read_txn().map_err(op_error("get"))?;
        let value = self
            .db
            .get(&rtxn, key)
            .map_err(op_error("get"))?
            .map(str::to_string);
        Ok(value)
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(op_error("set"))?;
        self.db.put(&mut wtxn, key, value.as_str()).map_err(op_error("set"))?;
        wtxn.commit().map_err(op_error("set"))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(op_error("remove"))?;
        self.db.delete(&mut wtxn, key).map_err(op_error("remove"))?;
        wtxn.commit().map_err(op_error("remove"))?;
        Ok(())
    }

    async fn list_all_keys(&self) -> Result<Vec<String>, StoreError> {
        let rtxn = self.env.read_txn().map_err(op_error("list_all_keys"))?;
        let iter = self.db.iter(&rtxn).map_err(op_error("list_all_keys"))?;

        let mut keys = Vec::new();
        for result in iter {
            match result {
                Ok((key, _)) => keys.push(key.to_string()),
                Err(_) => continue,
            }
        }
        Ok(keys)
    }

    async fn remove_many(&self, keys: &[String]) -> Result<u64, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(op_error("remove_many"))?;

        let mut deleted = 0u64;
        for key in keys {
            if self.db.delete(&mut wtxn, key.as_str()).map_err(op_error("remove_many"))? {
                deleted += 1;
            }
        }

        wtxn.commit().map_err(op_error("remove_many"))?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::durable_store::DurableStore;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tierline_core::KeyPattern;

    fn create_test_medium() -> (LmdbMedium, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let medium = LmdbMedium::new(temp_dir.path(), 10).expect("medium creation should succeed");
        (medium, temp_dir)
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (medium, _temp_dir) = create_test_medium();

        medium
            .set("ns:user:1", "alice".to_string())
            .await
            .expect("set should succeed");

        let value = medium.get("ns:user:1").await.expect("get should succeed");
        assert_eq!(value.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let (medium, _temp_dir) = create_test_medium();
        let value = medium.get("ns:missing").await.expect("get should succeed");
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_overwrite() {
        let (medium, _temp_dir) = create_test_medium();
        medium.set("k", "v1".to_string()).await.expect("set should succeed");
        medium.set("k", "v2".to_string()).await.expect("set should succeed");

        assert_eq!(medium.get("k").await.expect("get").as_deref(), Some("v2"));
        assert_eq!(medium.entry_count().expect("count"), 1);
    }

    #[tokio::test]
    async fn test_remove_and_list() {
        let (medium, _temp_dir) = create_test_medium();
        for key in ["ns:a", "ns:b", "other"] {
            medium.set(key, "x".to_string()).await.expect("set should succeed");
        }

        medium.remove("ns:a").await.expect("remove should succeed");
        let mut keys = medium.list_all_keys().await.expect("list should succeed");
        keys.sort();
        assert_eq!(keys, vec!["ns:b".to_string(), "other".to_string()]);
    }

    #[tokio::test]
    async fn test_remove_many() {
        let (medium, _temp_dir) = create_test_medium();
        for key in ["a", "b", "c"] {
            medium.set(key, "x".to_string()).await.expect("set should succeed");
        }

        let removed = medium
            .remove_many(&["a".to_string(), "c".to_string(), "zzz".to_string()])
            .await
            .expect("remove_many should succeed");
        assert_eq!(removed, 2);
        assert_eq!(medium.entry_count().expect("count"), 1);
    }

    #[tokio::test]
    async fn test_errors_name_the_failing_operation() {
        let (medium, _temp_dir) = create_test_medium();
        // LMDB caps keys at 511 bytes.
        let oversized = "k".repeat(600);

        let err = medium
            .set(&oversized, "x".to_string())
            .await
            .expect_err("oversized key should be rejected");
        assert!(matches!(&err, StoreError::Medium { operation, .. } if operation == "set"));
        assert!(err.to_string().contains("during set"));

        let err = StoreError::from(LmdbMediumError::EnvOpen("no such dir".to_string()));
        assert!(matches!(&err, StoreError::Medium { operation, .. } if operation == "open"));
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        {
            let medium = LmdbMedium::new(temp_dir.path(), 10).expect("open");
            medium.set("ns:k", "persisted".to_string()).await.expect("set");
        }
        let medium = LmdbMedium::new(temp_dir.path(), 10).expect("reopen");
        assert_eq!(medium.get("ns:k").await.expect("get").as_deref(), Some("persisted"));
    }

    #[tokio::test]
    async fn test_durable_store_over_lmdb() {
        let (medium, _temp_dir) = create_test_medium();
        let store = DurableStore::new(Arc::new(medium), "ns:");

        for name in ["user:1", "user:2", "order:1"] {
            store
                .set(&store.key(name), &name.to_string())
                .await
                .expect("set should succeed");
        }

        let entry = store
            .get::<String>(&store.key("order:1"))
            .await
            .expect("entry present");
        assert_eq!(entry.data, "order:1");

        let removed = store
            .remove_matching(&KeyPattern::new("user:*"))
            .await
            .expect("remove_matching should succeed");
        assert_eq!(removed, 2);
        assert_eq!(store.count().await.expect("count"), 1);
    }
}
