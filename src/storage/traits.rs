use crate::storage::errors::{StorageError, StorageResult};
use serde::{de::DeserializeOwned, Serialize};

/// Core operations of the record store the handlers write into.
///
/// Data is raw bytes addressed by `(namespace, key)`. Keys may contain `/`
/// to group related records (for example all votes of one proposal), and
/// `list_keys` with a prefix is how those groups are read back.
pub trait StorageBackend {
    /// Retrieves raw byte data associated with a key within a namespace.
    fn get(&self, namespace: &str, key: &str) -> StorageResult<Vec<u8>>;

    /// Sets raw byte data for a key within a namespace.
    /// Recorded for rollback when a transaction is active.
    fn set(&mut self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()>;

    /// Check if a key exists in a namespace
    fn contains(&self, namespace: &str, key: &str) -> StorageResult<bool>;

    /// List keys in a namespace, sorted, optionally restricted to a prefix
    fn list_keys(&self, namespace: &str, prefix: Option<&str>) -> StorageResult<Vec<String>>;

    /// Begins a transaction.
    /// Subsequent `set` operations are part of this transaction until commit/rollback.
    fn begin_transaction(&mut self) -> StorageResult<()>;

    /// Commits the current transaction, making changes permanent.
    fn commit_transaction(&mut self) -> StorageResult<()>;

    /// Rolls back the current transaction, discarding changes.
    fn rollback_transaction(&mut self) -> StorageResult<()>;
}

/// JSON helpers available on every backend.
pub trait StorageExtensions: StorageBackend {
    fn get_json<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> StorageResult<T>;

    /// Like `get_json`, but a missing key is `Ok(None)` rather than `NotFound`.
    fn get_json_opt<T: DeserializeOwned>(
        &self,
        namespace: &str,
        key: &str,
    ) -> StorageResult<Option<T>>;

    fn set_json<T: Serialize>(&mut self, namespace: &str, key: &str, value: &T)
        -> StorageResult<()>;
}

impl<S: StorageBackend + ?Sized> StorageExtensions for S {
    fn get_json<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> StorageResult<T> {
        let bytes = self.get(namespace, key)?;
        serde_json::from_slice(&bytes).map_err(|e| StorageError::SerializationError {
            details: format!("{}/{}: {}", namespace, key, e),
        })
    }

    fn get_json_opt<T: DeserializeOwned>(
        &self,
        namespace: &str,
        key: &str,
    ) -> StorageResult<Option<T>> {
        match self.get_json(namespace, key) {
            Ok(value) => Ok(Some(value)),
            Err(StorageError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn set_json<T: Serialize>(
        &mut self,
        namespace: &str,
        key: &str,
        value: &T,
    ) -> StorageResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.set(namespace, key, bytes)
    }
}

/// Supertrait combining StorageBackend and StorageExtensions.
pub trait Storage: StorageBackend + StorageExtensions {}

/// Blanket implementation for the Storage supertrait.
impl<T: StorageBackend + StorageExtensions> Storage for T {}
