use crate::storage::errors::{StorageError, StorageResult};
use crate::storage::traits::StorageBackend;
use std::collections::{BTreeMap, HashMap};

/// An in-memory implementation of the `StorageBackend` trait.
/// Suitable for testing and one-shot replays.
#[derive(Default, Debug, Clone)]
pub struct InMemoryStorage {
    // Namespace -> Key -> Value. BTreeMap keeps list_keys ordered.
    data: HashMap<String, BTreeMap<String, Vec<u8>>>,
    // Transaction support: Stack of operations to rollback
    // Each operation is (namespace, key, Option<old_value>)
    // None means the key didn't exist before the transaction started.
    transaction_stack: Vec<Vec<(String, String, Option<Vec<u8>>)>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    // Helper to create a combined key for error messages
    fn make_internal_key(namespace: &str, key: &str) -> String {
        format!("{}:{}", namespace, key)
    }

    // Records an operation for potential rollback if a transaction is active
    fn record_for_rollback(&mut self, namespace: &str, key: &str, old_value: Option<Vec<u8>>) {
        if let Some(current_transaction) = self.transaction_stack.last_mut() {
            current_transaction.push((namespace.to_string(), key.to_string(), old_value));
        }
    }

    /// Number of keys stored across all namespaces.
    pub fn len(&self) -> usize {
        self.data.values().map(|ns| ns.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StorageBackend for InMemoryStorage {
    fn get(&self, namespace: &str, key: &str) -> StorageResult<Vec<u8>> {
        self.data
            .get(namespace)
            .and_then(|ns_data| ns_data.get(key))
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                key: Self::make_internal_key(namespace, key),
            })
    }

    fn set(&mut self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey {
                key: Self::make_internal_key(namespace, key),
                details: "key must not be empty".to_string(),
            });
        }

        // Record for potential rollback *before* making changes
        let existing_value = self.data.get(namespace).and_then(|ns| ns.get(key)).cloned();
        self.record_for_rollback(namespace, key, existing_value);

        let ns_data = self.data.entry(namespace.to_string()).or_default();
        ns_data.insert(key.to_string(), value);
        Ok(())
    }

    fn contains(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        Ok(self
            .data
            .get(namespace)
            .map_or(false, |ns_data| ns_data.contains_key(key)))
    }

    fn list_keys(&self, namespace: &str, prefix: Option<&str>) -> StorageResult<Vec<String>> {
        let keys = match self.data.get(namespace) {
            Some(ns_data) => ns_data
                .keys()
                .filter(|k| prefix.map_or(true, |p| k.starts_with(p)))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        Ok(keys)
    }

    fn begin_transaction(&mut self) -> StorageResult<()> {
        self.transaction_stack.push(Vec::new());
        Ok(())
    }

    fn commit_transaction(&mut self) -> StorageResult<()> {
        match self.transaction_stack.pop() {
            Some(ops) => {
                // A nested commit folds its rollback log into the parent
                if let Some(parent) = self.transaction_stack.last_mut() {
                    parent.extend(ops);
                }
                Ok(())
            }
            None => Err(StorageError::TransactionError {
                details: "No active transaction to commit".to_string(),
            }),
        }
    }

    fn rollback_transaction(&mut self) -> StorageResult<()> {
        match self.transaction_stack.pop() {
            Some(ops) => {
                // Apply rollbacks in reverse order
                for (namespace, key, old_value_opt) in ops.into_iter().rev() {
                    let ns_data = self.data.entry(namespace).or_default();
                    match old_value_opt {
                        Some(old_value) => {
                            ns_data.insert(key, old_value);
                        }
                        None => {
                            ns_data.remove(&key);
                        }
                    }
                }
                Ok(())
            }
            None => Err(StorageError::TransactionError {
                details: "No active transaction to rollback".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::traits::StorageExtensions;

    #[test]
    fn test_basic_set_get() {
        let mut storage = InMemoryStorage::new();
        storage.set("ns", "key1", vec![1, 2, 3]).unwrap();
        assert_eq!(storage.get("ns", "key1").unwrap(), vec![1, 2, 3]);
        assert!(storage.contains("ns", "key1").unwrap());
        assert!(!storage.contains("ns", "missing").unwrap());
        assert!(matches!(
            storage.get("ns", "missing"),
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn test_list_keys_with_prefix() {
        let mut storage = InMemoryStorage::new();
        storage.set("votes", "0xa1/b", vec![]).unwrap();
        storage.set("votes", "0xa1/a", vec![]).unwrap();
        storage.set("votes", "0xa2/a", vec![]).unwrap();

        let keys = storage.list_keys("votes", Some("0xa1/")).unwrap();
        assert_eq!(keys, vec!["0xa1/a".to_string(), "0xa1/b".to_string()]);
        assert_eq!(storage.list_keys("votes", None).unwrap().len(), 3);
        assert!(storage.list_keys("other", None).unwrap().is_empty());
    }

    #[test]
    fn test_transaction_commit() {
        let mut storage = InMemoryStorage::new();
        storage.begin_transaction().unwrap();
        storage.set("tx_ns", "key1", vec![1]).unwrap();
        storage.set("tx_ns", "key2", vec![2]).unwrap();
        storage.commit_transaction().unwrap();

        assert_eq!(storage.get("tx_ns", "key1").unwrap(), vec![1]);
        assert_eq!(storage.get("tx_ns", "key2").unwrap(), vec![2]);
        assert!(storage.commit_transaction().is_err());
    }

    #[test]
    fn test_transaction_rollback() {
        let mut storage = InMemoryStorage::new();
        storage.set("tx_ns", "key1", vec![0]).unwrap();

        storage.begin_transaction().unwrap();
        storage.set("tx_ns", "key1", vec![1]).unwrap(); // Modify existing
        storage.set("tx_ns", "key2", vec![2]).unwrap(); // Add new
        storage.rollback_transaction().unwrap();

        assert_eq!(storage.get("tx_ns", "key1").unwrap(), vec![0]);
        assert!(matches!(
            storage.get("tx_ns", "key2"),
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn test_nested_commit_then_outer_rollback() {
        let mut storage = InMemoryStorage::new();
        storage.begin_transaction().unwrap();
        storage.begin_transaction().unwrap();
        storage.set("ns", "inner", vec![1]).unwrap();
        storage.commit_transaction().unwrap();
        storage.rollback_transaction().unwrap();

        assert!(!storage.contains("ns", "inner").unwrap());
    }

    #[test]
    fn test_json_helpers() {
        let mut storage = InMemoryStorage::new();
        storage.set_json("ns", "n", &42u64).unwrap();
        assert_eq!(storage.get_json::<u64>("ns", "n").unwrap(), 42);
        assert_eq!(storage.get_json_opt::<u64>("ns", "none").unwrap(), None);

        storage.set("ns", "bad", b"not json".to_vec()).unwrap();
        assert!(matches!(
            storage.get_json::<u64>("ns", "bad"),
            Err(StorageError::SerializationError { .. })
        ));
    }
}
