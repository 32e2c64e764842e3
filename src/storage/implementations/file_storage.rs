use crate::storage::errors::{io_to_storage_error, StorageError, StorageResult};
use crate::storage::traits::StorageBackend;
use fs2::FileExt;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{self, create_dir_all, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

const DATA_EXTENSION: &str = "json";
const LOCK_FILE: &str = ".lock";
const JOURNAL_FILE: &str = ".journal";

/// File-based persistent storage.
///
/// Layout under the root directory:
/// - `.lock` - held exclusively for the lifetime of the store
/// - `namespaces/{namespace}/` - one directory per namespace
///   - `{segment}/.../{last}.json` - one file per key, `/` in a key maps to
///     nested directories
///
/// - `.journal` - undo log of the open transaction, if any
///
/// Writes go straight to disk through a temp file and rename. Inside a
/// transaction the previous contents of a key are appended to the journal
/// and synced before the key is overwritten. Commit of the outermost
/// transaction deletes the journal; a journal still present when the store
/// is opened belongs to a transaction that never finished and is undone.
pub struct FileStorage {
    /// Root path for all storage
    root_path: PathBuf,
    /// Active transactions, innermost last
    transactions: Vec<Vec<TransactionOp>>,
    // Keeps the directory lock alive; released on drop
    _lock: File,
}

/// Represents a transaction operation for rollback support
struct TransactionOp {
    namespace: String,
    key: String,
    previous_data: Option<Vec<u8>>,
}

/// One journal line. `previous` is hex, absent when the key did not exist.
#[derive(Serialize, Deserialize)]
struct JournalEntry {
    namespace: String,
    key: String,
    previous: Option<String>,
}

impl FileStorage {
    /// Opens (creating if needed) a store rooted at `root_path`.
    ///
    /// Fails with `StorageError::Locked` when another `FileStorage` already
    /// holds the directory.
    pub fn new<P: AsRef<Path>>(root_path: P) -> StorageResult<Self> {
        let root = root_path.as_ref().to_path_buf();
        create_dir_all(root.join("namespaces"))
            .map_err(|e| io_to_storage_error("create storage root", e))?;

        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(root.join(LOCK_FILE))
            .map_err(|e| io_to_storage_error("open lock file", e))?;
        if lock.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked {
                path: root.display().to_string(),
            });
        }

        let storage = FileStorage {
            root_path: root,
            transactions: Vec::new(),
            _lock: lock,
        };
        storage.recover()?;
        debug!("Opened file storage at {}", storage.root_path.display());
        Ok(storage)
    }

    fn journal_path(&self) -> PathBuf {
        self.root_path.join(JOURNAL_FILE)
    }

    /// Undoes the writes of a transaction interrupted before commit
    fn recover(&self) -> StorageResult<()> {
        let path = self.journal_path();
        if !path.is_file() {
            return Ok(());
        }

        let file = File::open(&path).map_err(|e| io_to_storage_error("open journal", e))?;
        let lines: Vec<String> = BufReader::new(file)
            .lines()
            .collect::<Result<_, _>>()
            .map_err(|e| io_to_storage_error("read journal", e))?;

        let mut entries = Vec::with_capacity(lines.len());
        for (index, line) in lines.iter().enumerate() {
            match serde_json::from_str::<JournalEntry>(line) {
                Ok(entry) => entries.push(entry),
                // A torn final line was never followed by its key write
                Err(_) if index + 1 == lines.len() => {
                    warn!("Ignoring incomplete journal line in {}", path.display());
                }
                Err(e) => {
                    return Err(StorageError::TransactionError {
                        details: format!("corrupt journal line {}: {}", index + 1, e),
                    })
                }
            }
        }

        for entry in entries.iter().rev() {
            match &entry.previous {
                Some(hex_data) => {
                    let data = hex::decode(hex_data).map_err(|e| {
                        StorageError::TransactionError {
                            details: format!("corrupt journal data for {}: {}", entry.key, e),
                        }
                    })?;
                    self.write_key(&entry.namespace, &entry.key, &data)?;
                }
                None => self.remove_key(&entry.namespace, &entry.key)?,
            }
        }
        self.clear_journal()?;
        info!(
            "Rolled back {} write(s) of an unfinished transaction in {}",
            entries.len(),
            self.root_path.display()
        );
        Ok(())
    }

    fn append_journal(&self, op: &TransactionOp) -> StorageResult<()> {
        let entry = JournalEntry {
            namespace: op.namespace.clone(),
            key: op.key.clone(),
            previous: op.previous_data.as_ref().map(hex::encode),
        };
        let line = serde_json::to_string(&entry)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.journal_path())
            .map_err(|e| io_to_storage_error("open journal", e))?;
        writeln!(file, "{}", line).map_err(|e| io_to_storage_error("append journal", e))?;
        file.sync_all()
            .map_err(|e| io_to_storage_error("sync journal", e))
    }

    fn clear_journal(&self) -> StorageResult<()> {
        match fs::remove_file(self.journal_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_to_storage_error("remove journal", e)),
        }
    }

    /// Root directory of this store
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Gets the path to a namespace directory
    fn namespace_path(&self, namespace: &str) -> StorageResult<PathBuf> {
        validate_segments(namespace, namespace)?;
        let mut path = self.root_path.join("namespaces");
        for segment in namespace.split('/') {
            path.push(segment);
        }
        Ok(path)
    }

    /// Gets the path to the file holding a key
    fn key_path(&self, namespace: &str, key: &str) -> StorageResult<PathBuf> {
        validate_segments(key, &format!("{}:{}", namespace, key))?;
        let mut path = self.namespace_path(namespace)?;
        let mut segments: Vec<&str> = key.split('/').collect();
        let last = segments.pop().unwrap_or(key);
        for segment in segments {
            path.push(segment);
        }
        path.push(format!("{}.{}", last, DATA_EXTENSION));
        Ok(path)
    }

    fn read_key(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.key_path(namespace, key)?;
        if !path.is_file() {
            return Ok(None);
        }
        fs::read(&path)
            .map(Some)
            .map_err(|e| io_to_storage_error("read key", e))
    }

    fn write_key(&self, namespace: &str, key: &str, data: &[u8]) -> StorageResult<()> {
        let path = self.key_path(namespace, key)?;
        if let Some(parent) = path.parent() {
            create_dir_all(parent).map_err(|e| io_to_storage_error("create key directory", e))?;
        }

        let tmp_path = path.with_extension("tmp");
        {
            let mut file = File::create(&tmp_path)
                .map_err(|e| io_to_storage_error("create temp file", e))?;
            file.write_all(data)
                .map_err(|e| io_to_storage_error("write temp file", e))?;
            file.sync_all()
                .map_err(|e| io_to_storage_error("sync temp file", e))?;
        }
        fs::rename(&tmp_path, &path).map_err(|e| io_to_storage_error("rename temp file", e))
    }

    fn remove_key(&self, namespace: &str, key: &str) -> StorageResult<()> {
        let path = self.key_path(namespace, key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_to_storage_error("remove key", e)),
        }
    }

    /// Collects keys below `dir`, rebuilding `/`-separated key names
    fn collect_keys(dir: &Path, prefix: &str, out: &mut Vec<String>) -> StorageResult<()> {
        let entries = fs::read_dir(dir).map_err(|e| io_to_storage_error("list keys", e))?;
        for entry in entries {
            let entry = entry.map_err(|e| io_to_storage_error("list keys", e))?;
            let path = entry.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => {
                    warn!("Skipping non UTF-8 entry {}", path.display());
                    continue;
                }
            };

            if path.is_dir() {
                Self::collect_keys(&path, &format!("{}{}/", prefix, name), out)?;
            } else if path.extension().and_then(|e| e.to_str()) == Some(DATA_EXTENSION) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    out.push(format!("{}{}", prefix, stem));
                }
            }
        }
        Ok(())
    }
}

/// Rejects keys that would escape or collapse the directory layout
fn validate_segments(value: &str, display: &str) -> StorageResult<()> {
    let bad = value.is_empty()
        || value
            .split('/')
            .any(|s| s.is_empty() || s == "." || s == ".." || s.contains('\\'));
    if bad {
        return Err(StorageError::InvalidKey {
            key: display.to_string(),
            details: "segments must be non-empty and must not be '.' or '..'".to_string(),
        });
    }
    Ok(())
}

impl StorageBackend for FileStorage {
    fn get(&self, namespace: &str, key: &str) -> StorageResult<Vec<u8>> {
        self.read_key(namespace, key)?
            .ok_or_else(|| StorageError::NotFound {
                key: format!("{}:{}", namespace, key),
            })
    }

    fn set(&mut self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        if !self.transactions.is_empty() {
            let op = TransactionOp {
                namespace: namespace.to_string(),
                key: key.to_string(),
                previous_data: self.read_key(namespace, key)?,
            };
            // The undo record must be durable before the key changes
            self.append_journal(&op)?;
            if let Some(current) = self.transactions.last_mut() {
                current.push(op);
            }
        }
        self.write_key(namespace, key, &value)
    }

    fn contains(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        Ok(self.key_path(namespace, key)?.is_file())
    }

    fn list_keys(&self, namespace: &str, prefix: Option<&str>) -> StorageResult<Vec<String>> {
        let dir = self.namespace_path(namespace)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        Self::collect_keys(&dir, "", &mut keys)?;
        keys.retain(|k| prefix.map_or(true, |p| k.starts_with(p)));
        keys.sort();
        Ok(keys)
    }

    fn begin_transaction(&mut self) -> StorageResult<()> {
        self.transactions.push(Vec::new());
        Ok(())
    }

    fn commit_transaction(&mut self) -> StorageResult<()> {
        match self.transactions.pop() {
            Some(ops) => match self.transactions.last_mut() {
                Some(parent) => {
                    parent.extend(ops);
                    Ok(())
                }
                None => self.clear_journal(),
            },
            None => Err(StorageError::TransactionError {
                details: "No active transaction to commit".to_string(),
            }),
        }
    }

    fn rollback_transaction(&mut self) -> StorageResult<()> {
        let ops = self
            .transactions
            .pop()
            .ok_or_else(|| StorageError::TransactionError {
                details: "No active transaction to rollback".to_string(),
            })?;

        for op in ops.into_iter().rev() {
            match op.previous_data {
                Some(data) => self.write_key(&op.namespace, &op.key, &data)?,
                None => self.remove_key(&op.namespace, &op.key)?,
            }
        }
        if self.transactions.is_empty() {
            self.clear_journal()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_nested_keys_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut storage = FileStorage::new(dir.path()).unwrap();
        storage.set("votes", "0xa1/7-0", b"v".to_vec()).unwrap();
        storage.set("votes", "0xa1/7-1", b"w".to_vec()).unwrap();
        storage.set("votes", "0xb2/9-0", b"x".to_vec()).unwrap();

        assert_eq!(storage.get("votes", "0xa1/7-1").unwrap(), b"w".to_vec());
        assert_eq!(
            storage.list_keys("votes", Some("0xa1/")).unwrap(),
            vec!["0xa1/7-0".to_string(), "0xa1/7-1".to_string()]
        );
        assert!(storage.list_keys("missing", None).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_traversal_keys() {
        let dir = TempDir::new().unwrap();
        let mut storage = FileStorage::new(dir.path()).unwrap();
        for key in ["", "../escape", "a//b", "a/./b"] {
            assert!(
                matches!(
                    storage.set("ns", key, vec![]),
                    Err(StorageError::InvalidKey { .. })
                ),
                "key {:?} should be rejected",
                key
            );
        }
    }

    #[test]
    fn test_rollback_restores_previous_contents() {
        let dir = TempDir::new().unwrap();
        let mut storage = FileStorage::new(dir.path()).unwrap();
        storage.set("ns", "kept", b"old".to_vec()).unwrap();

        storage.begin_transaction().unwrap();
        storage.set("ns", "kept", b"new".to_vec()).unwrap();
        storage.set("ns", "fresh", b"tmp".to_vec()).unwrap();
        storage.rollback_transaction().unwrap();

        assert_eq!(storage.get("ns", "kept").unwrap(), b"old".to_vec());
        assert!(!storage.contains("ns", "fresh").unwrap());
    }

    #[test]
    fn test_unfinished_transaction_undone_on_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let mut storage = FileStorage::new(dir.path()).unwrap();
            storage.set("ns", "kept", b"old".to_vec()).unwrap();
            storage.begin_transaction().unwrap();
            storage.set("ns", "kept", b"new".to_vec()).unwrap();
            storage.set("ns", "fresh/nested", b"tmp".to_vec()).unwrap();
            storage.set("ns", "kept", b"newer".to_vec()).unwrap();
            // Dropped without commit or rollback
        }
        assert!(dir.path().join(JOURNAL_FILE).is_file());

        let storage = FileStorage::new(dir.path()).unwrap();
        assert_eq!(storage.get("ns", "kept").unwrap(), b"old".to_vec());
        assert!(!storage.contains("ns", "fresh/nested").unwrap());
        assert!(!dir.path().join(JOURNAL_FILE).exists());
    }

    #[test]
    fn test_commit_and_rollback_clear_journal() {
        let dir = TempDir::new().unwrap();
        let mut storage = FileStorage::new(dir.path()).unwrap();

        storage.begin_transaction().unwrap();
        storage.begin_transaction().unwrap();
        storage.set("ns", "a", b"1".to_vec()).unwrap();
        storage.commit_transaction().unwrap();
        // Inner commit keeps the journal for the outer transaction
        assert!(dir.path().join(JOURNAL_FILE).is_file());
        storage.commit_transaction().unwrap();
        assert!(!dir.path().join(JOURNAL_FILE).exists());

        storage.begin_transaction().unwrap();
        storage.set("ns", "a", b"2".to_vec()).unwrap();
        storage.rollback_transaction().unwrap();
        assert!(!dir.path().join(JOURNAL_FILE).exists());
        assert_eq!(storage.get("ns", "a").unwrap(), b"1".to_vec());
    }

    #[test]
    fn test_torn_journal_tail_is_ignored() {
        let dir = TempDir::new().unwrap();
        {
            let mut storage = FileStorage::new(dir.path()).unwrap();
            storage.begin_transaction().unwrap();
            storage.set("ns", "a", b"1".to_vec()).unwrap();
        }
        let mut journal = OpenOptions::new()
            .append(true)
            .open(dir.path().join(JOURNAL_FILE))
            .unwrap();
        write!(journal, "{{\"namespace\":\"ns\",\"ke").unwrap();
        drop(journal);

        let storage = FileStorage::new(dir.path()).unwrap();
        assert!(!storage.contains("ns", "a").unwrap());
    }

    #[test]
    fn test_second_open_is_locked() {
        let dir = TempDir::new().unwrap();
        let _first = FileStorage::new(dir.path()).unwrap();
        assert!(matches!(
            FileStorage::new(dir.path()),
            Err(StorageError::Locked { .. })
        ));
    }
}
