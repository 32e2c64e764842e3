use std::io;
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StorageError {
    /// Key not found in storage
    #[error("Key not found: {key}")]
    NotFound { key: String },

    /// Invalid namespace or key format
    #[error("Invalid key '{key}': {details}")]
    InvalidKey { key: String, details: String },

    /// Error serializing or deserializing data
    #[error("Serialization error: {details}")]
    SerializationError { details: String },

    /// Transaction-related error
    #[error("Transaction error: {details}")]
    TransactionError { details: String },

    /// Error accessing underlying storage medium (IO error)
    #[error("I/O error during {operation}: {details}")]
    IOError { operation: String, details: String },

    /// Another process holds the data directory
    #[error("Storage at '{path}' is locked by another process")]
    Locked { path: String },
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::IOError {
            operation: "unknown".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError {
            details: err.to_string(),
        }
    }
}

/// Maps an IO error to a StorageError
pub fn io_to_storage_error(operation: &str, error: io::Error) -> StorageError {
    StorageError::IOError {
        operation: operation.to_string(),
        details: error.to_string(),
    }
}

/// Define a standard Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
