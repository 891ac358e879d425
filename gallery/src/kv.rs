use std::fmt;

use thiserror::Error;

/// Errors that can occur in KV store operations.
#[derive(Error, Debug)]
pub enum KVError {
    #[error("kv: storage error: {0}")]
    Storage(String),

    #[error("kv: serialization error: {0}")]
    Serialization(String),
}

pub type KVResult<T> = Result<T, KVError>;

/// Ordered key-value store with string keys and byte values.
///
/// `batch_set` must be atomic: a concurrent `scan` observes either none or
/// all of the entries of one batch.
pub trait KVStore: Send + Sync {
    fn get(&self, key: &str) -> KVResult<Option<Vec<u8>>>;

    fn set(&self, key: &str, value: &[u8]) -> KVResult<()>;

    /// Returns every entry whose key starts with `prefix`, sorted by key.
    fn scan(&self, prefix: &str) -> KVResult<Vec<(String, Vec<u8>)>>;

    /// Returns every key starting with `prefix`, sorted, without reading
    /// values.
    fn scan_keys(&self, prefix: &str) -> KVResult<Vec<String>> {
        Ok(self.scan(prefix)?.into_iter().map(|(k, _)| k).collect())
    }

    /// Writes all entries in a single transaction.
    fn batch_set(&self, entries: &[(&str, &[u8])]) -> KVResult<()>;
}

impl fmt::Debug for dyn KVStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KVStore {{ ... }}")
    }
}

pub(crate) fn storage_err(e: impl fmt::Display) -> KVError {
    KVError::Storage(e.to_string())
}
