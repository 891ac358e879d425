//! In-memory key-value store for tests and ephemeral galleries.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::kv::{storage_err, KVResult, KVStore};

/// A [`KVStore`] backed by a sorted map.
///
/// Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored keys.
    pub fn len(&self) -> usize {
        self.data.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KVStore for MemoryStore {
    fn get(&self, key: &str) -> KVResult<Option<Vec<u8>>> {
        let data = self.data.read().map_err(storage_err)?;
        Ok(data.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> KVResult<()> {
        let mut data = self.data.write().map_err(storage_err)?;
        data.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn scan(&self, prefix: &str) -> KVResult<Vec<(String, Vec<u8>)>> {
        let data = self.data.read().map_err(storage_err)?;
        Ok(data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn scan_keys(&self, prefix: &str) -> KVResult<Vec<String>> {
        let data = self.data.read().map_err(storage_err)?;
        Ok(data
            .range(prefix.to_string()..)
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn batch_set(&self, entries: &[(&str, &[u8])]) -> KVResult<()> {
        let mut data = self.data.write().map_err(storage_err)?;
        for (key, value) in entries {
            data.insert(key.to_string(), value.to_vec());
        }
        Ok(())
    }
}
