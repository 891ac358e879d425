//! Persistent key-value store backed by redb.

use std::path::Path;

use redb::{Database, TableDefinition};

use crate::kv::{storage_err, KVResult, KVStore};

const TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("gallery");

/// A [`KVStore`] persisted in a single redb file.
///
/// Every write commits before returning.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Opens or creates the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> KVResult<Self> {
        let db = Database::create(path).map_err(storage_err)?;

        // Create the table up front so readers never see a missing table.
        let tx = db.begin_write().map_err(storage_err)?;
        {
            let _ = tx.open_table(TABLE).map_err(storage_err)?;
        }
        tx.commit().map_err(storage_err)?;

        Ok(Self { db })
    }
}

impl KVStore for RedbStore {
    fn get(&self, key: &str) -> KVResult<Option<Vec<u8>>> {
        let tx = self.db.begin_read().map_err(storage_err)?;
        let table = tx.open_table(TABLE).map_err(storage_err)?;
        let value = table.get(key).map_err(storage_err)?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn set(&self, key: &str, value: &[u8]) -> KVResult<()> {
        self.batch_set(&[(key, value)])
    }

    fn scan(&self, prefix: &str) -> KVResult<Vec<(String, Vec<u8>)>> {
        let tx = self.db.begin_read().map_err(storage_err)?;
        let table = tx.open_table(TABLE).map_err(storage_err)?;

        let mut results = Vec::new();
        for item in table.range(prefix..).map_err(storage_err)? {
            let (key, value) = item.map_err(storage_err)?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key.to_string(), value.value().to_vec()));
        }
        Ok(results)
    }

    fn scan_keys(&self, prefix: &str) -> KVResult<Vec<String>> {
        let tx = self.db.begin_read().map_err(storage_err)?;
        let table = tx.open_table(TABLE).map_err(storage_err)?;

        let mut keys = Vec::new();
        for item in table.range(prefix..).map_err(storage_err)? {
            let (key, _) = item.map_err(storage_err)?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            keys.push(key.to_string());
        }
        Ok(keys)
    }

    fn batch_set(&self, entries: &[(&str, &[u8])]) -> KVResult<()> {
        let tx = self.db.begin_write().map_err(storage_err)?;
        {
            let mut table = tx.open_table(TABLE).map_err(storage_err)?;
            for (key, value) in entries {
                table.insert(*key, *value).map_err(storage_err)?;
            }
        }
        tx.commit().map_err(storage_err)?;
        Ok(())
    }
}
