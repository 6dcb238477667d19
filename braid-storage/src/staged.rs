use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::StorageError;
use crate::traits::{BatchOp, KvPairs, KvStore};

type Overlay = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

/// Write overlay over a committed store.
///
/// Reads see staged writes first, then the base. Nothing reaches the base
/// until [`StagedStore::into_batch`] is handed to a `BatchWriter`; dropping
/// the overlay discards every staged write.
pub struct StagedStore<'a, S: KvStore + ?Sized> {
    base: &'a S,
    writes: RwLock<Overlay>,
}

impl<'a, S: KvStore + ?Sized> StagedStore<'a, S> {
    pub fn new(base: &'a S) -> Self {
        Self {
            base,
            writes: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of staged keys.
    pub fn staged_len(&self) -> usize {
        self.writes.read().map(|w| w.len()).unwrap_or(0)
    }

    /// Staged writes as one batch, in key order.
    pub fn into_batch(self) -> Result<Vec<BatchOp>, StorageError> {
        let writes = self
            .writes
            .into_inner()
            .map_err(|e| StorageError::BatchError {
                reason: e.to_string(),
            })?;
        Ok(writes
            .into_iter()
            .map(|(key, value)| match value {
                Some(value) => BatchOp::Put { key, value },
                None => BatchOp::Delete { key },
            })
            .collect())
    }

    fn stage(&self, key: &[u8], value: Option<Vec<u8>>) -> Result<(), StorageError> {
        let mut writes = self.writes.write().map_err(|e| StorageError::WriteError {
            reason: e.to_string(),
        })?;
        writes.insert(key.to_vec(), value);
        Ok(())
    }

    fn staged(&self, key: &[u8]) -> Result<Option<Option<Vec<u8>>>, StorageError> {
        let writes = self.writes.read().map_err(|e| StorageError::ReadError {
            reason: e.to_string(),
        })?;
        Ok(writes.get(key).cloned())
    }
}

impl<S: KvStore + ?Sized> KvStore for StagedStore<'_, S> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        match self.staged(key)? {
            Some(value) => Ok(value),
            None => self.base.get(key),
        }
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.stage(key, Some(value.to_vec()))
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.stage(key, None)
    }

    fn exists(&self, key: &[u8]) -> Result<bool, StorageError> {
        Ok(self.get(key)?.is_some())
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<KvPairs, StorageError> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.base.prefix_scan(prefix)?.into_iter().collect();
        let writes = self.writes.read().map_err(|e| StorageError::ReadError {
            reason: e.to_string(),
        })?;
        for (key, value) in writes
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
        {
            match value {
                Some(v) => {
                    merged.insert(key.clone(), v.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }
}
