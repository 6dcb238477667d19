use std::sync::Arc;

use crate::error::StorageError;

/// Result type for prefix scan operations: key-value pairs in key order.
pub type KvPairs = Vec<(Vec<u8>, Vec<u8>)>;

/// Batch operation for atomic writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl BatchOp {
    pub fn key(&self) -> &[u8] {
        match self {
            BatchOp::Put { key, .. } | BatchOp::Delete { key } => key,
        }
    }
}

/// Core key-value store trait.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;
    fn delete(&self, key: &[u8]) -> Result<(), StorageError>;
    fn exists(&self, key: &[u8]) -> Result<bool, StorageError>;
    /// All pairs whose key starts with `prefix`, ordered by key.
    fn prefix_scan(&self, prefix: &[u8]) -> Result<KvPairs, StorageError>;
}

/// Atomic batch writer: either every op lands or none does.
pub trait BatchWriter: KvStore {
    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StorageError>;
}

macro_rules! forward_kv_store {
    () => {
        fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
            (**self).get(key)
        }

        fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
            (**self).put(key, value)
        }

        fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
            (**self).delete(key)
        }

        fn exists(&self, key: &[u8]) -> Result<bool, StorageError> {
            (**self).exists(key)
        }

        fn prefix_scan(&self, prefix: &[u8]) -> Result<KvPairs, StorageError> {
            (**self).prefix_scan(prefix)
        }
    };
}

/// Shared ownership, so a chain and its bridge can hold the same store.
impl<S: KvStore + ?Sized> KvStore for Arc<S> {
    forward_kv_store!();
}

impl<S: BatchWriter + ?Sized> BatchWriter for Arc<S> {
    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StorageError> {
        (**self).write_batch(ops)
    }
}

/// Borrowed stores, used by staged overlays over committed state.
impl<S: KvStore + ?Sized> KvStore for &S {
    forward_kv_store!();
}

impl KvStore for Box<dyn BatchWriter> {
    forward_kv_store!();
}

impl BatchWriter for Box<dyn BatchWriter> {
    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StorageError> {
        (**self).write_batch(ops)
    }
}
