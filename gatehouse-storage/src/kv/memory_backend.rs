//! In-memory record backend.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use super::{validate_key, BatchOp, KvBackend, WriteBatch};
use crate::error::StorageError;

/// In-memory backend using a BTreeMap.
///
/// Keys stay sorted, so prefix listing is a range scan.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    data: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    /// Create a new empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.data.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        validate_key(key)?;
        Ok(self
            .data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        validate_key(key)?;
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<(), StorageError> {
        batch.validate()?;
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        for op in batch.operations {
            match op {
                BatchOp::Put { key, value } => {
                    data.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        Ok(data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_empty() {
        let backend = MemoryBackend::new();
        assert!(backend.is_empty());
        backend.put("a/b", b"v").unwrap();
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn test_prefix_is_not_component_aware() {
        let backend = MemoryBackend::new();
        backend.put("keys/a", b"1").unwrap();
        backend.put("keysmith/b", b"2").unwrap();
        assert_eq!(backend.list("keys").unwrap().len(), 2);
        assert_eq!(backend.list("keys/").unwrap().len(), 1);
    }

    #[test]
    fn test_bad_batch_applies_nothing() {
        let backend = MemoryBackend::new();
        let mut batch = WriteBatch::new();
        batch.put("good/1", b"1".to_vec());
        batch.put("bad key", b"2".to_vec());
        assert!(backend.write_batch(batch).is_err());
        assert!(backend.is_empty());
    }
}
