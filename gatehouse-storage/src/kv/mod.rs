//! Record storage backends.
//!
//! - `MemoryBackend`: in-memory BTreeMap, for tests
//! - `DirectoryBackend`: one file per record, for nodes that keep their
//!   trusted peers across restarts

mod directory_backend;
mod memory_backend;

pub use directory_backend::DirectoryBackend;
pub use memory_backend::MemoryBackend;

use crate::error::StorageError;

/// Trait for record storage backends.
///
/// Keys are slash-separated paths whose components match `[A-Za-z0-9_.-]+`
/// and are neither `.` nor `..`. Listing returns records sorted by key.
pub trait KvBackend: Send + Sync {
    /// Get a record by key.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Insert or overwrite a record.
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Delete a record. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Check if a record exists.
    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(key)?.is_some())
    }

    /// Apply a batch of writes in order.
    fn write_batch(&self, batch: WriteBatch) -> Result<(), StorageError>;

    /// All records whose key starts with `prefix`, sorted by key.
    fn list(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError>;

    /// Delete every record whose key starts with `prefix`. Returns how many went.
    fn delete_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        let mut batch = WriteBatch::new();
        for (key, _) in self.list(prefix)? {
            batch.delete(key);
        }
        let n = batch.len();
        self.write_batch(batch)?;
        Ok(n)
    }

    /// Flush any buffered data to disk (if applicable).
    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Check that a record key is well formed.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let ok = !key.is_empty()
        && key.split('/').all(|c| {
            !c.is_empty()
                && c != "."
                && c != ".."
                && c.bytes()
                    .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
        });
    if ok {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

/// An ordered list of writes.
#[derive(Clone, Debug, Default)]
pub struct WriteBatch {
    /// Operations in the batch.
    pub operations: Vec<BatchOp>,
}

/// A single operation in a write batch.
#[derive(Clone, Debug)]
pub enum BatchOp {
    /// Write a record.
    Put {
        /// Record key.
        key: String,
        /// Record body.
        value: Vec<u8>,
    },
    /// Remove a record.
    Delete {
        /// Record key.
        key: String,
    },
}

impl BatchOp {
    fn key(&self) -> &str {
        match self {
            BatchOp::Put { key, .. } | BatchOp::Delete { key } => key,
        }
    }
}

impl WriteBatch {
    /// Create a new empty write batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a put.
    pub fn put(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.operations.push(BatchOp::Put {
            key: key.into(),
            value,
        });
    }

    /// Queue a delete.
    pub fn delete(&mut self, key: impl Into<String>) {
        self.operations.push(BatchOp::Delete { key: key.into() });
    }

    /// Check if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Reject the whole batch if any key is malformed.
    pub fn validate(&self) -> Result<(), StorageError> {
        self.operations.iter().try_for_each(|op| validate_key(op.key()))
    }
}
