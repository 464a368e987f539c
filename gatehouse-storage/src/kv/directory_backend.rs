//! Filesystem record backend.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use super::{validate_key, BatchOp, KvBackend, WriteBatch};
use crate::error::StorageError;

const PARTIAL_SUFFIX: &str = "~partial";

/// Stores each record as a file at `<root>/<key>`.
///
/// Writes go to a sibling temporary file and are renamed into place, so a
/// reader never sees a half-written record. Batches are applied in order
/// but are not atomic across files.
#[derive(Debug)]
pub struct DirectoryBackend {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl DirectoryBackend {
    /// Open (creating if needed) a backend rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        if !root.is_dir() {
            return Err(StorageError::NotADirectory(root.display().to_string()));
        }
        debug!(root = %root.display(), "Opened directory backend");
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// The directory records live under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |p, c| p.join(c)))
    }

    fn write_file(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let path = self.path_of(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut partial = path.clone().into_os_string();
        partial.push(PARTIAL_SUFFIX);
        let partial = PathBuf::from(partial);
        fs::write(&partial, value)?;
        fs::rename(&partial, &path)?;
        Ok(())
    }

    fn remove_file(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_of(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn collect(
        &self,
        dir: &Path,
        rel: &str,
        prefix: &str,
        out: &mut Vec<(String, Vec<u8>)>,
    ) -> Result<(), StorageError> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let key = if rel.is_empty() {
                name
            } else {
                format!("{}/{}", rel, name)
            };
            // Leftovers from interrupted writes and hand-placed junk.
            if validate_key(&key).is_err() {
                if !key.ends_with(PARTIAL_SUFFIX) {
                    warn!(key = %key, "Skipping unrecognised entry in record directory");
                }
                continue;
            }
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                // Descend only when the subtree could still match.
                if key.starts_with(prefix) || prefix.starts_with(&format!("{}/", key)) {
                    self.collect(&entry.path(), &key, prefix, out)?;
                }
            } else if file_type.is_file() && key.starts_with(prefix) {
                out.push((key, fs::read(entry.path())?));
            }
        }
        Ok(())
    }
}

impl KvBackend for DirectoryBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_of(key)?;
        if path.is_dir() {
            return Ok(None);
        }
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.write_file(key, value)
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.remove_file(key)
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<(), StorageError> {
        batch.validate()?;
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        for op in &batch.operations {
            match op {
                BatchOp::Put { key, value } => self.write_file(key, value)?,
                BatchOp::Delete { key } => self.remove_file(key)?,
            }
        }
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let mut out = Vec::new();
        self.collect(&self.root, "", prefix, &mut out)?;
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }
}
