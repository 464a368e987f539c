//! Acceptance tests for gatehouse-storage.
//!
//! These tests verify the acceptance criteria:
//! 1. Persistence: 1K records across domains -> reopen -> identical listings
//! 2. Parity: the directory and memory backends agree on every operation
//! 3. Batches: an invalid batch leaves the store untouched
//! 4. Storage size: 5K small records stay within a few megabytes on disk

use std::sync::Arc;
use tempfile::TempDir;

use gatehouse_storage::{DirectoryBackend, KvBackend, MemoryBackend, StorageError, WriteBatch};

const DOMAINS: [&str; 4] = ["authorized_keys", "finance", "delegates", "keys"];

/// Deterministic record key for index `i`.
fn record_key(i: u32) -> String {
    let domain = DOMAINS[(i as usize) % DOMAINS.len()];
    format!("{}/{:064x}.key", domain, u64::from(i) * 0x9e37_79b9)
}

/// Small JSON-ish value for index `i`.
fn record_value(i: u32) -> Vec<u8> {
    format!("{{\"index\":{},\"generated_at\":{}}}", i, 1_700_000_000 + i).into_bytes()
}

fn fill(store: &dyn KvBackend, count: u32) {
    let mut batch = WriteBatch::new();
    for i in 0..count {
        batch.put(record_key(i), record_value(i));
    }
    store.write_batch(batch).unwrap();
}

#[test]
fn test_persistence() {
    let dir = TempDir::new().unwrap();

    let before: Vec<Vec<(String, Vec<u8>)>> = {
        let store = DirectoryBackend::open(dir.path()).unwrap();
        fill(&store, 1000);
        store.flush().unwrap();
        DOMAINS.iter().map(|d| store.list(d).unwrap()).collect()
    };

    let store = DirectoryBackend::open(dir.path()).unwrap();
    let after: Vec<Vec<(String, Vec<u8>)>> =
        DOMAINS.iter().map(|d| store.list(d).unwrap()).collect();

    assert_eq!(before, after);
    assert_eq!(after.iter().map(Vec::len).sum::<usize>(), 1000);
    assert_eq!(store.get(&record_key(7)).unwrap(), Some(record_value(7)));
}

#[test]
fn test_backend_parity() {
    let dir = TempDir::new().unwrap();
    let backends: Vec<Arc<dyn KvBackend>> = vec![
        Arc::new(MemoryBackend::new()),
        Arc::new(DirectoryBackend::open(dir.path()).unwrap()),
    ];

    let mut results = Vec::new();
    for store in &backends {
        fill(store.as_ref(), 200);
        store.delete(&record_key(1)).unwrap();
        store.delete(&record_key(1)).unwrap();
        let removed = store.delete_prefix("delegates").unwrap();

        results.push((
            removed,
            store.exists(&record_key(0)).unwrap(),
            store.exists(&record_key(1)).unwrap(),
            store.list("authorized_keys").unwrap(),
            store.list("finance").unwrap(),
            store.list("delegates").unwrap(),
        ));
    }

    assert_eq!(results[0], results[1]);
    assert_eq!(results[0].0, 50);
    assert!(results[0].1);
    assert!(!results[0].2);
    assert!(results[0].5.is_empty());
}

#[test]
fn test_invalid_batch_is_atomic() {
    let dir = TempDir::new().unwrap();
    let backends: Vec<Arc<dyn KvBackend>> = vec![
        Arc::new(MemoryBackend::new()),
        Arc::new(DirectoryBackend::open(dir.path()).unwrap()),
    ];

    for store in &backends {
        let mut batch = WriteBatch::new();
        batch.put("finance/good.key", b"ok".to_vec());
        batch.put("../escape", b"bad".to_vec());

        let err = store.write_batch(batch).unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
        assert!(store.get("finance/good.key").unwrap().is_none());
        assert!(store.list("").unwrap().is_empty());
    }
}

#[test]
fn test_storage_size() {
    let dir = TempDir::new().unwrap();
    let store = DirectoryBackend::open(dir.path()).unwrap();
    fill(&store, 5000);
    store.flush().unwrap();

    let size = dir_size(dir.path());
    println!("Storage size for 5K records: {} bytes", size);
    // Record payloads are tiny; allow generous per-file block overhead.
    assert!(size < 64 * 1024 * 1024, "storage too large: {} bytes", size);
}

fn dir_size(path: &std::path::Path) -> u64 {
    let mut size = 0;
    if let Ok(entries) = std::fs::read_dir(path) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                size += dir_size(&path);
            } else if let Ok(meta) = entry.metadata() {
                size += meta.len();
            }
        }
    }
    size
}
