//! Domain-partitioned certificate store.
//!
//! Each trusted `(domain, public key)` pair is one small JSON record at
//! `<subtree>/<pk-hex>.key`. The node's own record lives under `keys/`,
//! global-domain records under `authorized_keys/`, and every other domain
//! under a subtree named after it. After each mutation the affected domain's
//! key set is pushed into the [`Authorizer`], so the next accepted channel
//! already sees the change.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use gatehouse_core::EncryptionPublicKey;
use gatehouse_storage::KvBackend;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::authorizer::Authorizer;
use super::domain::{Domain, SELF_SUBTREE};
use crate::error::P2pResult;

const RECORD_SUFFIX: &str = ".key";

/// One stored membership fact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRecord {
    /// Trusted X25519 public key.
    pub public_key: EncryptionPublicKey,
    /// Domain the key is trusted in.
    pub domain: Domain,
    /// Unix seconds when the record was first written.
    pub generated_at: u64,
}

impl CertificateRecord {
    fn new(public_key: EncryptionPublicKey, domain: Domain) -> Self {
        let generated_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self {
            public_key,
            domain,
            generated_at,
        }
    }
}

/// Persistent set of trusted public keys, partitioned by domain.
pub struct CertificateStore {
    backend: Arc<dyn KvBackend>,
    own_key: EncryptionPublicKey,
    authorizer: Authorizer,
}

impl CertificateStore {
    /// Open a store over `backend` and load every domain already on it into
    /// a fresh authorizer.
    pub fn open(backend: Arc<dyn KvBackend>, own_key: EncryptionPublicKey) -> P2pResult<Self> {
        let store = Self {
            backend,
            own_key,
            authorizer: Authorizer::new(own_key),
        };
        for domain in store.domains()? {
            store.reconfigure(&domain)?;
        }
        Ok(store)
    }

    /// The trust view this store keeps current.
    pub fn authorizer(&self) -> &Authorizer {
        &self.authorizer
    }

    /// The node's own public key.
    pub fn own_public_key(&self) -> EncryptionPublicKey {
        self.own_key
    }

    /// Trust `public_key` in `domain`.
    ///
    /// Returns true if a new record was written. Adding our own key or a key
    /// already present changes nothing on disk; the domain is reconfigured
    /// either way.
    pub fn add(&self, public_key: &EncryptionPublicKey, domain: &Domain) -> P2pResult<bool> {
        if *public_key == self.own_key {
            return Ok(false);
        }
        let key = record_key(domain.subtree(), public_key);
        let added = if self.backend.exists(&key)? {
            false
        } else {
            let record = CertificateRecord::new(*public_key, domain.clone());
            self.backend.put(&key, &encode(&record)?)?;
            debug!(public_key = %public_key, domain = %domain, "Certificate added");
            true
        };
        self.reconfigure(domain)?;
        Ok(added)
    }

    /// Stop trusting `public_key` in `domain`. Returns true if a record was removed.
    pub fn remove(&self, public_key: &EncryptionPublicKey, domain: &Domain) -> P2pResult<bool> {
        if *public_key == self.own_key {
            return Ok(false);
        }
        let key = record_key(domain.subtree(), public_key);
        let removed = self.backend.exists(&key)?;
        if removed {
            self.backend.delete(&key)?;
            debug!(public_key = %public_key, domain = %domain, "Certificate removed");
        }
        self.reconfigure(domain)?;
        Ok(removed)
    }

    /// Re-read a domain's records and swap them into the authorizer.
    pub fn reconfigure(&self, domain: &Domain) -> P2pResult<()> {
        let keys: HashSet<_> = self
            .list(domain)?
            .into_iter()
            .map(|record| record.public_key)
            .collect();
        debug!(domain = %domain, keys = keys.len(), "Trust view reconfigured");
        self.authorizer.configure(domain, keys);
        Ok(())
    }

    /// Whether `public_key` has a record in `domain`.
    pub fn contains(&self, public_key: &EncryptionPublicKey, domain: &Domain) -> P2pResult<bool> {
        Ok(self
            .backend
            .exists(&record_key(domain.subtree(), public_key))?)
    }

    /// Every record in a domain, sorted by key.
    pub fn list(&self, domain: &Domain) -> P2pResult<Vec<CertificateRecord>> {
        self.records_under(domain.subtree())
    }

    /// Domains with at least one record.
    pub fn domains(&self) -> P2pResult<Vec<Domain>> {
        let subtrees: BTreeSet<String> = self
            .backend
            .list("")?
            .into_iter()
            .filter_map(|(key, _)| key.split_once('/').map(|(subtree, _)| subtree.to_string()))
            .collect();
        Ok(subtrees
            .iter()
            .filter_map(|s| Domain::from_subtree(s))
            .collect())
    }

    /// Write the node's own record under `keys/`, optionally wiping every
    /// stored certificate first.
    pub fn generate_self_certificate(&self, wipe: bool) -> P2pResult<()> {
        if wipe {
            let removed = self.wipe()?;
            info!(removed, "Wiped certificate store");
        }
        let record = CertificateRecord::new(self.own_key, Domain::global());
        self.backend
            .put(&record_key(SELF_SUBTREE, &self.own_key), &encode(&record)?)?;
        self.backend.flush()?;
        info!(public_key = %self.own_key, "Self-certificate written");
        Ok(())
    }

    /// The node's own record, if one has been written.
    pub fn self_certificate(&self) -> P2pResult<Option<CertificateRecord>> {
        Ok(self.records_under(SELF_SUBTREE)?.into_iter().next())
    }

    /// Delete every record and empty the trust view.
    pub fn wipe(&self) -> P2pResult<usize> {
        let removed = self.backend.delete_prefix("")?;
        self.authorizer.clear();
        Ok(removed)
    }

    fn records_under(&self, subtree: &str) -> P2pResult<Vec<CertificateRecord>> {
        let prefix = format!("{}/", subtree);
        let mut records = Vec::new();
        for (key, body) in self.backend.list(&prefix)? {
            if !key.ends_with(RECORD_SUFFIX) {
                continue;
            }
            match serde_json::from_slice::<CertificateRecord>(&body) {
                Ok(record) => records.push(record),
                Err(e) => warn!(key = %key, error = %e, "Skipping unreadable certificate"),
            }
        }
        Ok(records)
    }
}

fn record_key(subtree: &str, public_key: &EncryptionPublicKey) -> String {
    format!("{}/{}{}", subtree, public_key.to_hex(), RECORD_SUFFIX)
}

fn encode(record: &CertificateRecord) -> P2pResult<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(record)?)
}
