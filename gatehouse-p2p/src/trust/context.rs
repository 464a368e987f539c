//! Per-node trust state.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use gatehouse_core::{fingerprint, EncryptionPublicKey, Identity};
use gatehouse_storage::{KvBackend, MemoryBackend};
use tracing::info;

use super::authorizer::Authorizer;
use super::domain::Domain;
use super::store::CertificateStore;
use super::validator::Validator;
use crate::config::TrustConfig;
use crate::error::P2pResult;

/// Everything one node knows about whom it trusts.
///
/// Owns the node's identity, its certificate store, the validator, the
/// table of authorized peers (`fingerprint -> address`) and the map from
/// peer encryption key back to verifying key. Two contexts in one process
/// share nothing.
pub struct TrustContext {
    identity: Identity,
    store: CertificateStore,
    validator: Validator,
    authorized_nodes: RwLock<HashMap<String, String>>,
    verifying_keys: RwLock<HashMap<EncryptionPublicKey, String>>,
}

impl TrustContext {
    /// Open the certificate store on `backend` and write the self-certificate.
    pub fn new(
        identity: Identity,
        backend: Arc<dyn KvBackend>,
        config: &TrustConfig,
        validator: Validator,
    ) -> P2pResult<Self> {
        let store = CertificateStore::open(backend, identity.public_key())?;
        store.generate_self_certificate(config.wipe_certs)?;
        info!(
            verifying_key = identity.verifying_key_hex(),
            public_key = %identity.public_key(),
            "Trust context ready"
        );
        Ok(Self {
            identity,
            store,
            validator,
            authorized_nodes: RwLock::new(HashMap::new()),
            verifying_keys: RwLock::new(HashMap::new()),
        })
    }

    /// A context whose certificates live only in memory.
    pub fn in_memory(identity: Identity, validator: Validator) -> P2pResult<Self> {
        Self::new(
            identity,
            Arc::new(MemoryBackend::new()),
            &TrustConfig::default(),
            validator,
        )
    }

    /// Swap the validator.
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    /// This node's identity.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// This node's certificate store.
    pub fn store(&self) -> &CertificateStore {
        &self.store
    }

    /// A handle on the live trust view.
    pub fn authorizer(&self) -> Authorizer {
        self.store.authorizer().clone()
    }

    /// Run the validator on a claimed verifying key.
    pub fn validate(&self, verifying_key: &str) -> bool {
        (self.validator)(verifying_key)
    }

    /// Record a peer that completed the handshake: trust its key in `domain`,
    /// remember where it lives and which verifying key owns the encryption key.
    pub fn register_peer(
        &self,
        verifying_key: &str,
        public_key: &EncryptionPublicKey,
        address: &str,
        domain: &Domain,
    ) -> P2pResult<()> {
        self.store.add(public_key, domain)?;
        self.authorized_nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(fingerprint(verifying_key), address.to_string());
        self.verifying_keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(*public_key, verifying_key.to_ascii_lowercase());
        Ok(())
    }

    /// Snapshot of `fingerprint -> address` for every authorized peer.
    pub fn authorized_nodes(&self) -> HashMap<String, String> {
        self.authorized_nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Last known address of an authorized peer.
    pub fn authorized_address(&self, verifying_key: &str) -> Option<String> {
        self.authorized_nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&fingerprint(verifying_key))
            .cloned()
    }

    /// The verifying key that owns an encryption key, if we have met it.
    pub fn verifying_key_for(&self, public_key: &EncryptionPublicKey) -> Option<String> {
        self.verifying_keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(public_key)
            .cloned()
    }

    /// Snapshot of `verifying key -> address` for every authorized peer.
    pub fn authorized_peers(&self) -> HashMap<String, String> {
        let nodes = self.authorized_nodes.read().unwrap_or_else(PoisonError::into_inner);
        self.verifying_keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter_map(|vk| nodes.get(&fingerprint(vk)).map(|addr| (vk.clone(), addr.clone())))
            .collect()
    }
}

impl std::fmt::Debug for TrustContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustContext")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}
