//! Live trust view consulted when a secure channel is accepted.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use gatehouse_core::EncryptionPublicKey;

use super::domain::Domain;

#[derive(Debug)]
struct TrustView {
    own_key: EncryptionPublicKey,
    domains: HashMap<Domain, HashSet<EncryptionPublicKey>>,
}

/// Shared `domain -> {public key}` table.
///
/// Cloning yields another handle on the same table. Only the certificate
/// store writes to it; secure channels read it on every accept. The node's
/// own key is trusted in every domain.
#[derive(Clone, Debug)]
pub struct Authorizer {
    view: Arc<RwLock<TrustView>>,
}

impl Authorizer {
    /// An empty view for a node whose own key is `own_key`.
    pub fn new(own_key: EncryptionPublicKey) -> Self {
        Self {
            view: Arc::new(RwLock::new(TrustView {
                own_key,
                domains: HashMap::new(),
            })),
        }
    }

    /// Replace a domain's key set in one step.
    pub fn configure(&self, domain: &Domain, keys: HashSet<EncryptionPublicKey>) {
        let mut view = self.view.write().unwrap_or_else(PoisonError::into_inner);
        if keys.is_empty() {
            view.domains.remove(domain);
        } else {
            view.domains.insert(domain.clone(), keys);
        }
    }

    /// Whether `key` may open channels in `domain`.
    pub fn allows(&self, domain: &Domain, key: &EncryptionPublicKey) -> bool {
        let view = self.view.read().unwrap_or_else(PoisonError::into_inner);
        view.own_key == *key
            || view
                .domains
                .get(domain)
                .map_or(false, |keys| keys.contains(key))
    }

    /// Forget every domain.
    pub fn clear(&self) {
        self.view
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .domains
            .clear();
    }
}
