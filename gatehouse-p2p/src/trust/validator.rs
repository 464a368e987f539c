//! Identity validators.
//!
//! A validator decides whether a claimed verifying key may join at all. The
//! default consults a [`ValidatorRegistry`], the set of verifying keys the
//! network recognises; tests and special deployments swap in other predicates.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

/// Predicate over hex verifying keys.
pub type Validator = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Accept every claim.
pub fn allow_all() -> Validator {
    Arc::new(|_| true)
}

/// Reject every claim.
pub fn deny_all() -> Validator {
    Arc::new(|_| false)
}

/// Shared set of recognised verifying keys. Lookups ignore hex case.
#[derive(Clone, Debug, Default)]
pub struct ValidatorRegistry {
    keys: Arc<RwLock<HashSet<String>>>,
}

impl ValidatorRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-filled with `keys`.
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let registry = Self::new();
        for key in keys {
            registry.insert(key.as_ref());
        }
        registry
    }

    /// Add a key. Returns false if it was already present.
    pub fn insert(&self, verifying_key: &str) -> bool {
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(verifying_key.to_ascii_lowercase())
    }

    /// Remove a key. Returns false if it was absent.
    pub fn remove(&self, verifying_key: &str) -> bool {
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&verifying_key.to_ascii_lowercase())
    }

    /// Whether a key is registered.
    pub fn contains(&self, verifying_key: &str) -> bool {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&verifying_key.to_ascii_lowercase())
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.keys.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A validator backed by this registry. Later inserts are visible to it.
    pub fn validator(&self) -> Validator {
        let registry = self.clone();
        Arc::new(move |vk| registry.contains(vk))
    }
}
