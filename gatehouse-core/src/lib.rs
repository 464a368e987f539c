//! # Gatehouse Core
//!
//! Node identity and key handling shared by every Gatehouse crate:
//! - Deterministic derivation of a node's Ed25519 and X25519 keys from one seed
//! - Mapping an announced verifying key to the channel key it must present
//! - Fingerprints used to index trusted peers
//! - Sealed on-disk storage for identity seeds

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crypto;
pub mod error;

pub use crypto::{
    fingerprint, public_key_of, sha256, EncryptionPublicKey, Identity, KeyFileError, SealedSeed,
};
pub use error::CryptoError;
