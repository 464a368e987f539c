//! Key material for the Gatehouse trust layer.
//!
//! - Ed25519 identity seeds and the X25519 channel keys derived from them
//! - SHA-256 and verifying-key fingerprints
//! - Password-sealed seed files (Argon2id + AES-256-GCM)

mod hashing;
mod identity;
pub mod keyfile;

pub use hashing::{fingerprint, sha256};
pub use identity::{public_key_of, EncryptionPublicKey, Identity, KEY_LEN};
pub use keyfile::{KeyFileError, SealedSeed};
