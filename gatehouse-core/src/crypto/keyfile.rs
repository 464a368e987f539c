//! Password-sealed storage for an identity seed.
//!
//! A node that should keep its identity across restarts stores the Ed25519
//! seed in a small sealed file instead of passing it on the command line.
//!
//! Layout: `"GHKF" | version (1) | salt (16) | nonce (12) | ciphertext (32) | tag (16)`.
//! The sealing key is Argon2id(password, salt); the cipher is AES-256-GCM
//! with the 5-byte header as associated data.

use std::fs;
use std::path::Path;

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;

use super::identity::{Identity, KEY_LEN};

/// Magic bytes identifying a sealed seed file.
pub const SEALED_MAGIC: &[u8; 4] = b"GHKF";

/// Current format version.
pub const SEALED_VERSION: u8 = 1;

const HEADER_LEN: usize = 5;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Total size of a sealed seed in bytes.
pub const SEALED_LEN: usize = HEADER_LEN + SALT_LEN + NONCE_LEN + KEY_LEN + TAG_LEN;

// 19 MiB, 2 passes, single lane.
const ARGON2_M_COST: u32 = 19 * 1024;
const ARGON2_T_COST: u32 = 2;
const ARGON2_P_COST: u32 = 1;

/// Errors from sealing or opening a seed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyFileError {
    /// Input is not exactly [`SEALED_LEN`] bytes.
    WrongLength {
        /// Bytes found.
        actual: usize,
    },
    /// Magic bytes don't match.
    InvalidMagic,
    /// The format version is not one this build understands.
    UnsupportedVersion(u8),
    /// Argon2id rejected its parameters.
    KeyDerivationFailed,
    /// Wrong password or tampered file.
    DecryptionFailed,
    /// AES-GCM refused to seal.
    EncryptionFailed,
    /// Reading or writing the file failed.
    Io(String),
}

impl std::fmt::Display for KeyFileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyFileError::WrongLength { actual } => {
                write!(f, "sealed seed must be {} bytes, got {}", SEALED_LEN, actual)
            }
            KeyFileError::InvalidMagic => write!(f, "not a sealed seed file"),
            KeyFileError::UnsupportedVersion(v) => write!(f, "unsupported sealed seed version {}", v),
            KeyFileError::KeyDerivationFailed => write!(f, "key derivation failed"),
            KeyFileError::DecryptionFailed => write!(f, "wrong password or corrupted file"),
            KeyFileError::EncryptionFailed => write!(f, "encryption failed"),
            KeyFileError::Io(e) => write!(f, "i/o error: {}", e),
        }
    }
}

impl std::error::Error for KeyFileError {}

impl From<std::io::Error> for KeyFileError {
    fn from(e: std::io::Error) -> Self {
        KeyFileError::Io(e.to_string())
    }
}

/// A seed sealed under a password.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedSeed {
    bytes: Vec<u8>,
}

impl SealedSeed {
    /// Seal a seed. Salt and nonce are fresh for every call.
    pub fn seal(seed: &[u8; KEY_LEN], password: &str) -> Result<Self, KeyFileError> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        rand::thread_rng().fill_bytes(&mut nonce);

        let header = header();
        let cipher = cipher(password, &salt)?;
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: seed,
                    aad: &header,
                },
            )
            .map_err(|_| KeyFileError::EncryptionFailed)?;

        let mut bytes = Vec::with_capacity(SEALED_LEN);
        bytes.extend_from_slice(&header);
        bytes.extend_from_slice(&salt);
        bytes.extend_from_slice(&nonce);
        bytes.extend_from_slice(&ciphertext);
        debug_assert_eq!(bytes.len(), SEALED_LEN);

        Ok(SealedSeed { bytes })
    }

    /// Check the header of raw bytes without decrypting.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, KeyFileError> {
        if bytes.len() != SEALED_LEN {
            return Err(KeyFileError::WrongLength {
                actual: bytes.len(),
            });
        }
        if &bytes[..4] != SEALED_MAGIC {
            return Err(KeyFileError::InvalidMagic);
        }
        if bytes[4] != SEALED_VERSION {
            return Err(KeyFileError::UnsupportedVersion(bytes[4]));
        }
        Ok(SealedSeed { bytes })
    }

    /// Raw sealed bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Recover the seed.
    pub fn open(&self, password: &str) -> Result<[u8; KEY_LEN], KeyFileError> {
        let (header, rest) = self.bytes.split_at(HEADER_LEN);
        let (salt, rest) = rest.split_at(SALT_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

        let plaintext = cipher(password, salt)?
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: header,
                },
            )
            .map_err(|_| KeyFileError::DecryptionFailed)?;

        <[u8; KEY_LEN]>::try_from(plaintext.as_slice()).map_err(|_| KeyFileError::DecryptionFailed)
    }

    /// Open straight into an [`Identity`].
    pub fn open_identity(&self, password: &str) -> Result<Identity, KeyFileError> {
        self.open(password).map(|seed| Identity::derive(&seed))
    }

    /// Read a sealed seed from disk.
    pub fn load(path: &Path) -> Result<Self, KeyFileError> {
        Self::from_bytes(fs::read(path)?)
    }

    /// Write the sealed seed to disk.
    pub fn save(&self, path: &Path) -> Result<(), KeyFileError> {
        fs::write(path, &self.bytes)?;
        Ok(())
    }
}

fn header() -> [u8; HEADER_LEN] {
    let mut h = [0u8; HEADER_LEN];
    h[..4].copy_from_slice(SEALED_MAGIC);
    h[4] = SEALED_VERSION;
    h
}

fn cipher(password: &str, salt: &[u8]) -> Result<Aes256Gcm, KeyFileError> {
    let params = Params::new(ARGON2_M_COST, ARGON2_T_COST, ARGON2_P_COST, Some(32))
        .map_err(|_| KeyFileError::KeyDerivationFailed)?;
    let mut key = [0u8; 32];
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|_| KeyFileError::KeyDerivationFailed)?;
    Aes256Gcm::new_from_slice(&key).map_err(|_| KeyFileError::KeyDerivationFailed)
}
