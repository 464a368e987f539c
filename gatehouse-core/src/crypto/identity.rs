//! Node identity: one Ed25519 signing seed and the X25519 key pair derived from it.
//!
//! Peers announce themselves with the hex form of their Ed25519 verifying key.
//! The encryption key that authenticates a secure channel is a pure function of
//! that verifying key, so any node can compute which channel key to expect from
//! an announced identity without another round trip.

use std::fmt;
use std::str::FromStr;

use curve25519_dalek::edwards::CompressedEdwardsY;
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha512};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use crate::error::CryptoError;

/// Length in bytes of every key handled here.
pub const KEY_LEN: usize = 32;

/// X25519 public key used to authenticate secure channels.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EncryptionPublicKey([u8; KEY_LEN]);

impl EncryptionPublicKey {
    /// Wrap raw key bytes.
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        EncryptionPublicKey(bytes)
    }

    /// Parse a 64-character hex string. Either case is accepted.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        decode_key(s)
            .map(EncryptionPublicKey)
            .ok_or(CryptoError::InvalidPublicKey)
    }

    /// Raw key bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for EncryptionPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for EncryptionPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionPublicKey({})", self.to_hex())
    }
}

impl FromStr for EncryptionPublicKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl AsRef<[u8]> for EncryptionPublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for EncryptionPublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for EncryptionPublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        EncryptionPublicKey::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A node's long-term identity.
///
/// Built from a 32-byte Ed25519 seed. The X25519 secret is the clamped lower
/// half of SHA-512(seed), which is the same scalar Ed25519 signs with, so the
/// derived public key equals the Montgomery form of the verifying key.
#[derive(Clone)]
pub struct Identity {
    signing_key: SigningKey,
    secret: StaticSecret,
    public: EncryptionPublicKey,
    verifying_key_hex: String,
}

impl Identity {
    /// Derive the full identity from a signing seed.
    pub fn derive(seed: &[u8; KEY_LEN]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);

        let digest = Sha512::digest(seed);
        let mut scalar = [0u8; KEY_LEN];
        scalar.copy_from_slice(&digest[..KEY_LEN]);
        scalar[0] &= 248;
        scalar[31] &= 127;
        scalar[31] |= 64;

        let secret = StaticSecret::from(scalar);
        let public = EncryptionPublicKey(X25519PublicKey::from(&secret).to_bytes());
        let verifying_key_hex = hex::encode(signing_key.verifying_key().as_bytes());

        Identity {
            signing_key,
            secret,
            public,
            verifying_key_hex,
        }
    }

    /// Generate an identity from a fresh random seed.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self::derive(signing_key.as_bytes())
    }

    /// Derive from a hex-encoded seed.
    pub fn from_seed_hex(s: &str) -> Result<Self, CryptoError> {
        let seed = decode_key(s).ok_or(CryptoError::InvalidSeed)?;
        Ok(Self::derive(&seed))
    }

    /// Hex form of the Ed25519 verifying key. This is the identity peers announce.
    pub fn verifying_key_hex(&self) -> &str {
        &self.verifying_key_hex
    }

    /// Ed25519 verifying key.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// X25519 public key derived from the seed.
    pub fn public_key(&self) -> EncryptionPublicKey {
        self.public
    }

    /// X25519 secret bytes, as handed to the channel handshake.
    ///
    /// Use with caution - exposing these bytes compromises the identity.
    pub fn secret_key_bytes(&self) -> [u8; KEY_LEN] {
        self.secret.to_bytes()
    }

    /// The Ed25519 seed this identity was derived from.
    pub fn seed_bytes(&self) -> &[u8; KEY_LEN] {
        self.signing_key.as_bytes()
    }

    /// Ed25519 signing key.
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("verifying_key", &self.verifying_key_hex)
            .field("public_key", &self.public)
            .finish_non_exhaustive()
    }
}

/// Compute the encryption public key belonging to a hex verifying key.
///
/// Fails if the input is not 32 hex-encoded bytes or does not decompress to
/// a point on the Edwards curve.
pub fn public_key_of(verifying_key_hex: &str) -> Result<EncryptionPublicKey, CryptoError> {
    let bytes = decode_key(verifying_key_hex).ok_or(CryptoError::InvalidVerifyingKey)?;
    let point = CompressedEdwardsY(bytes)
        .decompress()
        .ok_or(CryptoError::InvalidVerifyingKey)?;
    Ok(EncryptionPublicKey(point.to_montgomery().to_bytes()))
}

fn decode_key(s: &str) -> Option<[u8; KEY_LEN]> {
    if s.len() != KEY_LEN * 2 {
        return None;
    }
    let mut out = [0u8; KEY_LEN];
    hex::decode_to_slice(s, &mut out).ok()?;
    Some(out)
}
