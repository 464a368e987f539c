//! Error types for the Gatehouse core crate.

use std::fmt;

/// Errors related to key material.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CryptoError {
    /// The verifying key is not 32 hex-encoded bytes or not a curve point.
    InvalidVerifyingKey,
    /// The encryption public key is not 32 hex-encoded bytes.
    InvalidPublicKey,
    /// The signing seed is not 32 hex-encoded bytes.
    InvalidSeed,
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::InvalidVerifyingKey => write!(f, "invalid verifying key"),
            CryptoError::InvalidPublicKey => write!(f, "invalid encryption public key"),
            CryptoError::InvalidSeed => write!(f, "invalid signing seed"),
        }
    }
}

impl std::error::Error for CryptoError {}
