//! P2P error types.

use std::io;

use gatehouse_core::CryptoError;
use gatehouse_storage::StorageError;
use thiserror::Error;

/// Errors raised by the trust layer, secure channels and handshake protocol.
#[derive(Debug, Error)]
pub enum P2pError {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The certificate store's backend failed.
    #[error("Certificate store error: {0}")]
    Storage(#[from] StorageError),

    /// A certificate record could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A verifying or public key was not valid hex or not a curve point.
    #[error("Malformed key: {0}")]
    MalformedKey(#[from] CryptoError),

    /// Domain name is empty, too long, reserved or has illegal characters.
    #[error("Invalid domain: {0:?}")]
    InvalidDomain(String),

    /// The validator refused an identity the peer presented.
    #[error("Identity rejected by validator")]
    ValidationRejected,

    /// Noise handshake or transport failure.
    #[error("Secure channel error: {0}")]
    Noise(String),

    /// Invalid frame magic bytes.
    #[error("Invalid frame magic: expected {expected:?}, got {actual:?}")]
    InvalidMagic { expected: [u8; 4], actual: [u8; 4] },

    /// Frame exceeds maximum allowed size.
    #[error("Frame too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// The responder's static key is not the one we pinned.
    #[error("Peer key mismatch: expected {expected}, got {actual}")]
    PeerKeyMismatch { expected: String, actual: String },

    /// The initiator's static key is not trusted in the requested domain.
    #[error("Peer not authorized for domain {domain}")]
    PeerNotAuthorized { domain: String },

    /// The remote end closed the connection.
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// A frame carried something other than what the protocol step expects.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// `start` was called on an overlay that is already running.
    #[error("Overlay already started")]
    AlreadyStarted,

    /// The overlay has no running tasks to wait for.
    #[error("Overlay not started")]
    NotStarted,

    /// A background task panicked or was cancelled unexpectedly.
    #[error("Task failed: {0}")]
    TaskFailed(String),
}

impl P2pError {
    /// Errors that must stop the handshake server instead of dropping one exchange.
    pub fn is_fatal(&self) -> bool {
        matches!(self, P2pError::Storage(_))
    }

    /// Errors a client should read as an explicit refusal by the remote node.
    pub fn is_refusal(&self) -> bool {
        matches!(
            self,
            P2pError::ConnectionClosed
                | P2pError::PeerKeyMismatch { .. }
                | P2pError::PeerNotAuthorized { .. }
                | P2pError::ValidationRejected
                | P2pError::MalformedMessage(_)
        )
    }
}

impl From<serde_json::Error> for P2pError {
    fn from(err: serde_json::Error) -> Self {
        P2pError::Serialization(err.to_string())
    }
}

impl From<snow::Error> for P2pError {
    fn from(err: snow::Error) -> Self {
        P2pError::Noise(err.to_string())
    }
}

/// Result type for P2P operations.
pub type P2pResult<T> = Result<T, P2pError>;
