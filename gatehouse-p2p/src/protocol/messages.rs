//! Handshake protocol messages.
//!
//! A request is three frames sent back to back: the claimed verifying key
//! (64 hex chars), the address the claimant can be reached at, and the trust
//! domain. A reply is a single frame holding the responder's verifying key.
//! A responder that rejects the claim sends nothing and closes the channel.

use bytes::{Bytes, BytesMut};

use crate::error::{P2pError, P2pResult};

/// Number of frames in a handshake request.
pub const REQUEST_FRAMES: usize = 3;

/// Number of frames in a handshake reply.
pub const REPLY_FRAMES: usize = 1;

/// An identity claim as it arrives off the wire. Nothing here is trusted yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Claimed Ed25519 verifying key, hex.
    pub verifying_key: String,
    /// Address the claimant says it can be reached at.
    pub address: String,
    /// Trust domain the claimant wants to join.
    pub domain: String,
}

impl HandshakeRequest {
    /// Build a request.
    pub fn new(
        verifying_key: impl Into<String>,
        address: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            verifying_key: verifying_key.into(),
            address: address.into(),
            domain: domain.into(),
        }
    }

    /// Frames to send, in order.
    pub fn to_frames(&self) -> Vec<Bytes> {
        vec![
            Bytes::copy_from_slice(self.verifying_key.as_bytes()),
            Bytes::copy_from_slice(self.address.as_bytes()),
            Bytes::copy_from_slice(self.domain.as_bytes()),
        ]
    }

    /// Parse the frames of a request.
    pub fn from_frames(frames: Vec<BytesMut>) -> P2pResult<Self> {
        let [vk, address, domain]: [BytesMut; REQUEST_FRAMES] =
            frames.try_into().map_err(|frames: Vec<BytesMut>| {
                P2pError::MalformedMessage(format!(
                    "handshake request has {} frames, expected {}",
                    frames.len(),
                    REQUEST_FRAMES
                ))
            })?;
        Ok(Self {
            verifying_key: utf8(vk, "verifying key")?,
            address: utf8(address, "address")?,
            domain: utf8(domain, "domain")?,
        })
    }
}

/// The responder's answer to an accepted claim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandshakeReply {
    /// Responder's Ed25519 verifying key, hex.
    pub verifying_key: String,
}

impl HandshakeReply {
    /// Build a reply.
    pub fn new(verifying_key: impl Into<String>) -> Self {
        Self {
            verifying_key: verifying_key.into(),
        }
    }

    /// The single reply frame.
    pub fn to_frame(&self) -> Bytes {
        Bytes::copy_from_slice(self.verifying_key.as_bytes())
    }

    /// Parse the frames of a reply.
    pub fn from_frames(frames: Vec<BytesMut>) -> P2pResult<Self> {
        let [vk]: [BytesMut; REPLY_FRAMES] = frames.try_into().map_err(|frames: Vec<BytesMut>| {
            P2pError::MalformedMessage(format!(
                "handshake reply has {} frames, expected {}",
                frames.len(),
                REPLY_FRAMES
            ))
        })?;
        Ok(Self {
            verifying_key: utf8(vk, "verifying key")?,
        })
    }
}

fn utf8(frame: BytesMut, what: &str) -> P2pResult<String> {
    String::from_utf8(frame.to_vec())
        .map_err(|_| P2pError::MalformedMessage(format!("{} is not valid UTF-8", what)))
}
