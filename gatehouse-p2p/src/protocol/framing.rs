//! Length-prefixed frame codec.
//!
//! Frames are laid out as:
//! - 4 bytes: magic `GHSE`
//! - 4 bytes: big-endian payload length
//! - N bytes: payload (a Noise handshake or transport message)

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::config::{FRAME_MAGIC, MAX_FRAME_SIZE};
use crate::error::{P2pError, P2pResult};

/// Header size: 4 bytes magic + 4 bytes length.
const HEADER_SIZE: usize = 8;

/// Codec splitting a byte stream into opaque frames.
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Payload length of the frame being assembled, once its header is read.
    current_length: Option<usize>,
}

impl FrameCodec {
    /// Create a new frame codec.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = P2pError;

    fn decode(&mut self, src: &mut BytesMut) -> P2pResult<Option<Self::Item>> {
        let length = match self.current_length {
            Some(length) => length,
            None => {
                if src.len() < HEADER_SIZE {
                    return Ok(None);
                }

                let actual = [src[0], src[1], src[2], src[3]];
                if actual != FRAME_MAGIC {
                    return Err(P2pError::InvalidMagic {
                        expected: FRAME_MAGIC,
                        actual,
                    });
                }

                let length = u32::from_be_bytes([src[4], src[5], src[6], src[7]]) as usize;
                if length > MAX_FRAME_SIZE {
                    return Err(P2pError::MessageTooLarge {
                        size: length,
                        max: MAX_FRAME_SIZE,
                    });
                }

                self.current_length = Some(length);
                length
            }
        };

        if src.len() < HEADER_SIZE + length {
            src.reserve(HEADER_SIZE + length - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        self.current_length = None;
        Ok(Some(src.split_to(length)))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = P2pError;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> P2pResult<()> {
        if payload.len() > MAX_FRAME_SIZE {
            return Err(P2pError::MessageTooLarge {
                size: payload.len(),
                max: MAX_FRAME_SIZE,
            });
        }

        dst.reserve(HEADER_SIZE + payload.len());
        dst.put_slice(&FRAME_MAGIC);
        dst.put_u32(payload.len() as u32);
        dst.put_slice(&payload);
        Ok(())
    }
}
