//! An established, encrypted channel.

use std::io;
use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use gatehouse_core::EncryptionPublicKey;
use snow::TransportState;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::config::MAX_FRAME_SIZE;
use crate::error::{P2pError, P2pResult};
use crate::protocol::FrameCodec;
use crate::trust::Domain;

/// Poly1305 tag appended to every Noise message.
const TAG_LEN: usize = 16;

/// Largest application frame a channel will carry.
pub const MAX_PLAINTEXT: usize = MAX_FRAME_SIZE - TAG_LEN;

/// A TCP stream after a completed Noise handshake.
///
/// Every application frame is one Noise transport message in one wire frame.
/// Dropping the channel closes the socket.
pub struct SecureChannel {
    framed: Framed<TcpStream, FrameCodec>,
    transport: TransportState,
    remote: EncryptionPublicKey,
    domain: Domain,
    peer_addr: Option<SocketAddr>,
    buf: Vec<u8>,
}

impl SecureChannel {
    pub(crate) fn new(
        framed: Framed<TcpStream, FrameCodec>,
        transport: TransportState,
        remote: EncryptionPublicKey,
        domain: Domain,
    ) -> Self {
        let peer_addr = framed.get_ref().peer_addr().ok();
        Self {
            framed,
            transport,
            remote,
            domain,
            peer_addr,
            buf: vec![0u8; MAX_FRAME_SIZE],
        }
    }

    /// The peer's authenticated static key.
    pub fn remote_public_key(&self) -> &EncryptionPublicKey {
        &self.remote
    }

    /// Domain the channel was opened for.
    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Remote socket address, if the OS still knows it.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Encrypt and send one frame.
    pub async fn send_frame(&mut self, payload: &[u8]) -> P2pResult<()> {
        let sealed = self.seal(payload)?;
        self.framed.send(sealed).await.map_err(closed_on_reset)
    }

    /// Send several frames and flush once.
    pub async fn send_multipart(&mut self, frames: &[Bytes]) -> P2pResult<()> {
        for frame in frames {
            let sealed = self.seal(frame)?;
            self.framed.feed(sealed).await.map_err(closed_on_reset)?;
        }
        self.framed.flush().await.map_err(closed_on_reset)
    }

    /// Receive and decrypt one frame.
    pub async fn recv_frame(&mut self) -> P2pResult<BytesMut> {
        let sealed = next_frame(&mut self.framed).await?;
        let n = self.transport.read_message(&sealed, &mut self.buf)?;
        Ok(BytesMut::from(&self.buf[..n]))
    }

    /// Receive exactly `n` frames.
    pub async fn recv_multipart(&mut self, n: usize) -> P2pResult<Vec<BytesMut>> {
        let mut frames = Vec::with_capacity(n);
        for _ in 0..n {
            frames.push(self.recv_frame().await?);
        }
        Ok(frames)
    }

    /// Flush and shut down the write half.
    pub async fn close(mut self) -> P2pResult<()> {
        self.framed.close().await.map_err(closed_on_reset)
    }

    fn seal(&mut self, payload: &[u8]) -> P2pResult<Bytes> {
        if payload.len() > MAX_PLAINTEXT {
            return Err(P2pError::MessageTooLarge {
                size: payload.len(),
                max: MAX_PLAINTEXT,
            });
        }
        let n = self.transport.write_message(payload, &mut self.buf)?;
        Ok(Bytes::copy_from_slice(&self.buf[..n]))
    }
}

impl std::fmt::Debug for SecureChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureChannel")
            .field("remote", &self.remote)
            .field("domain", &self.domain)
            .field("peer_addr", &self.peer_addr)
            .finish()
    }
}

/// Next wire frame, with a hang-up reported as [`P2pError::ConnectionClosed`].
pub(crate) async fn next_frame(framed: &mut Framed<TcpStream, FrameCodec>) -> P2pResult<BytesMut> {
    match framed.next().await {
        Some(Ok(frame)) => Ok(frame),
        Some(Err(e)) => Err(closed_on_reset(e)),
        None => Err(P2pError::ConnectionClosed),
    }
}

/// Fold the ways a TCP peer can vanish into one error.
pub(crate) fn closed_on_reset(err: P2pError) -> P2pError {
    match err {
        P2pError::Io(e)
            if matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ) =>
        {
            P2pError::ConnectionClosed
        }
        other => other,
    }
}
