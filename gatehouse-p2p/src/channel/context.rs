//! Building secure channels from a node identity.

use bytes::Bytes;
use futures::SinkExt;
use gatehouse_core::{EncryptionPublicKey, Identity};
use snow::params::NoiseParams;
use snow::{Builder, HandshakeState};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use super::secure::{closed_on_reset, next_frame, SecureChannel};
use crate::config::MAX_FRAME_SIZE;
use crate::error::{P2pError, P2pResult};
use crate::protocol::FrameCodec;
use crate::trust::{Authorizer, Domain};

/// Noise XX: both sides transmit their static key, encrypted.
const NOISE_PARAMS: &str = "Noise_XX_25519_ChaChaPoly_BLAKE2s";

/// How an accepting side decides whether to keep a channel.
#[derive(Clone, Debug)]
pub enum AuthMode {
    /// Keep any peer that completes the handshake. Authorization happens
    /// later, at the application layer.
    AllowAny,
    /// Keep only peers the authorizer trusts in the requested domain.
    Enforce(Authorizer),
}

/// Factory for secure channels bound to one node's static key.
#[derive(Clone)]
pub struct SecureContext {
    secret: [u8; 32],
    public: EncryptionPublicKey,
    mode: AuthMode,
}

impl SecureContext {
    /// Context for `identity` accepting peers according to `mode`.
    pub fn new(identity: &Identity, mode: AuthMode) -> Self {
        Self {
            secret: identity.secret_key_bytes(),
            public: identity.public_key(),
            mode,
        }
    }

    /// Our static public key.
    pub fn public_key(&self) -> &EncryptionPublicKey {
        &self.public
    }

    /// Accept policy.
    pub fn mode(&self) -> &AuthMode {
        &self.mode
    }

    /// Open a channel to a peer whose static key must be `expected`.
    ///
    /// The requested domain travels encrypted in the final handshake message.
    pub async fn connect(
        &self,
        stream: TcpStream,
        expected: &EncryptionPublicKey,
        domain: &Domain,
    ) -> P2pResult<SecureChannel> {
        let mut framed = Framed::new(stream, FrameCodec::new());
        let mut handshake = self.builder()?.build_initiator()?;
        let mut buf = vec![0u8; MAX_FRAME_SIZE];

        // -> e
        let n = handshake.write_message(&[], &mut buf)?;
        send_raw(&mut framed, &buf[..n]).await?;

        // <- e, ee, s, es
        let msg = next_frame(&mut framed).await?;
        handshake.read_message(&msg, &mut buf)?;
        let remote = remote_static(&handshake)?;
        if remote != *expected {
            warn!(expected = %expected, actual = %remote, "Responder presented an unexpected key");
            return Err(P2pError::PeerKeyMismatch {
                expected: expected.to_hex(),
                actual: remote.to_hex(),
            });
        }

        // -> s, se
        let n = handshake.write_message(domain.as_str().as_bytes(), &mut buf)?;
        send_raw(&mut framed, &buf[..n]).await?;

        let transport = handshake.into_transport_mode()?;
        debug!(peer = %remote, domain = %domain, "Secure channel established (initiator)");
        Ok(SecureChannel::new(framed, transport, remote, domain.clone()))
    }

    /// Complete the responder side of a handshake and apply the accept policy.
    pub async fn accept(&self, stream: TcpStream) -> P2pResult<SecureChannel> {
        let mut framed = Framed::new(stream, FrameCodec::new());
        let mut handshake = self.builder()?.build_responder()?;
        let mut buf = vec![0u8; MAX_FRAME_SIZE];

        let msg = next_frame(&mut framed).await?;
        handshake.read_message(&msg, &mut buf)?;

        let n = handshake.write_message(&[], &mut buf)?;
        send_raw(&mut framed, &buf[..n]).await?;

        let msg = next_frame(&mut framed).await?;
        let n = handshake.read_message(&msg, &mut buf)?;
        let requested = std::str::from_utf8(&buf[..n])
            .map_err(|_| P2pError::MalformedMessage("domain is not valid UTF-8".into()))?;
        let domain = Domain::parse(requested)?;
        let remote = remote_static(&handshake)?;

        if let AuthMode::Enforce(authorizer) = &self.mode {
            if !authorizer.allows(&domain, &remote) {
                warn!(peer = %remote, domain = %domain, "Rejected channel from untrusted key");
                return Err(P2pError::PeerNotAuthorized {
                    domain: domain.to_string(),
                });
            }
        }

        let transport = handshake.into_transport_mode()?;
        debug!(peer = %remote, domain = %domain, "Secure channel established (responder)");
        Ok(SecureChannel::new(framed, transport, remote, domain))
    }

    fn builder(&self) -> P2pResult<Builder<'_>> {
        let params: NoiseParams = NOISE_PARAMS.parse()?;
        Ok(Builder::new(params).local_private_key(&self.secret))
    }
}

impl std::fmt::Debug for SecureContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureContext")
            .field("public", &self.public)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

async fn send_raw(framed: &mut Framed<TcpStream, FrameCodec>, msg: &[u8]) -> P2pResult<()> {
    framed
        .send(Bytes::copy_from_slice(msg))
        .await
        .map_err(closed_on_reset)
}

fn remote_static(handshake: &HandshakeState) -> P2pResult<EncryptionPublicKey> {
    let raw = handshake
        .get_remote_static()
        .ok_or_else(|| P2pError::Noise("peer sent no static key".into()))?;
    let bytes: [u8; 32] = raw
        .try_into()
        .map_err(|_| P2pError::Noise(format!("static key has {} bytes", raw.len())))?;
    Ok(EncryptionPublicKey::from_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust::{allow_all, TrustContext};
    use tokio::net::TcpListener;

    async fn pair() -> (TcpListener, std::net::SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    #[tokio::test]
    async fn test_pinned_channel_carries_frames() {
        let server_id = Identity::generate();
        let client_id = Identity::generate();
        let server = SecureContext::new(&server_id, AuthMode::AllowAny);
        let client = SecureContext::new(&client_id, AuthMode::AllowAny);
        let (listener, addr) = pair().await;

        let accept = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ch = server.accept(stream).await.unwrap();
            let frames = ch.recv_multipart(2).await.unwrap();
            ch.send_frame(b"pong").await.unwrap();
            (*ch.remote_public_key(), ch.domain().clone(), frames)
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let domain = Domain::parse("delegates").unwrap();
        let mut ch = client
            .connect(stream, &server_id.public_key(), &domain)
            .await
            .unwrap();
        ch.send_multipart(&[Bytes::from_static(b"ping"), Bytes::from_static(b"")])
            .await
            .unwrap();
        assert_eq!(&ch.recv_frame().await.unwrap()[..], b"pong");
        assert_eq!(ch.remote_public_key(), &server_id.public_key());

        let (seen_key, seen_domain, frames) = accept.await.unwrap();
        assert_eq!(seen_key, client_id.public_key());
        assert_eq!(seen_domain, domain);
        assert_eq!(&frames[0][..], b"ping");
        assert!(frames[1].is_empty());
    }

    #[tokio::test]
    async fn test_pinned_key_mismatch() {
        let server = SecureContext::new(&Identity::generate(), AuthMode::AllowAny);
        let client = SecureContext::new(&Identity::generate(), AuthMode::AllowAny);
        let (listener, addr) = pair().await;

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let _ = server.accept(stream).await;
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let wrong = Identity::generate().public_key();
        let err = client
            .connect(stream, &wrong, &Domain::global())
            .await
            .unwrap_err();
        assert!(matches!(err, P2pError::PeerKeyMismatch { .. }));
    }

    #[tokio::test]
    async fn test_enforce_rejects_then_accepts_after_add() {
        let server_trust = TrustContext::in_memory(Identity::generate(), allow_all()).unwrap();
        let server_id = server_trust.identity().clone();
        let server = SecureContext::new(&server_id, AuthMode::Enforce(server_trust.authorizer()));
        let client_id = Identity::generate();
        let client = SecureContext::new(&client_id, AuthMode::AllowAny);
        let (listener, addr) = pair().await;

        let accept = tokio::spawn(async move {
            let mut results = Vec::new();
            for _ in 0..2 {
                let (stream, _) = listener.accept().await.unwrap();
                results.push(server.accept(stream).await.map(|_| ()));
                // Trust the client once the first attempt has been refused.
                server_trust
                    .store()
                    .add(&client_id.public_key(), &Domain::global())
                    .unwrap();
            }
            results
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut ch = client
            .connect(stream, &server_id.public_key(), &Domain::global())
            .await
            .unwrap();
        let refused = ch.recv_frame().await.unwrap_err();
        assert!(refused.is_refusal(), "unexpected error {:?}", refused);

        let stream = TcpStream::connect(addr).await.unwrap();
        let _ch = client
            .connect(stream, &server_id.public_key(), &Domain::global())
            .await
            .unwrap();

        let results = accept.await.unwrap();
        assert!(matches!(results[0], Err(P2pError::PeerNotAuthorized { .. })));
        assert!(results[1].is_ok());
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected_locally() {
        let server = SecureContext::new(&Identity::generate(), AuthMode::AllowAny);
        let client = SecureContext::new(&Identity::generate(), AuthMode::AllowAny);
        let server_key = *server.public_key();
        let (listener, addr) = pair().await;

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let _ch = server.accept(stream).await;
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut ch = client
            .connect(stream, &server_key, &Domain::global())
            .await
            .unwrap();
        let big = vec![0u8; crate::channel::MAX_PLAINTEXT + 1];
        assert!(matches!(
            ch.send_frame(&big).await,
            Err(P2pError::MessageTooLarge { .. })
        ));
    }
}
