//! Inbound identity claims.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use gatehouse_core::public_key_of;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::channel::{AuthMode, SecureChannel, SecureContext};
use crate::config::P2pConfig;
use crate::error::{P2pError, P2pResult};
use crate::protocol::{HandshakeReply, HandshakeRequest, REQUEST_FRAMES};
use crate::trust::{Domain, TrustContext};

/// What became of one inbound exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Exchange {
    /// The claim was validated, recorded and answered.
    Accepted {
        /// Claimant's verifying key.
        verifying_key: String,
    },
    /// The claim was refused; the channel was closed without a reply.
    Rejected,
}

/// Answers identity claims, one at a time.
///
/// Each accepted connection is taken through a secure accept, a three-frame
/// request and either a one-frame reply or a silent close before the next
/// connection is accepted. A peer that has not delivered its whole claim
/// within the exchange timeout is cut off. Once a claim is recorded the
/// reply is always sent.
pub struct HandshakeServer {
    listener: TcpListener,
    trust: Arc<TrustContext>,
    secure: SecureContext,
    exchange_timeout: Duration,
}

impl HandshakeServer {
    /// Bind the listener on `config.bind_addr`.
    pub async fn bind(trust: Arc<TrustContext>, config: &P2pConfig) -> P2pResult<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let secure = SecureContext::new(trust.identity(), AuthMode::AllowAny);
        Ok(Self {
            listener,
            trust,
            secure,
            exchange_timeout: config.exchange_timeout,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> P2pResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the listener or the certificate store fails.
    ///
    /// Problems confined to one connection are logged and that exchange is
    /// dropped. The listener is released when this returns.
    pub async fn serve(self) -> P2pResult<()> {
        let addr = self.local_addr()?;
        info!(addr = %addr, "Handshake server listening");

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(addr = %addr, error = %e, "Handshake listener failed");
                    return Err(e.into());
                }
            };

            match self.exchange(stream).await {
                Ok(Exchange::Accepted { verifying_key }) => {
                    info!(peer = %peer, verifying_key = %verifying_key, "Peer authorized");
                }
                Ok(Exchange::Rejected) => {}
                Err(e) if e.is_fatal() => {
                    error!(peer = %peer, error = %e, "Handshake server stopping");
                    return Err(e);
                }
                Err(e) => {
                    debug!(peer = %peer, error = %e, "Handshake exchange dropped");
                }
            }
        }
    }

    /// Run one exchange on an accepted connection.
    pub async fn exchange(&self, stream: TcpStream) -> P2pResult<Exchange> {
        let (mut channel, request) = timeout(self.exchange_timeout, self.receive(stream))
            .await
            .map_err(|_| {
                P2pError::Io(io::Error::new(io::ErrorKind::TimedOut, "identity claim not received in time"))
            })??;
        let claimed = request.verifying_key.as_str();

        if !self.trust.validate(claimed) {
            warn!(
                address = %request.address,
                verifying_key = %claimed,
                "Unauthorized identity claim"
            );
            return Ok(Exchange::Rejected);
        }

        let public_key = match public_key_of(claimed) {
            Ok(pk) => pk,
            Err(e) => {
                warn!(verifying_key = %claimed, error = %e, "Malformed identity claim");
                return Ok(Exchange::Rejected);
            }
        };
        if public_key != *channel.remote_public_key() {
            warn!(
                verifying_key = %claimed,
                channel_key = %channel.remote_public_key(),
                "Claimed identity does not own the channel key"
            );
            return Ok(Exchange::Rejected);
        }

        let domain = match Domain::parse(&request.domain) {
            Ok(domain) => domain,
            Err(e) => {
                warn!(error = %e, "Identity claim for an invalid domain");
                return Ok(Exchange::Rejected);
            }
        };

        self.trust
            .register_peer(claimed, &public_key, &request.address, &domain)?;

        let reply = HandshakeReply::new(self.trust.identity().verifying_key_hex());
        channel.send_frame(&reply.to_frame()).await?;
        if let Err(e) = channel.close().await {
            debug!(error = %e, "Peer left before the reply was flushed");
        }

        Ok(Exchange::Accepted {
            verifying_key: claimed.to_ascii_lowercase(),
        })
    }

    async fn receive(&self, stream: TcpStream) -> P2pResult<(SecureChannel, HandshakeRequest)> {
        let mut channel = self.secure.accept(stream).await?;
        let request = HandshakeRequest::from_frames(channel.recv_multipart(REQUEST_FRAMES).await?)?;
        Ok((channel, request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::HandshakeRequest;
    use crate::trust::{allow_all, deny_all};
    use crate::config::TrustConfig;
    use gatehouse_core::{fingerprint, Identity};
    use gatehouse_storage::{KvBackend, MemoryBackend, StorageError, WriteBatch};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// Memory backend whose writes start failing once `broken` is set.
    #[derive(Default)]
    struct FailingWrites {
        inner: MemoryBackend,
        broken: AtomicBool,
    }

    impl FailingWrites {
        fn check(&self) -> Result<(), StorageError> {
            if self.broken.load(Ordering::SeqCst) {
                Err(StorageError::Io(io::Error::new(io::ErrorKind::Other, "disk full")))
            } else {
                Ok(())
            }
        }
    }

    impl KvBackend for FailingWrites {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
            self.inner.get(key)
        }

        fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
            self.check()?;
            self.inner.put(key, value)
        }

        fn delete(&self, key: &str) -> Result<(), StorageError> {
            self.check()?;
            self.inner.delete(key)
        }

        fn write_batch(&self, batch: WriteBatch) -> Result<(), StorageError> {
            self.check()?;
            self.inner.write_batch(batch)
        }

        fn list(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
            self.inner.list(prefix)
        }
    }

    async fn server(validator: crate::trust::Validator) -> (Arc<TrustContext>, HandshakeServer) {
        let trust = Arc::new(TrustContext::in_memory(Identity::generate(), validator).unwrap());
        let config = P2pConfig::new("127.0.0.1:0".parse().unwrap());
        let server = HandshakeServer::bind(trust.clone(), &config).await.unwrap();
        (trust, server)
    }

    async fn claim(
        server_key: gatehouse_core::EncryptionPublicKey,
        addr: SocketAddr,
        who: &Identity,
        claimed_vk: &str,
    ) -> P2pResult<bytes::BytesMut> {
        let ctx = SecureContext::new(who, AuthMode::AllowAny);
        let stream = TcpStream::connect(addr).await?;
        let mut ch = ctx.connect(stream, &server_key, &Domain::global()).await?;
        let req = HandshakeRequest::new(claimed_vk, "127.0.0.1:7000", "*");
        ch.send_multipart(&req.to_frames()).await?;
        ch.recv_frame().await
    }

    #[tokio::test]
    async fn test_exchange_accepts_valid_claim() {
        let (trust, server) = server(allow_all()).await;
        let addr = server.local_addr().unwrap();
        let server_key = trust.identity().public_key();
        let client = Identity::generate();
        let vk = client.verifying_key_hex().to_string();

        let (reply, outcome) = tokio::join!(claim(server_key, addr, &client, &vk), async {
            let (stream, _) = server.listener.accept().await.unwrap();
            server.exchange(stream).await.unwrap()
        });

        assert_eq!(&reply.unwrap()[..], trust.identity().verifying_key_hex().as_bytes());
        assert_eq!(outcome, Exchange::Accepted { verifying_key: vk.clone() });
        assert_eq!(
            trust.authorized_nodes().get(&fingerprint(&vk)).map(String::as_str),
            Some("127.0.0.1:7000")
        );
        assert!(trust
            .store()
            .contains(&client.public_key(), &Domain::global())
            .unwrap());
    }

    #[tokio::test]
    async fn test_exchange_drops_rejected_claim() {
        let (trust, server) = server(deny_all()).await;
        let addr = server.local_addr().unwrap();
        let server_key = trust.identity().public_key();
        let client = Identity::generate();
        let vk = client.verifying_key_hex().to_string();

        let (reply, outcome) = tokio::join!(claim(server_key, addr, &client, &vk), async {
            let (stream, _) = server.listener.accept().await.unwrap();
            server.exchange(stream).await.unwrap()
        });

        assert!(matches!(reply, Err(P2pError::ConnectionClosed)));
        assert_eq!(outcome, Exchange::Rejected);
        assert!(trust.authorized_nodes().is_empty());
        assert!(trust.store().list(&Domain::global()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exchange_rejects_borrowed_identity() {
        let (trust, server) = server(allow_all()).await;
        let addr = server.local_addr().unwrap();
        let server_key = trust.identity().public_key();
        let impostor = Identity::generate();
        let victim = Identity::generate();

        let (reply, outcome) = tokio::join!(
            claim(server_key, addr, &impostor, victim.verifying_key_hex()),
            async {
                let (stream, _) = server.listener.accept().await.unwrap();
                server.exchange(stream).await.unwrap()
            }
        );

        assert!(reply.is_err());
        assert_eq!(outcome, Exchange::Rejected);
        assert!(trust.authorized_nodes().is_empty());
    }

    #[tokio::test]
    async fn test_serve_survives_bad_peer() {
        let (trust, server) = server(allow_all()).await;
        let addr = server.local_addr().unwrap();
        let server_key = trust.identity().public_key();
        let handle = tokio::spawn(server.serve());

        // Garbage instead of a Noise handshake.
        {
            use tokio::io::AsyncWriteExt;
            let mut raw = TcpStream::connect(addr).await.unwrap();
            raw.write_all(b"definitely not a frame").await.unwrap();
        }

        let client = Identity::generate();
        let reply = claim(server_key, addr, &client, client.verifying_key_hex()).await;
        assert!(reply.is_ok());
        assert!(!handle.is_finished());
        handle.abort();
    }

    #[tokio::test]
    async fn test_store_failure_stops_server() {
        let backend = Arc::new(FailingWrites::default());
        let trust = Arc::new(
            TrustContext::new(Identity::generate(), backend.clone(), &TrustConfig::default(), allow_all())
                .unwrap(),
        );
        let config = P2pConfig::new("127.0.0.1:0".parse().unwrap());
        let server = HandshakeServer::bind(trust.clone(), &config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let handle = tokio::spawn(server.serve());
        backend.broken.store(true, Ordering::SeqCst);

        let client = Identity::generate();
        let reply = claim(trust.identity().public_key(), addr, &client, client.verifying_key_hex()).await;
        assert!(reply.is_err());

        let ended = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(ended, Err(P2pError::Storage(_))));
        assert!(TcpListener::bind(addr).await.is_ok(), "listener on {} was not released", addr);
    }

    #[tokio::test]
    async fn test_reply_sent_after_claim_recorded() {
        let trust = Arc::new(TrustContext::in_memory(Identity::generate(), allow_all()).unwrap());
        let config = P2pConfig::new("127.0.0.1:0".parse().unwrap())
            .with_exchange_timeout(Duration::from_millis(200));
        let server = HandshakeServer::bind(trust.clone(), &config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let server_key = trust.identity().public_key();
        let client = Identity::generate();
        let vk = client.verifying_key_hex().to_string();

        // The claim arrives inside the deadline; the client reads the reply
        // only after the deadline has passed.
        let (reply, outcome) = tokio::join!(
            async {
                let ctx = SecureContext::new(&client, AuthMode::AllowAny);
                let stream = TcpStream::connect(addr).await.unwrap();
                let mut ch = ctx.connect(stream, &server_key, &Domain::global()).await.unwrap();
                ch.send_multipart(&HandshakeRequest::new(&vk, "127.0.0.1:7000", "*").to_frames())
                    .await
                    .unwrap();
                tokio::time::sleep(Duration::from_millis(400)).await;
                ch.recv_frame().await
            },
            async {
                let (stream, _) = server.listener.accept().await.unwrap();
                server.exchange(stream).await
            }
        );

        assert!(matches!(outcome, Ok(Exchange::Accepted { .. })));
        assert_eq!(&reply.unwrap()[..], trust.identity().verifying_key_hex().as_bytes());
    }

    #[tokio::test]
    async fn test_stalled_claim_is_cut_off() {
        let trust = Arc::new(TrustContext::in_memory(Identity::generate(), allow_all()).unwrap());
        let config = P2pConfig::new("127.0.0.1:0".parse().unwrap())
            .with_exchange_timeout(Duration::from_millis(200));
        let server = HandshakeServer::bind(trust.clone(), &config).await.unwrap();
        let addr = server.local_addr().unwrap();

        let _silent = TcpStream::connect(addr).await.unwrap();
        let (stream, _) = server.listener.accept().await.unwrap();
        let err = server.exchange(stream).await.unwrap_err();
        assert!(!err.is_fatal());
        assert!(trust.authorized_nodes().is_empty());
    }
}
