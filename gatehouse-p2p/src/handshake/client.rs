//! Outbound identity claims.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use gatehouse_core::{public_key_of, EncryptionPublicKey};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, trace, warn};

use crate::channel::{AuthMode, SecureContext};
use crate::config::P2pConfig;
use crate::error::{P2pError, P2pResult};
use crate::protocol::{HandshakeReply, HandshakeRequest, REPLY_FRAMES};
use crate::trust::{Domain, TrustContext};

/// Result of trying to authenticate a peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AuthOutcome {
    /// The peer proved its identity and passed validation; both sides now
    /// trust each other.
    Authorized,
    /// The peer refused us, or answered with an identity we do not accept.
    Unauthorized,
    /// The target key or domain could not be parsed.
    Invalid,
    /// Nothing came back before the deadline.
    NoReply,
}

impl AuthOutcome {
    /// Lowercase name used in logs and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthOutcome::Authorized => "authorized",
            AuthOutcome::Unauthorized => "unauthorized",
            AuthOutcome::Invalid => "invalid",
            AuthOutcome::NoReply => "no_reply",
        }
    }

    /// True only for [`AuthOutcome::Authorized`].
    pub fn is_authorized(&self) -> bool {
        matches!(self, AuthOutcome::Authorized)
    }
}

impl fmt::Display for AuthOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sends identity claims to other nodes.
pub struct HandshakeClient {
    trust: Arc<TrustContext>,
    secure: SecureContext,
    announced_addr: SocketAddr,
    auth_timeout: Duration,
    reconnect_interval: Duration,
}

impl HandshakeClient {
    /// Client claiming to be reachable at `announced_addr`.
    pub fn new(trust: Arc<TrustContext>, config: &P2pConfig, announced_addr: SocketAddr) -> Self {
        let secure = SecureContext::new(trust.identity(), AuthMode::AllowAny);
        Self {
            trust,
            secure,
            announced_addr,
            auth_timeout: config.auth_timeout,
            reconnect_interval: config.reconnect_interval,
        }
    }

    /// Address sent in our claims.
    pub fn announced_addr(&self) -> SocketAddr {
        self.announced_addr
    }

    /// Prove our identity to the node at `address` and learn whether it
    /// holds `target_public_key`.
    ///
    /// Everything from connecting to the reply is bounded by the auth
    /// timeout. Only a certificate store failure is returned as an error;
    /// every network outcome is an [`AuthOutcome`].
    pub async fn authenticate(
        &self,
        target_public_key: &str,
        address: SocketAddr,
        domain: &str,
    ) -> P2pResult<AuthOutcome> {
        let own = self.trust.identity().public_key();
        if target_public_key.eq_ignore_ascii_case(&own.to_hex()) {
            return Ok(AuthOutcome::Authorized);
        }

        let target = match EncryptionPublicKey::from_hex(target_public_key) {
            Ok(key) => key,
            Err(_) => {
                debug!(target = %target_public_key, "Refusing to authenticate malformed key");
                return Ok(AuthOutcome::Invalid);
            }
        };
        let domain = match Domain::parse(domain) {
            Ok(domain) => domain,
            Err(e) => {
                debug!(error = %e, "Refusing to authenticate into invalid domain");
                return Ok(AuthOutcome::Invalid);
            }
        };

        let reply = match timeout(self.auth_timeout, self.exchange(address, &target, &domain)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) if e.is_refusal() => {
                warn!(address = %address, error = %e, "Peer refused our identity claim");
                return Ok(AuthOutcome::Unauthorized);
            }
            Ok(Err(e)) => {
                debug!(address = %address, error = %e, "Handshake failed");
                return Ok(AuthOutcome::NoReply);
            }
            Err(_) => {
                debug!(address = %address, timeout = ?self.auth_timeout, "No handshake reply");
                return Ok(AuthOutcome::NoReply);
            }
        };

        let remote_vk = reply.verifying_key;
        if let Err(e) = self.check_identity(&remote_vk, &target) {
            warn!(
                address = %address,
                verifying_key = %remote_vk,
                error = %e,
                "Peer answered with an identity we do not accept"
            );
            return Ok(AuthOutcome::Unauthorized);
        }

        self.trust
            .register_peer(&remote_vk, &target, &address.to_string(), &domain)?;
        info!(address = %address, verifying_key = %remote_vk, domain = %domain, "Peer authorized");
        Ok(AuthOutcome::Authorized)
    }

    async fn exchange(
        &self,
        address: SocketAddr,
        target: &EncryptionPublicKey,
        domain: &Domain,
    ) -> P2pResult<HandshakeReply> {
        let stream = self.connect(address).await?;
        let mut channel = self.secure.connect(stream, target, domain).await?;

        let request = HandshakeRequest::new(
            self.trust.identity().verifying_key_hex(),
            self.announced_addr.to_string(),
            domain.as_str(),
        );
        channel.send_multipart(&request.to_frames()).await?;
        HandshakeReply::from_frames(channel.recv_multipart(REPLY_FRAMES).await?)
    }

    /// The identity a responder answered with must own the key we pinned
    /// and pass our validator.
    fn check_identity(&self, remote_vk: &str, target: &EncryptionPublicKey) -> P2pResult<()> {
        let actual = public_key_of(remote_vk)?;
        if actual != *target {
            return Err(P2pError::PeerKeyMismatch {
                expected: target.to_hex(),
                actual: actual.to_hex(),
            });
        }
        if !self.trust.validate(remote_vk) {
            return Err(P2pError::ValidationRejected);
        }
        Ok(())
    }

    /// Connect, retrying while the target refuses. The caller's deadline
    /// ends the retries.
    async fn connect(&self, address: SocketAddr) -> P2pResult<TcpStream> {
        loop {
            match TcpStream::connect(address).await {
                Ok(stream) => return Ok(stream),
                Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                    trace!(address = %address, "Connection refused, retrying");
                    sleep(self.reconnect_interval).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
