//! Node orchestrator.
//!
//! Opens the trust store, builds the overlay and keeps it running: when an
//! overlay task fails the overlay is torn down and rebuilt on the same
//! trust state.

use std::sync::Arc;

use anyhow::Context;
use gatehouse_core::Identity;
use gatehouse_p2p::{
    allow_all, Overlay, SeedNetwork, StaticDiscovery, TrustContext, ValidatorRegistry,
};
use gatehouse_storage::{validate_key, DirectoryBackend};
use tokio::time::sleep;

use crate::config::NodeConfig;
use crate::shutdown::{shutdown_channel, wait_for_shutdown_signal, ShutdownGuard, ShutdownTx};

/// The main node structure.
pub struct Node {
    /// Node configuration.
    config: NodeConfig,

    /// Identity, certificates and authorized peers.
    trust: Arc<TrustContext>,

    /// Keys the default validator accepts.
    registry: ValidatorRegistry,

    /// Shutdown signal sender.
    shutdown_tx: ShutdownTx,
}

/// Why an overlay run ended.
enum RunEnd {
    Shutdown,
    Failed(anyhow::Error),
}

impl Node {
    /// Create a new node with the given configuration.
    pub async fn new(config: NodeConfig) -> anyhow::Result<Self> {
        let identity = config.load_identity()?;
        Self::with_identity(config, identity)
    }

    /// Create a node with an identity that is already loaded.
    pub fn with_identity(config: NodeConfig, identity: Identity) -> anyhow::Result<Self> {
        validate_key(&config.node_name)
            .with_context(|| format!("node name {:?} is not a valid directory name", config.node_name))?;

        let certs_dir = config.certs_dir();
        let backend = Arc::new(
            DirectoryBackend::open(&certs_dir)
                .with_context(|| format!("opening certificate directory {}", certs_dir.display()))?,
        );
        tracing::info!("Certificate directory: {:?}", certs_dir);

        let registry = ValidatorRegistry::from_keys(
            config
                .validators
                .iter()
                .map(String::as_str)
                .chain(config.seed_peers.iter().map(|s| s.verifying_key.as_str())),
        );
        let validator = if config.allow_all {
            tracing::warn!("Validator accepts every identity claim");
            allow_all()
        } else {
            registry.validator()
        };

        let trust = Arc::new(TrustContext::new(
            identity,
            backend,
            &config.trust_config(),
            validator,
        )?);

        let (shutdown_tx, _) = shutdown_channel();

        Ok(Self {
            config,
            trust,
            registry,
            shutdown_tx,
        })
    }

    /// Build an overlay on the node's trust state. It is not started.
    pub async fn build_overlay(&self) -> anyhow::Result<Overlay> {
        let p2p_config = self.config.p2p_config();
        let discovery = Arc::new(StaticDiscovery::from_peers(&p2p_config.seed_peers));
        let network = Arc::new(SeedNetwork::new(
            self.trust.clone(),
            p2p_config.seed_peers.clone(),
        ));
        let overlay = Overlay::new(p2p_config, self.trust.clone(), discovery, network)
            .await
            .with_context(|| format!("binding handshake listener on {}", self.config.listen_addr))?;
        Ok(overlay)
    }

    /// Run the node until a shutdown signal arrives.
    pub async fn run(&self) -> anyhow::Result<()> {
        tracing::info!("Starting Gatehouse node...");
        tracing::info!("  Node name: {}", self.config.node_name);
        tracing::info!("  Verifying key: {}", self.trust.identity().verifying_key_hex());
        tracing::info!("  Handshake address: {}", self.config.listen_addr);
        tracing::info!("  Seed nodes: {}", self.config.seed_peers.len());

        let mut guard = ShutdownGuard::new(&self.shutdown_tx);
        let mut restarts = 0u32;

        loop {
            let end = match self.build_overlay().await {
                Ok(overlay) => self.run_overlay(overlay, &mut guard).await,
                Err(e) => RunEnd::Failed(e),
            };

            match end {
                RunEnd::Shutdown => break,
                RunEnd::Failed(e) => {
                    restarts += 1;
                    tracing::error!(
                        error = %e,
                        restarts,
                        delay = ?self.config.restart_delay,
                        "Overlay failed, restarting"
                    );
                    tokio::select! {
                        _ = sleep(self.config.restart_delay) => {}
                        _ = guard.wait() => break,
                    }
                }
            }
        }

        tracing::info!("Node shutdown complete");
        Ok(())
    }

    /// Start one overlay and keep it until shutdown or failure.
    async fn run_overlay(&self, overlay: Overlay, guard: &mut ShutdownGuard) -> RunEnd {
        if let Err(e) = overlay.start() {
            return RunEnd::Failed(e.into());
        }

        let ready = overlay.ready();
        let trust = self.trust.clone();
        let announce = tokio::spawn(async move {
            ready.await;
            tracing::info!(peers = trust.authorized_nodes().len(), "Node ready");
        });

        let end = tokio::select! {
            _ = wait_for_shutdown_signal() => RunEnd::Shutdown,
            _ = guard.wait() => RunEnd::Shutdown,
            result = overlay.join() => RunEnd::Failed(match result {
                Ok(()) => anyhow::anyhow!("overlay tasks exited"),
                Err(e) => e.into(),
            }),
        };

        announce.abort();
        overlay.teardown();
        end
    }

    /// Sender that stops [`Node::run`].
    pub fn shutdown_handle(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    /// Get the trust context.
    pub fn trust(&self) -> &Arc<TrustContext> {
        &self.trust
    }

    /// Get the validator registry.
    pub fn registry(&self) -> &ValidatorRegistry {
        &self.registry
    }

    /// Get the node configuration.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdentitySource;
    use gatehouse_p2p::Domain;
    use std::time::Duration;

    fn test_config(dir: &std::path::Path) -> NodeConfig {
        NodeConfig {
            data_dir: dir.to_path_buf(),
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            identity: IdentitySource::Seed(hex::encode([3u8; 32])),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_node_writes_self_certificate() {
        let dir = tempfile::tempdir().unwrap();
        let node = Node::new(test_config(dir.path())).await.unwrap();

        let own = node.trust().identity().public_key();
        let record = dir
            .path()
            .join("certs")
            .join("gatehouse")
            .join("keys")
            .join(format!("{}.key", own.to_hex()));
        assert!(record.is_file(), "missing {}", record.display());
        let cert = node.trust().store().self_certificate().unwrap().unwrap();
        assert_eq!(cert.public_key, own);
        assert!(node.trust().authorizer().allows(&Domain::global(), &own));
    }

    #[tokio::test]
    async fn test_bad_node_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = NodeConfig {
            node_name: "../escape".into(),
            ..test_config(dir.path())
        };
        assert!(Node::new(config).await.is_err());
    }

    #[tokio::test]
    async fn test_seeds_are_trusted_validators() {
        let dir = tempfile::tempdir().unwrap();
        let seed = Identity::generate();
        let config = NodeConfig {
            seed_peers: vec![gatehouse_p2p::SeedPeer::new(
                seed.verifying_key_hex(),
                "127.0.0.1:4523".parse().unwrap(),
            )
            .unwrap()],
            validators: vec!["ab".repeat(32)],
            ..test_config(dir.path())
        };
        let node = Node::new(config).await.unwrap();

        assert!(node.trust().validate(seed.verifying_key_hex()));
        assert!(node.trust().validate(&"ab".repeat(32)));
        assert!(!node.trust().validate(Identity::generate().verifying_key_hex()));
        assert_eq!(node.registry().len(), 2);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let node = Arc::new(Node::new(test_config(dir.path())).await.unwrap());
        let shutdown = node.shutdown_handle();

        let runner = {
            let node = node.clone();
            tokio::spawn(async move { node.run().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.send(()).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), runner)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_run_retries_when_listener_is_taken() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let config = NodeConfig {
            listen_addr: blocker.local_addr().unwrap(),
            restart_delay: Duration::from_millis(20),
            ..test_config(dir.path())
        };
        let node = Arc::new(Node::new(config).await.unwrap());
        let shutdown = node.shutdown_handle();

        let runner = {
            let node = node.clone();
            tokio::spawn(async move { node.run().await })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!runner.is_finished(), "node gave up while the port was taken");

        drop(blocker);
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.send(()).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), runner)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
