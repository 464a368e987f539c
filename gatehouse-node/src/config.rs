//! Node configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use gatehouse_core::{Identity, SealedSeed};
use gatehouse_p2p::config::{DEFAULT_AUTH_TIMEOUT, DEFAULT_HANDSHAKE_PORT, DEFAULT_NODE_NAME};
use gatehouse_p2p::{P2pConfig, SeedPeer, TrustConfig};
use tracing::{info, warn};

use crate::cli::Cli;

/// File name of the sealed identity inside the data directory.
pub const KEYFILE_NAME: &str = "identity.key";

/// Where the node's signing seed comes from.
#[derive(Clone)]
pub enum IdentitySource {
    /// A seed given directly, as hex.
    Seed(String),
    /// A sealed key file. Created on first start when missing.
    KeyFile {
        /// Key file location.
        path: PathBuf,
        /// Sealing password.
        password: Option<String>,
    },
}

impl std::fmt::Debug for IdentitySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentitySource::Seed(_) => f.write_str("Seed(..)"),
            IdentitySource::KeyFile { path, password } => f
                .debug_struct("KeyFile")
                .field("path", path)
                .field("password", &password.as_ref().map(|_| ".."))
                .finish(),
        }
    }
}

/// Complete node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Data directory for key files and certificates.
    pub data_dir: PathBuf,

    /// Handshake listen address.
    pub listen_addr: SocketAddr,

    /// Address announced to peers.
    pub advertise_addr: Option<SocketAddr>,

    /// Node name.
    pub node_name: String,

    /// Seed nodes to bootstrap through.
    pub seed_peers: Vec<SeedPeer>,

    /// Identity source.
    pub identity: IdentitySource,

    /// Verifying keys accepted by the validator, in addition to the seeds.
    pub validators: Vec<String>,

    /// Accept every claim.
    pub allow_all: bool,

    /// Wipe certificates on startup.
    pub wipe_certs: bool,

    /// Handshake reply timeout.
    pub auth_timeout: Duration,

    /// Pause before restarting a failed overlay.
    pub restart_delay: Duration,

    /// Log level.
    pub log_level: String,
}

impl NodeConfig {
    /// Create a node configuration from CLI arguments.
    pub fn from_cli(cli: &Cli) -> Self {
        let data_dir = cli.expanded_data_dir();
        let identity = match &cli.seed {
            Some(seed) => IdentitySource::Seed(seed.clone()),
            None => IdentitySource::KeyFile {
                path: cli
                    .keyfile
                    .clone()
                    .unwrap_or_else(|| data_dir.join(KEYFILE_NAME)),
                password: cli.key_password.clone(),
            },
        };

        Self {
            data_dir,
            listen_addr: cli.listen,
            advertise_addr: cli.advertise,
            node_name: cli.node_name.clone(),
            seed_peers: cli.seed_nodes.clone().unwrap_or_default(),
            identity,
            validators: cli.validators.clone().unwrap_or_default(),
            allow_all: cli.allow_all,
            wipe_certs: cli.wipe_certs,
            auth_timeout: Duration::from_millis(cli.auth_timeout_ms),
            restart_delay: Duration::from_millis(cli.restart_delay_ms),
            log_level: cli.log_level.clone(),
        }
    }

    /// Build P2P configuration from node config.
    pub fn p2p_config(&self) -> P2pConfig {
        let mut config = P2pConfig::new(self.listen_addr)
            .with_node_name(self.node_name.clone())
            .with_auth_timeout(self.auth_timeout)
            .with_seed_peers(self.seed_peers.clone());
        if let Some(addr) = self.advertise_addr {
            config = config.with_advertise_addr(addr);
        }
        config
    }

    /// Trust store settings.
    pub fn trust_config(&self) -> TrustConfig {
        TrustConfig::default().with_wipe_certs(self.wipe_certs)
    }

    /// Certificate directory: `<data_dir>/certs/<node_name>`.
    pub fn certs_dir(&self) -> PathBuf {
        self.data_dir.join("certs").join(&self.node_name)
    }

    /// Load or create the node identity.
    ///
    /// A missing key file is created from a fresh seed when a password is
    /// available. Without one the identity lives only for this run.
    pub fn load_identity(&self) -> anyhow::Result<Identity> {
        match &self.identity {
            IdentitySource::Seed(hex) => {
                Identity::from_seed_hex(hex).context("invalid --seed")
            }
            IdentitySource::KeyFile { path, password } if path.exists() => {
                let Some(password) = password else {
                    bail!("key file {} needs GATEHOUSE_KEY_PASSWORD", path.display());
                };
                let sealed = SealedSeed::load(path)
                    .with_context(|| format!("reading key file {}", path.display()))?;
                let identity = sealed
                    .open_identity(password)
                    .with_context(|| format!("opening key file {}", path.display()))?;
                info!(path = %path.display(), "Loaded identity from key file");
                Ok(identity)
            }
            IdentitySource::KeyFile { path, password } => {
                let identity = Identity::generate();
                match password {
                    Some(password) => {
                        if let Some(parent) = path.parent() {
                            std::fs::create_dir_all(parent)?;
                        }
                        SealedSeed::seal(identity.seed_bytes(), password)?
                            .save(path)
                            .with_context(|| format!("writing key file {}", path.display()))?;
                        info!(path = %path.display(), "Generated new identity");
                    }
                    None => {
                        warn!("No key password set; using an ephemeral identity");
                    }
                }
                Ok(identity)
            }
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from("~/.gatehouse");
        Self {
            identity: IdentitySource::KeyFile {
                path: data_dir.join(KEYFILE_NAME),
                password: None,
            },
            data_dir,
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_HANDSHAKE_PORT)),
            advertise_addr: None,
            node_name: DEFAULT_NODE_NAME.to_string(),
            seed_peers: Vec::new(),
            validators: Vec::new(),
            allow_all: false,
            wipe_certs: false,
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
            restart_delay: Duration::from_secs(1),
            log_level: "info".to_string(),
        }
    }
}
