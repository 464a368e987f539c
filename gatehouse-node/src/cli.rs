//! Command-line argument parsing.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use gatehouse_p2p::SeedPeer;

/// Gatehouse node: identity, trust store and overlay bootstrap.
#[derive(Parser, Debug, Clone)]
#[command(name = "gatehouse-node")]
#[command(about = "Gatehouse trusted peer identity node")]
#[command(version)]
pub struct Cli {
    /// Data directory for key files and certificates.
    #[arg(long, default_value = "~/.gatehouse")]
    pub data_dir: PathBuf,

    /// Handshake listen address.
    #[arg(long, default_value = "0.0.0.0:4523")]
    pub listen: SocketAddr,

    /// Address announced to peers (defaults to the bound listen address).
    #[arg(long)]
    pub advertise: Option<SocketAddr>,

    /// Node name; selects the certificate directory.
    #[arg(long, default_value = "gatehouse")]
    pub node_name: String,

    /// Comma-separated seed nodes, each `<verifying-key>@<host:port>`.
    #[arg(long, value_delimiter = ',')]
    pub seed_nodes: Option<Vec<SeedPeer>>,

    /// Signing seed as 64 hex characters. Takes precedence over the key file.
    #[arg(long, env = "GATEHOUSE_SEED", hide_env_values = true)]
    pub seed: Option<String>,

    /// Sealed key file (defaults to `<data-dir>/identity.key`).
    #[arg(long)]
    pub keyfile: Option<PathBuf>,

    /// Password for the sealed key file.
    #[arg(long, env = "GATEHOUSE_KEY_PASSWORD", hide_env_values = true)]
    pub key_password: Option<String>,

    /// Comma-separated verifying keys accepted by the handshake validator.
    #[arg(long, value_delimiter = ',')]
    pub validators: Option<Vec<String>>,

    /// Accept every well-formed identity claim.
    #[arg(long)]
    pub allow_all: bool,

    /// Remove stored certificates on startup.
    #[arg(long)]
    pub wipe_certs: bool,

    /// Handshake reply timeout in milliseconds.
    #[arg(long, default_value_t = 1000)]
    pub auth_timeout_ms: u64,

    /// Pause before restarting a failed overlay, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    pub restart_delay_ms: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Expand the data directory path (handle ~ for home).
    pub fn expanded_data_dir(&self) -> PathBuf {
        let path_str = self.data_dir.to_string_lossy();
        if let Some(stripped) = path_str.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(stripped);
            }
        }
        self.data_dir.clone()
    }
}
