//! Gatehouse key generation tool.
//!
//! Generates node seeds and shows the keys a node derives from them.
//!
//! # Usage
//!
//! ```bash
//! # Generate a seed (human-readable output)
//! gatehouse-keygen
//!
//! # Generate a seed (JSON output)
//! gatehouse-keygen --json
//!
//! # Seal a new seed into a key file for gatehouse-node
//! GATEHOUSE_KEY_PASSWORD=... gatehouse-keygen --keyfile ~/.gatehouse/identity.key
//!
//! # Show the keys of an existing seed
//! gatehouse-keygen --seed 9d61b19d...
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use gatehouse_core::{fingerprint, Identity, SealedSeed};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;

/// Gatehouse key generation tool.
#[derive(Parser, Debug)]
#[command(name = "gatehouse-keygen")]
#[command(about = "Generate node seeds for Gatehouse")]
#[command(version)]
struct Cli {
    /// Output in JSON format for machine parsing.
    #[arg(long)]
    json: bool,

    /// Describe this seed (64 hex characters) instead of generating one.
    #[arg(long)]
    seed: Option<String>,

    /// Write the seed, sealed with the password, to this key file.
    #[arg(long, requires = "password")]
    keyfile: Option<PathBuf>,

    /// Key file password.
    #[arg(long, env = "GATEHOUSE_KEY_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Overwrite an existing key file.
    #[arg(long)]
    force: bool,
}

/// JSON output format.
#[derive(Serialize, Debug, PartialEq)]
struct KeysJson {
    /// Signing seed in hex (64 characters).
    seed: String,
    /// Verifying key in hex (64 characters); the node's identity.
    verifying_key: String,
    /// Channel encryption key in hex (64 characters).
    public_key: String,
    /// SHA-256 fingerprint of the verifying key.
    fingerprint: String,
}

impl KeysJson {
    fn from_identity(identity: &Identity) -> Self {
        Self {
            seed: hex::encode(identity.seed_bytes()),
            verifying_key: identity.verifying_key_hex().to_string(),
            public_key: identity.public_key().to_hex(),
            fingerprint: fingerprint(identity.verifying_key_hex()),
        }
    }
}

fn generate_seed() -> [u8; 32] {
    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);
    seed
}

fn run(cli: &Cli) -> Result<KeysJson, String> {
    let identity = match &cli.seed {
        Some(hex) => Identity::from_seed_hex(hex).map_err(|e| format!("invalid seed: {}", e))?,
        None => Identity::derive(&generate_seed()),
    };

    if let (Some(path), Some(password)) = (&cli.keyfile, &cli.password) {
        if path.exists() && !cli.force {
            return Err(format!("{} exists; pass --force to overwrite", path.display()));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("creating {}: {}", parent.display(), e))?;
        }
        SealedSeed::seal(identity.seed_bytes(), password)
            .and_then(|sealed| sealed.save(path))
            .map_err(|e| format!("writing {}: {}", path.display(), e))?;
    }

    Ok(KeysJson::from_identity(&identity))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let keys = match run(&cli) {
        Ok(keys) => keys,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if cli.json {
        match serde_json::to_string_pretty(&keys) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("ERROR: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!("=== Gatehouse Node Keys ===");
        println!();
        println!("Verifying Key: {}", keys.verifying_key);
        println!("Public Key:    {}", keys.public_key);
        println!("Fingerprint:   {}", keys.fingerprint);
        if let Some(path) = &cli.keyfile {
            println!("Key File:      {}", path.display());
        } else {
            println!("Seed:          {}", keys.seed);
            println!();
            println!("IMPORTANT: Store your seed securely!");
            println!("           Anyone with this seed can act as your node.");
        }
    }
    ExitCode::SUCCESS
}
