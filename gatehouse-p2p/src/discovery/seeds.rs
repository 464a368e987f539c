//! Seed peer configuration.
//!
//! A seed is written `<verifying-key-hex>@<host:port>`, naming both who the
//! seed is and where its handshake listener runs:
//!
//! ```text
//! 3d4017c3e843895a92b70aa74d1b7ebc9c982ccf2ec4968cc0cd55f12af4660c@10.0.0.2:4523
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use gatehouse_core::{public_key_of, EncryptionPublicKey};

use crate::error::P2pError;

/// A bootstrap peer: its identity and handshake address.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SeedPeer {
    /// Seed's verifying key, lowercase hex.
    pub verifying_key: String,
    /// Seed's handshake listener.
    pub addr: SocketAddr,
}

impl SeedPeer {
    /// Build a seed, checking that the verifying key is well formed.
    pub fn new(verifying_key: &str, addr: SocketAddr) -> Result<Self, P2pError> {
        public_key_of(verifying_key)?;
        Ok(Self {
            verifying_key: verifying_key.to_ascii_lowercase(),
            addr,
        })
    }

    /// Encryption key the seed will present on a secure channel.
    pub fn public_key(&self) -> Result<EncryptionPublicKey, P2pError> {
        Ok(public_key_of(&self.verifying_key)?)
    }
}

impl FromStr for SeedPeer {
    type Err = P2pError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (vk, addr) = s
            .trim()
            .split_once('@')
            .ok_or_else(|| P2pError::MalformedMessage(format!("seed {:?} is not vk@host:port", s)))?;
        let addr = addr
            .parse()
            .map_err(|_| P2pError::MalformedMessage(format!("seed address {:?} is not host:port", addr)))?;
        Self::new(vk, addr)
    }
}

impl fmt::Display for SeedPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.verifying_key, self.addr)
    }
}

/// Parse a comma-separated seed list. Blank entries are skipped.
pub fn parse_seed_list(list: &str) -> Result<Vec<SeedPeer>, P2pError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_core::Identity;

    #[test]
    fn test_parse_seed() {
        let id = Identity::generate();
        let text = format!("{}@127.0.0.1:4523", id.verifying_key_hex().to_ascii_uppercase());
        let seed: SeedPeer = text.parse().unwrap();

        assert_eq!(seed.verifying_key, id.verifying_key_hex());
        assert_eq!(seed.addr.port(), 4523);
        assert_eq!(seed.public_key().unwrap(), id.public_key());
        assert_eq!(seed.to_string().parse::<SeedPeer>().unwrap(), seed);
    }

    #[test]
    fn test_parse_seed_errors() {
        let vk = Identity::generate().verifying_key_hex().to_string();
        assert!("no-at-sign".parse::<SeedPeer>().is_err());
        assert!(format!("{}@not-an-addr", vk).parse::<SeedPeer>().is_err());
        assert!(matches!(
            "zz@127.0.0.1:1".parse::<SeedPeer>(),
            Err(P2pError::MalformedKey(_))
        ));
    }

    #[test]
    fn test_parse_seed_list() {
        let a = Identity::generate();
        let b = Identity::generate();
        let list = format!(
            "{}@10.0.0.1:4523, ,{}@10.0.0.2:4523",
            a.verifying_key_hex(),
            b.verifying_key_hex()
        );
        let seeds = parse_seed_list(&list).unwrap();
        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[1].verifying_key, b.verifying_key_hex());
        assert!(parse_seed_list("").unwrap().is_empty());
    }
}
