//! Trust domains.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::P2pError;

/// Wire and display form of the global domain.
pub const GLOBAL_DOMAIN: &str = "*";

/// Storage subtree holding global-domain certificates.
pub const GLOBAL_SUBTREE: &str = "authorized_keys";

/// Storage subtree holding the node's own certificate.
pub const SELF_SUBTREE: &str = "keys";

const MAX_DOMAIN_LEN: usize = 64;

/// A named trust partition.
///
/// Being trusted in one domain never implies trust in another. Names are
/// `[A-Za-z0-9_.-]{1,64}` so each domain can own a storage subtree; `*`
/// is the global domain.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Domain(String);

impl Domain {
    /// The global domain.
    pub fn global() -> Self {
        Domain(GLOBAL_DOMAIN.to_string())
    }

    /// Parse a domain name.
    pub fn parse(name: &str) -> Result<Self, P2pError> {
        if name == GLOBAL_DOMAIN {
            return Ok(Self::global());
        }
        let legal = !name.is_empty()
            && name.len() <= MAX_DOMAIN_LEN
            && name != "."
            && name != ".."
            && name != GLOBAL_SUBTREE
            && name != SELF_SUBTREE
            && name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'));
        if legal {
            Ok(Domain(name.to_string()))
        } else {
            Err(P2pError::InvalidDomain(name.to_string()))
        }
    }

    /// The domain's name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for `*`.
    pub fn is_global(&self) -> bool {
        self.0 == GLOBAL_DOMAIN
    }

    /// Storage subtree this domain's certificates live under.
    pub fn subtree(&self) -> &str {
        if self.is_global() {
            GLOBAL_SUBTREE
        } else {
            &self.0
        }
    }

    /// Inverse of [`Domain::subtree`]. The self-certificate subtree maps to no domain.
    pub fn from_subtree(subtree: &str) -> Option<Self> {
        match subtree {
            GLOBAL_SUBTREE => Some(Self::global()),
            SELF_SUBTREE => None,
            other => Self::parse(other).ok(),
        }
    }
}

impl Default for Domain {
    fn default() -> Self {
        Self::global()
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Domain {
    type Err = P2pError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Domain {
    type Error = P2pError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Domain> for String {
    fn from(d: Domain) -> Self {
        d.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global() {
        let d = Domain::parse("*").unwrap();
        assert!(d.is_global());
        assert_eq!(d, Domain::default());
        assert_eq!(d.subtree(), "authorized_keys");
        assert_eq!(Domain::from_subtree("authorized_keys"), Some(d));
    }

    #[test]
    fn test_named_domain() {
        let d: Domain = "masternodes".parse().unwrap();
        assert!(!d.is_global());
        assert_eq!(d.subtree(), "masternodes");
        assert_eq!(Domain::from_subtree("masternodes"), Some(d));
        assert!(Domain::parse("sub.net-1_a").is_ok());
    }

    #[test]
    fn test_rejected_names() {
        for bad in ["", ".", "..", "a/b", "keys", "authorized_keys", "with space", "**"] {
            assert!(
                matches!(Domain::parse(bad), Err(P2pError::InvalidDomain(_))),
                "accepted {:?}",
                bad
            );
        }
        assert!(Domain::parse(&"a".repeat(65)).is_err());
        assert!(Domain::parse(&"a".repeat(64)).is_ok());
    }

    #[test]
    fn test_self_subtree_has_no_domain() {
        assert_eq!(Domain::from_subtree("keys"), None);
    }

    #[test]
    fn test_serde_as_string() {
        let d = Domain::parse("delegates").unwrap();
        assert_eq!(serde_json::to_string(&d).unwrap(), "\"delegates\"");
        let back: Domain = serde_json::from_str("\"*\"").unwrap();
        assert!(back.is_global());
        assert!(serde_json::from_str::<Domain>("\"a/b\"").is_err());
    }
}
