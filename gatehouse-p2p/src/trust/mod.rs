//! Trust layer.
//!
//! - [`Domain`]: named trust partitions, `*` being global
//! - [`CertificateStore`]: persistent `(domain, public key)` records
//! - [`Authorizer`]: the live view secure channels consult on accept
//! - [`Validator`] / [`ValidatorRegistry`]: who may claim an identity at all
//! - [`TrustContext`]: one node's identity plus all of the above

mod authorizer;
mod context;
mod domain;
mod store;
mod validator;

pub use authorizer::Authorizer;
pub use context::TrustContext;
pub use domain::{Domain, GLOBAL_DOMAIN, GLOBAL_SUBTREE, SELF_SUBTREE};
pub use store::{CertificateRecord, CertificateStore};
pub use validator::{allow_all, deny_all, Validator, ValidatorRegistry};
