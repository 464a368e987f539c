//! # Gatehouse Storage
//!
//! Small record store for peer certificates.
//!
//! Records are addressed by slash-separated keys such as
//! `authorized_keys/<hex>.key`. Two backends are provided:
//! - [`MemoryBackend`]: ordered in-memory map, for tests and ephemeral nodes
//! - [`DirectoryBackend`]: one file per record under a root directory, so
//!   each key maps to a relative path and operators can inspect or edit
//!   trusted peers by hand

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod kv;

pub use error::StorageError;
pub use kv::{validate_key, BatchOp, DirectoryBackend, KvBackend, MemoryBackend, WriteBatch};
