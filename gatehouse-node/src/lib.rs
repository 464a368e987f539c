//! Gatehouse node library.
//!
//! This library provides the components for building and running a
//! Gatehouse node. It is used by the `gatehouse-node` binary and can also be
//! used for testing and embedding.

pub mod cli;
pub mod config;
pub mod node;
pub mod shutdown;
