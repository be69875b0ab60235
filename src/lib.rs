//! Local harness for Circle's Cross-Chain Transfer Protocol V2.
//!
//! Compiles the CCTP contracts with solc, deploys them to two simulated
//! chains, stands in for the attestation service and drives USDC from
//! one domain to the other and back.

pub mod accounts;
pub mod attester;
pub mod chain;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod contracts;
pub mod precompute;
pub mod scenario;

pub use config::setup_tracing;
