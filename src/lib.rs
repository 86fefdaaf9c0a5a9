//! tinychain - a single-node proof-of-work UTXO ledger
//!
//! Blocks of signed transactions are sealed by a fixed-difficulty SHA-256
//! proof of work and persisted in a key-value store, with a derived index of
//! unspent outputs for balance queries and coin selection.

pub mod cli;
pub mod config;
pub mod core;
pub mod crypto;
pub mod error;
pub mod mining;
pub mod storage;
pub mod wallet;

pub use error::{ChainError, Result};
