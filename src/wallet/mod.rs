//! Local key storage for the CLI

pub mod wallet;

pub use wallet::{WalletEntry, Wallets};
