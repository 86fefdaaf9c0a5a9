//! Proof-of-work mining for tinychain

pub mod pow;

pub use pow::{ProofOfWork, DEFAULT_MAX_NONCE, DEFAULT_TARGET_BITS};
