//! Cryptographic primitives for tinychain

pub mod hash;
pub mod keys;
pub mod signatures;

pub use hash::{Hash160, Hash256, Hashable};
pub use keys::{address_to_hash160, hash160_to_address, is_valid_address, KeyPair, PrivateKey, PublicKey};
pub use signatures::{Secp256k1Verifier, SignatureVerifier, Signer};
