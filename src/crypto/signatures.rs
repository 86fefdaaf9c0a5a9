//! Signing seam of the ledger.
//!
//! Transactions are signed and verified over 32-byte digests only, so the curve
//! behind [`Signer`] and [`SignatureVerifier`] can be swapped without touching
//! the transaction model.

use crate::crypto::hash::Hash256;
use crate::{ChainError, Result};
use secp256k1::{ecdsa::Signature as Secp256k1Signature, Message, PublicKey as Secp256k1PublicKey, Secp256k1};

/// Length of a compact (r || s) secp256k1 signature.
pub const COMPACT_SIGNATURE_LEN: usize = 64;

/// Holder of a private key able to sign digests.
pub trait Signer {
    /// Serialized public key that verifiers will be handed alongside the signature.
    fn public_key_bytes(&self) -> Vec<u8>;

    fn sign_digest(&self, digest: &Hash256) -> Result<Vec<u8>>;
}

/// Checks signatures produced by a matching [`Signer`].
pub trait SignatureVerifier {
    /// Returns `false` for malformed keys or signatures rather than erroring.
    fn verify_digest(&self, public_key: &[u8], digest: &Hash256, signature: &[u8]) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Secp256k1Verifier;

impl SignatureVerifier for Secp256k1Verifier {
    fn verify_digest(&self, public_key: &[u8], digest: &Hash256, signature: &[u8]) -> bool {
        let Ok(public_key) = Secp256k1PublicKey::from_slice(public_key) else {
            return false;
        };
        let Ok(signature) = Secp256k1Signature::from_compact(signature) else {
            return false;
        };
        let Ok(message) = Message::from_digest_slice(digest.as_bytes()) else {
            return false;
        };

        let secp = Secp256k1::verification_only();
        secp.verify_ecdsa(&message, &signature, &public_key).is_ok()
    }
}

pub(crate) fn digest_message(digest: &Hash256) -> Result<Message> {
    Message::from_digest_slice(digest.as_bytes())
        .map_err(|e| ChainError::Crypto(format!("Invalid message: {}", e)))
}
