use crate::crypto::hash::{Hash160, Hash256};
use crate::crypto::signatures::{digest_message, Signer};
use crate::{ChainError, Result};
use rand::{rngs::OsRng, RngCore};
use secp256k1::{PublicKey as Secp256k1PublicKey, Secp256k1, SecretKey};
use std::fmt;

/// Version byte prefixed to the public-key hash in an address.
const ADDRESS_VERSION: u8 = 0x00;
const CHECKSUM_LEN: usize = 4;

#[derive(Clone)]
pub struct PrivateKey {
    key: SecretKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    key: Vec<u8>, // Compressed SEC1 encoding
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub private_key: PrivateKey,
    pub public_key: PublicKey,
}

impl PrivateKey {
    pub fn new() -> Result<Self> {
        let mut rng = OsRng;
        let mut secret_bytes = [0u8; 32];
        rng.fill_bytes(&mut secret_bytes);

        let secret_key = SecretKey::from_slice(&secret_bytes)
            .map_err(|e| ChainError::Crypto(format!("Failed to create private key: {}", e)))?;

        Ok(Self { key: secret_key })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(ChainError::Crypto("Private key must be 32 bytes".to_string()));
        }

        let secret_key = SecretKey::from_slice(bytes)
            .map_err(|e| ChainError::Crypto(format!("Invalid private key: {}", e)))?;

        Ok(Self { key: secret_key })
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| ChainError::Crypto(format!("Invalid private key hex: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.key.secret_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn public_key(&self) -> PublicKey {
        let secp = Secp256k1::signing_only();
        let public_key = Secp256k1PublicKey::from_secret_key(&secp, &self.key);

        PublicKey {
            key: public_key.serialize().to_vec(),
        }
    }
}

impl Signer for PrivateKey {
    fn public_key_bytes(&self) -> Vec<u8> {
        self.public_key().key
    }

    fn sign_digest(&self, digest: &Hash256) -> Result<Vec<u8>> {
        let secp = Secp256k1::signing_only();
        let message = digest_message(digest)?;

        let signature = secp.sign_ecdsa(&message, &self.key);
        Ok(signature.serialize_compact().to_vec())
    }
}

// Never print secret material through Debug.
impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey").finish_non_exhaustive()
    }
}

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 33 && bytes.len() != 65 {
            return Err(ChainError::Crypto("Invalid public key length".to_string()));
        }

        let _ = Secp256k1PublicKey::from_slice(bytes)
            .map_err(|e| ChainError::Crypto(format!("Invalid public key: {}", e)))?;

        Ok(Self {
            key: bytes.to_vec(),
        })
    }

    pub fn to_bytes(&self) -> &[u8] {
        &self.key
    }

    pub fn hash160(&self) -> Hash160 {
        Hash160::hash_sha256(&self.key)
    }

    pub fn to_address(&self) -> String {
        hash160_to_address(&self.hash160())
    }
}

impl KeyPair {
    pub fn new() -> Result<Self> {
        let private_key = PrivateKey::new()?;
        Ok(Self::from_private_key(private_key))
    }

    pub fn from_private_key(private_key: PrivateKey) -> Self {
        let public_key = private_key.public_key();

        Self {
            private_key,
            public_key,
        }
    }

    pub fn address(&self) -> String {
        self.public_key.to_address()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.key))
    }
}

/// Base58Check: version || hash160 || first 4 bytes of double SHA-256.
pub fn hash160_to_address(hash160: &Hash160) -> String {
    let mut data = Vec::with_capacity(1 + 20 + CHECKSUM_LEN);
    data.push(ADDRESS_VERSION);
    data.extend_from_slice(hash160.as_bytes());

    let checksum = Hash256::double_hash(&data);
    data.extend_from_slice(&checksum.as_bytes()[0..CHECKSUM_LEN]);

    bs58::encode(data).into_string()
}

pub fn address_to_hash160(address: &str) -> Result<Hash160> {
    let decoded = bs58::decode(address)
        .into_vec()
        .map_err(|e| ChainError::InvalidInput(format!("Invalid address format: {}", e)))?;

    if decoded.len() != 1 + 20 + CHECKSUM_LEN || decoded[0] != ADDRESS_VERSION {
        return Err(ChainError::InvalidInput(format!("Invalid address: {}", address)));
    }

    let (data, checksum) = decoded.split_at(1 + 20);
    let hash = Hash256::double_hash(data);

    if &hash.as_bytes()[0..CHECKSUM_LEN] != checksum {
        return Err(ChainError::InvalidInput(format!("Invalid address checksum: {}", address)));
    }

    let mut hash160_bytes = [0u8; 20];
    hash160_bytes.copy_from_slice(&data[1..]);

    Ok(Hash160::new(hash160_bytes))
}

pub fn is_valid_address(address: &str) -> bool {
    address_to_hash160(address).is_ok()
}
