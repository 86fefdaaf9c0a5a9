use crate::core::Block;
use crate::crypto::hash::Hash256;
use crate::{ChainError, Result};
use num_bigint::BigUint;

/// Default difficulty: hashes must fall below 2^(256 - 10).
pub const DEFAULT_TARGET_BITS: u32 = 10;

/// Default search ceiling, matching a signed 64-bit nonce space.
pub const DEFAULT_MAX_NONCE: u64 = i64::MAX as u64;

const MAX_TARGET_BITS: u32 = 255;
const PROGRESS_INTERVAL: u64 = 100_000;

/// Fixed-difficulty proof-of-work over a block's previous hash, transactions,
/// timestamp, difficulty and nonce.
#[derive(Debug, Clone)]
pub struct ProofOfWork {
    target_bits: u32,
    target: BigUint,
    max_nonce: u64,
}

impl ProofOfWork {
    pub fn new(target_bits: u32) -> Result<Self> {
        if target_bits > MAX_TARGET_BITS {
            return Err(ChainError::InvalidDifficulty(target_bits));
        }

        let target = BigUint::from(1u8) << (256 - target_bits as usize);

        Ok(Self {
            target_bits,
            target,
            max_nonce: DEFAULT_MAX_NONCE,
        })
    }

    pub fn with_max_nonce(mut self, max_nonce: u64) -> Self {
        self.max_nonce = max_nonce;
        self
    }

    pub fn target_bits(&self) -> u32 {
        self.target_bits
    }

    pub fn target(&self) -> &BigUint {
        &self.target
    }

    pub fn max_nonce(&self) -> u64 {
        self.max_nonce
    }

    /// Everything hashed except the nonce, which is appended per attempt.
    fn prepare_prefix(&self, block: &Block) -> Result<Vec<u8>> {
        let transactions = bincode::serialize(&block.transactions)?;

        let mut data = Vec::with_capacity(32 + transactions.len() + 24);
        if let Some(previous_hash) = &block.previous_hash {
            data.extend_from_slice(previous_hash.as_bytes());
        }
        data.extend_from_slice(&transactions);
        data.extend_from_slice(&block.timestamp.to_be_bytes());
        data.extend_from_slice(&(self.target_bits as u64).to_be_bytes());
        Ok(data)
    }

    fn hash_with_nonce(buffer: &mut Vec<u8>, prefix_len: usize, nonce: u64) -> Hash256 {
        buffer.truncate(prefix_len);
        buffer.extend_from_slice(&nonce.to_be_bytes());
        Hash256::hash(buffer)
    }

    /// The digest as a big-endian unsigned integer, strictly below the target.
    pub fn meets_target(&self, hash: &Hash256) -> bool {
        BigUint::from_bytes_be(hash.as_bytes()) < self.target
    }

    /// Searches nonces from zero upward for a hash below the target.
    pub fn run(&self, block: &Block) -> Result<(u64, Hash256)> {
        let mut buffer = self.prepare_prefix(block)?;
        let prefix_len = buffer.len();

        log::debug!(
            "Mining block with {} transactions at {} target bits",
            block.transactions.len(),
            self.target_bits
        );

        for nonce in 0..self.max_nonce {
            let hash = Self::hash_with_nonce(&mut buffer, prefix_len, nonce);
            if self.meets_target(&hash) {
                log::info!("⛏️  Found nonce {} with hash {}", nonce, hash);
                return Ok((nonce, hash));
            }

            if nonce > 0 && nonce % PROGRESS_INTERVAL == 0 {
                log::debug!("Tried {} nonces, last hash {}", nonce, hash);
            }
        }

        log::error!("Proof of work exhausted after {} nonces", self.max_nonce);
        Err(ChainError::MiningExhausted {
            max_nonce: self.max_nonce,
        })
    }

    /// Recomputes the hash under the stored nonce. True only if it is below the
    /// target and equals the hash the block claims.
    pub fn validate(&self, block: &Block) -> Result<bool> {
        let mut buffer = self.prepare_prefix(block)?;
        let prefix_len = buffer.len();
        let hash = Self::hash_with_nonce(&mut buffer, prefix_len, block.nonce);

        Ok(hash == block.hash && self.meets_target(&hash))
    }
}

impl Default for ProofOfWork {
    fn default() -> Self {
        Self {
            target_bits: DEFAULT_TARGET_BITS,
            target: BigUint::from(1u8) << (256 - DEFAULT_TARGET_BITS as usize),
            max_nonce: DEFAULT_MAX_NONCE,
        }
    }
}
