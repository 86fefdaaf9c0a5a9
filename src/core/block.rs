use crate::core::Transaction;
use crate::crypto::hash::Hash256;
use crate::mining::ProofOfWork;
use crate::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    /// `None` only for the genesis block.
    pub previous_hash: Option<Hash256>,
    pub hash: Hash256,
    pub nonce: u64,
}

impl Block {
    /// Block stamped with the current time but not yet sealed by proof of work.
    pub fn unsealed(transactions: Vec<Transaction>, previous_hash: Option<Hash256>) -> Self {
        Self {
            timestamp: Utc::now().timestamp() as u64,
            transactions,
            previous_hash,
            hash: Hash256::zero(),
            nonce: 0,
        }
    }

    /// Builds a block on top of `previous_hash` and mines it.
    pub fn new(transactions: Vec<Transaction>, previous_hash: Hash256, pow: &ProofOfWork) -> Result<Self> {
        Self::unsealed(transactions, Some(previous_hash)).seal(pow)
    }

    pub fn new_genesis(reward: Transaction, pow: &ProofOfWork) -> Result<Self> {
        Self::unsealed(vec![reward], None).seal(pow)
    }

    fn seal(mut self, pow: &ProofOfWork) -> Result<Self> {
        let (nonce, hash) = pow.run(&self)?;
        self.nonce = nonce;
        self.hash = hash;
        Ok(self)
    }

    pub fn is_genesis(&self) -> bool {
        self.previous_hash.is_none()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }
}
