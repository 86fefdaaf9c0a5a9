use crate::crypto::hash::Hash256;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChainError>;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Referenced transaction not found: {0}")]
    ReferencedTransactionNotFound(Hash256),

    #[error("Double spend detected: {0}")]
    DoubleSpend(String),

    #[error("Proof of work exhausted {max_nonce} nonces without meeting the target")]
    MiningExhausted { max_nonce: u64 },

    #[error("Invalid difficulty target: {0} bits")]
    InvalidDifficulty(u32),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChainError {
    /// Errors after which the process cannot make progress on a consistent chain.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ChainError::Storage(_)
                | ChainError::Database(_)
                | ChainError::Io(_)
                | ChainError::MiningExhausted { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(ChainError::Storage("disk gone".to_string()).is_fatal());
        assert!(ChainError::MiningExhausted { max_nonce: 10 }.is_fatal());
        assert!(!ChainError::InsufficientFunds { required: 5, available: 1 }.is_fatal());
        assert!(!ChainError::InvalidTransaction("bad".to_string()).is_fatal());
    }

    #[test]
    fn test_error_messages() {
        let err = ChainError::InsufficientFunds { required: 100, available: 3 };
        assert_eq!(err.to_string(), "Insufficient funds: required 100, available 3");

        let err = ChainError::ReferencedTransactionNotFound(Hash256::zero());
        assert!(err.to_string().ends_with(&"00".repeat(32)));
    }
}
