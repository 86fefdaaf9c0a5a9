//! Core ledger components

pub mod block;
pub mod blockchain;
pub mod iterator;
pub mod transaction;
pub mod utxo;

#[cfg(test)]
pub(crate) mod testutil;

pub use block::Block;
pub use blockchain::Blockchain;
pub use iterator::ChainIterator;
pub use transaction::{OutPoint, Transaction, TransactionResolver, TxInput, TxOutput};
pub use utxo::{UtxoEntry, UtxoSet};
