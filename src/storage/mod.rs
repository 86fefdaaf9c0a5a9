//! Key-value storage behind the ledger.
//!
//! The ledger only needs point reads, a full scan, and atomic multi-key
//! writes. Anything offering those can back a chain.

pub mod database;
pub mod memory;

pub use database::{Database, SledTree, TREE_BLOCKS, TREE_CHAINSTATE};
pub use memory::MemoryStore;

use crate::Result;

/// View of the store inside one atomic transaction.
pub trait KvTransaction {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn insert(&self, key: &[u8], value: &[u8]) -> Result<()>;
    fn remove(&self, key: &[u8]) -> Result<()>;
}

/// Body of an atomic transaction. Backends may run it more than once on
/// conflict, so it must not have side effects outside the transaction view.
pub type TransactionFn<'a> = dyn Fn(&dyn KvTransaction) -> Result<()> + 'a;

pub trait KvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Every key/value pair in key order.
    fn entries(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Runs `f` atomically: either every write it made becomes visible or none does.
    fn transaction(&self, f: &TransactionFn<'_>) -> Result<()>;
}
