use crate::storage::{KvStore, KvTransaction, TransactionFn};
use crate::{ChainError, Result};
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::{Db, Tree};
use std::path::Path;

// Database tree names (equivalent to buckets)
pub const TREE_BLOCKS: &str = "blocks";
pub const TREE_CHAINSTATE: &str = "chainstate";

#[derive(Debug, Clone)]
pub struct Database {
    db: Db,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| ChainError::Storage(format!("Failed to open database: {}", e)))?;

        Ok(Self { db })
    }

    pub fn tree(&self, tree_name: &str) -> Result<SledTree> {
        let tree = self
            .db
            .open_tree(tree_name)
            .map_err(|e| ChainError::Storage(format!("Failed to open tree {}: {}", tree_name, e)))?;

        Ok(SledTree { tree })
    }

    pub fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| ChainError::Storage(format!("Failed to flush database: {}", e)))?;
        Ok(())
    }
}

/// One sled tree used as a [`KvStore`] namespace.
#[derive(Debug, Clone)]
pub struct SledTree {
    tree: Tree,
}

struct SledTransaction<'a> {
    tx: &'a TransactionalTree,
}

impl KvTransaction for SledTransaction<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let value = self
            .tx
            .get(key)
            .map_err(|e| ChainError::Storage(format!("Transactional read failed: {}", e)))?;
        Ok(value.map(|v| v.to_vec()))
    }

    fn insert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.tx
            .insert(key, value)
            .map_err(|e| ChainError::Storage(format!("Transactional write failed: {}", e)))?;
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> Result<()> {
        self.tx
            .remove(key)
            .map_err(|e| ChainError::Storage(format!("Transactional delete failed: {}", e)))?;
        Ok(())
    }
}

impl KvStore for SledTree {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let value = self
            .tree
            .get(key)
            .map_err(|e| ChainError::Storage(format!("Failed to read key: {}", e)))?;
        Ok(value.map(|v| v.to_vec()))
    }

    fn entries(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut entries = Vec::new();
        for item in self.tree.iter() {
            let (key, value) = item?;
            entries.push((key.to_vec(), value.to_vec()));
        }
        Ok(entries)
    }

    fn transaction(&self, f: &TransactionFn<'_>) -> Result<()> {
        self.tree
            .transaction(|tx| {
                let view: &dyn KvTransaction = &SledTransaction { tx };
                f(view).map_err(ConflictableTransactionError::Abort)
            })
            .map_err(|e| match e {
                TransactionError::Abort(err) => err,
                TransactionError::Storage(err) => ChainError::Database(err),
            })?;

        log::debug!("💾 Committed transaction");
        Ok(())
    }
}
