use crate::storage::{KvStore, KvTransaction, TransactionFn};
use crate::{ChainError, Result};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

type Map = BTreeMap<Vec<u8>, Vec<u8>>;

/// Volatile [`KvStore`]; transactions stage writes on a copy and swap it in on success.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<Map>>,
}

struct StagedTransaction {
    staged: RefCell<Map>,
}

impl KvTransaction for StagedTransaction {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.staged.borrow().get(key).cloned())
    }

    fn insert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.staged.borrow_mut().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> Result<()> {
        self.staged.borrow_mut().remove(key);
        Ok(())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw write outside any transaction, for tests that corrupt stored data.
    pub fn put_raw(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut data = self.data.write().map_err(|_| poisoned())?;
        data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }
}

fn poisoned() -> ChainError {
    ChainError::Storage("Memory store lock poisoned".to_string())
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let data = self.data.read().map_err(|_| poisoned())?;
        Ok(data.get(key).cloned())
    }

    fn entries(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let data = self.data.read().map_err(|_| poisoned())?;
        Ok(data.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    fn transaction(&self, f: &TransactionFn<'_>) -> Result<()> {
        // Holding the write lock for the whole body serializes writers.
        let mut data = self.data.write().map_err(|_| poisoned())?;
        let view = StagedTransaction {
            staged: RefCell::new(data.clone()),
        };

        f(&view as &dyn KvTransaction)?;

        *data = view.staged.into_inner();
        Ok(())
    }
}
