use crate::core::{Blockchain, Transaction, UtxoSet};
use crate::crypto::keys::KeyPair;
use crate::mining::ProofOfWork;
use crate::storage::{KvStore, MemoryStore};
use crate::Result;
use std::sync::Arc;

/// Low enough that every test block seals within a few hundred attempts.
pub const TEST_TARGET_BITS: u32 = 4;

/// In-memory chain whose genesis pays `subsidy` to the returned key pair,
/// with a freshly rebuilt index.
pub fn memory_chain(subsidy: u64) -> Result<(Blockchain, KeyPair, UtxoSet)> {
    let owner = KeyPair::new()?;
    let reward = Transaction::new_reward(owner.public_key.hash160(), "genesis", subsidy);

    let blocks: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let chain = Blockchain::open(blocks, ProofOfWork::new(TEST_TARGET_BITS)?, Some(reward))?;

    let utxo = UtxoSet::new(Arc::new(MemoryStore::new()));
    utxo.rebuild(&chain)?;

    Ok((chain, owner, utxo))
}
