use crate::core::iterator::ChainIterator;
use crate::core::transaction::TransactionResolver;
use crate::core::{Block, OutPoint, Transaction};
use crate::crypto::hash::Hash256;
use crate::crypto::signatures::{Secp256k1Verifier, SignatureVerifier, Signer};
use crate::mining::ProofOfWork;
use crate::storage::KvStore;
use crate::{ChainError, Result};
use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Reserved key in the blocks namespace holding the tip hash.
pub const LAST_KEY: &[u8] = b"last";

/// The single authoritative chain: blocks keyed by hash plus the tip pointer.
pub struct Blockchain {
    tip: Hash256,
    store: Arc<dyn KvStore>,
    pow: ProofOfWork,
    verifier: Box<dyn SignatureVerifier>,
}

#[derive(Default)]
struct ChainScan {
    prev_txs: HashMap<Hash256, Transaction>,
    spent: HashSet<OutPoint>,
    ids: HashSet<Hash256>,
}

fn decode_hash(bytes: &[u8]) -> Result<Hash256> {
    Hash256::from_slice(bytes)
        .ok_or_else(|| ChainError::Storage(format!("Invalid tip hash length: {}", bytes.len())))
}

impl Blockchain {
    /// Loads the chain held by `store`, or creates it from `genesis` if the
    /// store is empty. Opening an empty store without a genesis reward fails.
    pub fn open(store: Arc<dyn KvStore>, pow: ProofOfWork, genesis: Option<Transaction>) -> Result<Self> {
        let tip = match store.get(LAST_KEY)? {
            Some(bytes) => decode_hash(&bytes)?,
            None => {
                let reward = genesis.ok_or_else(|| {
                    ChainError::InvalidInput("No existing blockchain found. Create one first.".to_string())
                })?;
                if !reward.is_reward() {
                    return Err(ChainError::InvalidTransaction(
                        "Genesis block must hold a reward transaction".to_string(),
                    ));
                }

                let genesis_block = Block::new_genesis(reward, &pow)?;
                let encoded = genesis_block.serialize()?;
                let tip = Cell::new(genesis_block.hash);

                // Another writer may have created a chain while we were mining
                store.transaction(&|tx| match tx.get(LAST_KEY)? {
                    Some(existing) => {
                        tip.set(decode_hash(&existing)?);
                        Ok(())
                    }
                    None => {
                        tx.insert(genesis_block.hash.as_bytes(), &encoded)?;
                        tx.insert(LAST_KEY, genesis_block.hash.as_bytes())?;
                        tip.set(genesis_block.hash);
                        Ok(())
                    }
                })?;

                if tip.get() == genesis_block.hash {
                    log::info!("🌱 Created genesis block {}", genesis_block.hash);
                }
                tip.get()
            }
        };

        let chain = Self {
            tip,
            store,
            pow,
            verifier: Box::new(Secp256k1Verifier),
        };

        if chain.resolve_block(&tip)?.is_none() {
            return Err(ChainError::Storage(format!("Tip {} points at a missing block", tip)));
        }

        log::debug!("Opened chain at tip {}", tip);
        Ok(chain)
    }

    pub fn with_verifier(mut self, verifier: Box<dyn SignatureVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn tip(&self) -> Hash256 {
        self.tip
    }

    pub fn proof_of_work(&self) -> &ProofOfWork {
        &self.pow
    }

    pub fn resolve_block(&self, hash: &Hash256) -> Result<Option<Block>> {
        match self.store.get(hash.as_bytes())? {
            Some(data) => Ok(Some(Block::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    /// Newest-to-oldest traversal starting at the current tip.
    pub fn iter(&self) -> ChainIterator<'_> {
        ChainIterator::new(self, self.tip)
    }

    /// Number of blocks, genesis included.
    pub fn len(&self) -> Result<usize> {
        let mut count = 0;
        for block in self.iter() {
            block?;
            count += 1;
        }
        Ok(count)
    }

    /// Height of the tip; the genesis block is at height zero.
    pub fn height(&self) -> Result<u64> {
        Ok(self.len()?.saturating_sub(1) as u64)
    }

    /// Validates, mines and persists `transactions` as the new tip.
    ///
    /// The batch is all-or-nothing: if any transaction fails validation, or
    /// mining or storage fails, nothing is written and the tip is unchanged.
    pub fn append(&mut self, transactions: Vec<Transaction>) -> Result<Block> {
        if transactions.is_empty() {
            return Err(ChainError::InvalidTransaction("Block must contain at least one transaction".to_string()));
        }

        self.validate_batch(&transactions)?;

        let block = Block::new(transactions, self.tip, &self.pow)?;
        let encoded = block.serialize()?;
        let expected_tip = self.tip;

        self.store.transaction(&|tx| {
            let current = tx.get(LAST_KEY)?;
            if current.as_deref() != Some(expected_tip.as_bytes().as_slice()) {
                return Err(ChainError::Storage("Tip moved during append".to_string()));
            }
            tx.insert(block.hash.as_bytes(), &encoded)?;
            tx.insert(LAST_KEY, block.hash.as_bytes())
        })?;

        self.tip = block.hash;
        log::info!(
            "✅ Block {} added with {} transactions",
            block.hash,
            block.transactions.len()
        );
        Ok(block)
    }

    fn validate_batch(&self, transactions: &[Transaction]) -> Result<()> {
        let mut batch_ids = HashSet::new();
        let mut batch_spent = HashSet::new();
        let mut needed = HashSet::new();

        for tx in transactions {
            if !batch_ids.insert(tx.id) {
                return Err(ChainError::InvalidTransaction(format!("Duplicate transaction {} in batch", tx.id)));
            }
            if tx.is_reward() {
                continue;
            }
            for input in &tx.inputs {
                if !batch_spent.insert(input.previous_output) {
                    return Err(ChainError::DoubleSpend(format!(
                        "{} spent twice in one block",
                        input.previous_output
                    )));
                }
                needed.insert(input.previous_output.txid);
            }
        }

        let ChainScan {
            prev_txs,
            spent: chain_spent,
            ids: chain_ids,
        } = self.scan_chain(&needed)?;

        // A repeated id would overwrite the earlier record in the UTXO index
        if let Some(tx) = transactions.iter().find(|tx| chain_ids.contains(&tx.id)) {
            return Err(ChainError::InvalidTransaction(format!("Transaction {} is already on the chain", tx.id)));
        }

        for tx in transactions.iter().filter(|tx| !tx.is_reward()) {
            if !tx.verify(self.verifier.as_ref(), &prev_txs)? {
                return Err(ChainError::InvalidTransaction(format!("Verification failed for {}", tx.id)));
            }

            let mut input_value: u64 = 0;
            for input in &tx.inputs {
                if chain_spent.contains(&input.previous_output) {
                    return Err(ChainError::DoubleSpend(format!("{} is already spent", input.previous_output)));
                }
                // verify() already guaranteed the referenced output exists
                let value = prev_txs
                    .get(&input.previous_output.txid)
                    .and_then(|prev| prev.outputs.get(input.previous_output.vout as usize))
                    .map(|output| output.value)
                    .unwrap_or(0);
                input_value = input_value
                    .checked_add(value)
                    .ok_or_else(|| ChainError::InvalidTransaction(format!("Input value overflow in {}", tx.id)))?;
            }

            if tx.total_output_value() > input_value {
                return Err(ChainError::InvalidTransaction(format!(
                    "{} spends {} but only has {} in inputs",
                    tx.id,
                    tx.total_output_value(),
                    input_value
                )));
            }
        }

        Ok(())
    }

    /// One backward pass collecting the `needed` transactions, every
    /// outpoint already spent on the chain and every transaction id on it.
    fn scan_chain(&self, needed: &HashSet<Hash256>) -> Result<ChainScan> {
        let mut scan = ChainScan::default();

        for block in self.iter() {
            for tx in block?.transactions {
                if !tx.is_reward() {
                    scan.spent.extend(tx.inputs.iter().map(|input| input.previous_output));
                }
                scan.ids.insert(tx.id);
                if needed.contains(&tx.id) {
                    scan.prev_txs.insert(tx.id, tx);
                }
            }
        }

        Ok(scan)
    }

    pub fn sign_transaction<S: Signer + ?Sized>(&self, tx: &mut Transaction, signer: &S) -> Result<()> {
        let prev_txs = self.referenced_transactions(tx)?;
        tx.sign(signer, &prev_txs)
    }

    pub fn verify_transaction(&self, tx: &Transaction) -> Result<bool> {
        if tx.is_reward() {
            return Ok(true);
        }
        let prev_txs = self.referenced_transactions(tx)?;
        tx.verify(self.verifier.as_ref(), &prev_txs)
    }

    /// Audits the whole chain: every block sealed by proof of work and linked
    /// to its predecessor, ending at a genesis block.
    pub fn verify_chain(&self) -> Result<bool> {
        let mut expected = Some(self.tip);

        for block in self.iter() {
            let block = block?;
            if expected != Some(block.hash) || !self.pow.validate(&block)? {
                log::warn!("Block {} fails chain verification", block.hash);
                return Ok(false);
            }
            expected = block.previous_hash;
        }

        Ok(expected.is_none())
    }
}

impl TransactionResolver for Blockchain {
    fn find_transaction(&self, id: &Hash256) -> Result<Option<Transaction>> {
        for block in self.iter() {
            if let Some(tx) = block?.transactions.into_iter().find(|tx| &tx.id == id) {
                return Ok(Some(tx));
            }
        }
        Ok(None)
    }

    fn referenced_transactions(&self, tx: &Transaction) -> Result<HashMap<Hash256, Transaction>> {
        if tx.is_reward() {
            return Ok(HashMap::new());
        }

        let needed: HashSet<Hash256> = tx.inputs.iter().map(|input| input.previous_output.txid).collect();
        let prev_txs = self.scan_chain(&needed)?.prev_txs;

        if let Some(missing) = needed.iter().find(|txid| !prev_txs.contains_key(*txid)) {
            return Err(ChainError::ReferencedTransactionNotFound(*missing));
        }
        Ok(prev_txs)
    }
}
