use crate::core::transaction::OutPoint;
use crate::core::{Block, Blockchain, TxOutput};
use crate::crypto::hash::{Hash160, Hash256};
use crate::storage::KvStore;
use crate::{ChainError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// One unspent output, remembering its index in the creating transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoEntry {
    pub vout: u32,
    pub output: TxOutput,
}

/// Derived index of unspent outputs, one record per transaction id.
///
/// The index is a cache of the chain. It is only correct after [`UtxoSet::rebuild`]
/// or after [`UtxoSet::update`] has been applied for every appended block.
#[derive(Clone)]
pub struct UtxoSet {
    store: Arc<dyn KvStore>,
}

fn decode_entries(data: &[u8]) -> Result<Vec<UtxoEntry>> {
    Ok(bincode::deserialize(data)?)
}

fn decode_txid(key: &[u8]) -> Result<Hash256> {
    Hash256::from_slice(key).ok_or_else(|| ChainError::Storage(format!("Invalid UTXO key length: {}", key.len())))
}

impl UtxoSet {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Replaces the whole index with the unspent outputs of `chain`, in one
    /// atomic write. Returns the number of transactions indexed.
    pub fn rebuild(&self, chain: &Blockchain) -> Result<usize> {
        let unspent = Self::collect_unspent(chain)?;

        let mut encoded = Vec::with_capacity(unspent.len());
        for (txid, entries) in &unspent {
            encoded.push((*txid, bincode::serialize(entries)?));
        }
        let stale: Vec<Vec<u8>> = self.store.entries()?.into_iter().map(|(key, _)| key).collect();

        self.store.transaction(&|tx| {
            for key in &stale {
                tx.remove(key)?;
            }
            for (txid, value) in &encoded {
                tx.insert(txid.as_bytes(), value)?;
            }
            Ok(())
        })?;

        log::info!("🔄 Reindexed {} transactions with unspent outputs", encoded.len());
        Ok(encoded.len())
    }

    fn collect_unspent(chain: &Blockchain) -> Result<BTreeMap<Hash256, Vec<UtxoEntry>>> {
        let mut created = BTreeMap::new();
        let mut spent = HashSet::new();

        for block in chain.iter() {
            for tx in block?.transactions {
                if !tx.is_reward() {
                    spent.extend(tx.inputs.iter().map(|input| input.previous_output));
                }
                let entries: Vec<UtxoEntry> = tx
                    .outputs
                    .into_iter()
                    .enumerate()
                    .map(|(vout, output)| UtxoEntry {
                        vout: vout as u32,
                        output,
                    })
                    .collect();
                created.insert(tx.id, entries);
            }
        }

        let mut unspent = BTreeMap::new();
        for (txid, entries) in created {
            let remaining: Vec<UtxoEntry> = entries
                .into_iter()
                .filter(|entry| !spent.contains(&OutPoint::new(txid, entry.vout)))
                .collect();
            if !remaining.is_empty() {
                unspent.insert(txid, remaining);
            }
        }
        Ok(unspent)
    }

    /// First-fit selection in index key order: outputs owned by `pubkey_hash`
    /// are taken until at least `amount` is accumulated. The returned total may
    /// fall short if the owner cannot cover `amount`.
    pub fn find_spendable_outputs(&self, pubkey_hash: &Hash160, amount: u64) -> Result<(u64, Vec<OutPoint>)> {
        let mut accumulated: u64 = 0;
        let mut selected = Vec::new();

        'scan: for (key, value) in self.store.entries()? {
            let txid = decode_txid(&key)?;
            for entry in decode_entries(&value)? {
                if accumulated >= amount {
                    break 'scan;
                }
                if entry.output.is_locked_with_key(pubkey_hash) {
                    accumulated = accumulated.saturating_add(entry.output.value);
                    selected.push(OutPoint::new(txid, entry.vout));
                }
            }
        }

        Ok((accumulated, selected))
    }

    pub fn find_unspent(&self, pubkey_hash: &Hash160) -> Result<Vec<(OutPoint, TxOutput)>> {
        let mut unspent = Vec::new();
        for (key, value) in self.store.entries()? {
            let txid = decode_txid(&key)?;
            for entry in decode_entries(&value)? {
                if entry.output.is_locked_with_key(pubkey_hash) {
                    unspent.push((OutPoint::new(txid, entry.vout), entry.output));
                }
            }
        }
        Ok(unspent)
    }

    pub fn find_balance(&self, pubkey_hash: &Hash160) -> Result<u64> {
        Ok(self
            .find_unspent(pubkey_hash)?
            .iter()
            .map(|(_, output)| output.value)
            .sum())
    }

    /// Applies a freshly appended block: removes the outputs its inputs spend
    /// and adds its new outputs, all in one atomic write.
    pub fn update(&self, block: &Block) -> Result<()> {
        let mut created = Vec::with_capacity(block.transactions.len());
        for tx in &block.transactions {
            let entries: Vec<UtxoEntry> = tx
                .outputs
                .iter()
                .enumerate()
                .map(|(vout, output)| UtxoEntry {
                    vout: vout as u32,
                    output: output.clone(),
                })
                .collect();
            created.push((tx.id, bincode::serialize(&entries)?));
        }

        self.store.transaction(&|db| {
            for tx in block.transactions.iter().filter(|tx| !tx.is_reward()) {
                for input in &tx.inputs {
                    let outpoint = input.previous_output;
                    let data = db.get(outpoint.txid.as_bytes())?.ok_or_else(|| {
                        ChainError::Storage(format!("UTXO record for {} is missing", outpoint.txid))
                    })?;

                    let remaining: Vec<UtxoEntry> = decode_entries(&data)?
                        .into_iter()
                        .filter(|entry| entry.vout != outpoint.vout)
                        .collect();

                    if remaining.is_empty() {
                        db.remove(outpoint.txid.as_bytes())?;
                    } else {
                        db.insert(outpoint.txid.as_bytes(), &bincode::serialize(&remaining)?)?;
                    }
                }
            }

            for (txid, value) in &created {
                db.insert(txid.as_bytes(), value)?;
            }
            Ok(())
        })?;

        log::debug!("Applied block {} to UTXO index", block.hash);
        Ok(())
    }

    /// Number of transactions that still have unspent outputs.
    pub fn count_transactions(&self) -> Result<usize> {
        Ok(self.store.entries()?.len())
    }

    pub fn total_supply(&self) -> Result<u64> {
        let mut total: u64 = 0;
        for (_, value) in self.store.entries()? {
            for entry in decode_entries(&value)? {
                total = total.saturating_add(entry.output.value);
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testutil::memory_chain;
    use crate::core::Transaction;
    use crate::crypto::keys::KeyPair;
    use crate::storage::MemoryStore;

    #[test]
    fn test_genesis_index() -> Result<()> {
        let (_chain, owner, utxo) = memory_chain(10)?;

        assert_eq!(utxo.find_balance(&owner.public_key.hash160())?, 10);
        assert_eq!(utxo.count_transactions()?, 1);
        assert_eq!(utxo.total_supply()?, 10);

        let stranger = KeyPair::new()?;
        assert_eq!(utxo.find_balance(&stranger.public_key.hash160())?, 0);
        assert!(utxo.find_unspent(&stranger.public_key.hash160())?.is_empty());

        Ok(())
    }

    #[test]
    fn test_transfer_then_insufficient_funds() -> Result<()> {
        let (mut chain, alice, utxo) = memory_chain(10)?;
        let bob = KeyPair::new()?;

        let tx = Transaction::new_transfer(&alice, &bob.address(), 3, &utxo, &chain)?;
        assert_eq!(tx.outputs.len(), 2);
        let block = chain.append(vec![tx])?;
        utxo.update(&block)?;

        assert_eq!(utxo.find_balance(&alice.public_key.hash160())?, 7);
        assert_eq!(utxo.find_balance(&bob.public_key.hash160())?, 3);

        let result = Transaction::new_transfer(&bob, &alice.address(), 100, &utxo, &chain);
        assert!(matches!(
            result,
            Err(ChainError::InsufficientFunds {
                required: 100,
                available: 3
            })
        ));
        assert_eq!(chain.len()?, 2);

        Ok(())
    }

    #[test]
    fn test_spend_exact_balance() -> Result<()> {
        let (mut chain, alice, utxo) = memory_chain(10)?;
        let bob = KeyPair::new()?;

        let tx = Transaction::new_transfer(&alice, &bob.address(), 10, &utxo, &chain)?;
        assert_eq!(tx.outputs.len(), 1);
        utxo.update(&chain.append(vec![tx])?)?;

        assert_eq!(utxo.find_balance(&alice.public_key.hash160())?, 0);
        assert_eq!(utxo.find_balance(&bob.public_key.hash160())?, 10);
        assert!(Transaction::new_transfer(&alice, &bob.address(), 1, &utxo, &chain).is_err());

        Ok(())
    }

    #[test]
    fn test_value_is_conserved_across_transfers() -> Result<()> {
        let (mut chain, alice, utxo) = memory_chain(10)?;
        let bob = KeyPair::new()?;
        let carol = KeyPair::new()?;

        let hops = [(&alice, &bob, 6), (&bob, &carol, 4), (&carol, &alice, 1), (&alice, &carol, 5)];
        for (from, to, amount) in hops {
            let tx = Transaction::new_transfer(from, &to.address(), amount, &utxo, &chain)?;
            utxo.update(&chain.append(vec![tx])?)?;
        }

        let total: u64 = [&alice, &bob, &carol]
            .iter()
            .map(|k| utxo.find_balance(&k.public_key.hash160()))
            .sum::<Result<u64>>()?;
        assert_eq!(total, 10);
        assert_eq!(utxo.total_supply()?, 10);

        Ok(())
    }

    #[test]
    fn test_spendable_selection_covers_amount() -> Result<()> {
        let (mut chain, alice, utxo) = memory_chain(10)?;
        for memo in ["a", "b"] {
            let reward = Transaction::new_reward(alice.public_key.hash160(), memo, 10);
            utxo.update(&chain.append(vec![reward])?)?;
        }

        let (accumulated, outpoints) = utxo.find_spendable_outputs(&alice.public_key.hash160(), 15)?;
        assert_eq!(accumulated, 20);
        assert_eq!(outpoints.len(), 2);

        let (accumulated, outpoints) = utxo.find_spendable_outputs(&alice.public_key.hash160(), 100)?;
        assert_eq!(accumulated, 30);
        assert_eq!(outpoints.len(), 3);

        let mut sorted = outpoints.clone();
        sorted.sort();
        assert_eq!(sorted, outpoints);

        Ok(())
    }

    #[test]
    fn test_rebuild_is_idempotent() -> Result<()> {
        let (mut chain, alice, utxo) = memory_chain(10)?;
        let bob = KeyPair::new()?;
        let tx = Transaction::new_transfer(&alice, &bob.address(), 4, &utxo, &chain)?;
        chain.append(vec![tx])?;

        let first = utxo.rebuild(&chain)?;
        let snapshot = utxo.store.entries()?;
        let second = utxo.rebuild(&chain)?;

        assert_eq!(first, second);
        assert_eq!(utxo.store.entries()?, snapshot);
        assert_eq!(utxo.find_balance(&bob.public_key.hash160())?, 4);

        Ok(())
    }

    #[test]
    fn test_rebuild_drops_stale_records() -> Result<()> {
        let (chain, alice, _) = memory_chain(10)?;
        let store = MemoryStore::new();
        let junk = vec![UtxoEntry {
            vout: 0,
            output: TxOutput::new(99, alice.public_key.hash160()),
        }];
        store.put_raw(Hash256::hash(b"junk").as_bytes(), &bincode::serialize(&junk)?)?;

        let utxo = UtxoSet::new(Arc::new(store));
        assert_eq!(utxo.find_balance(&alice.public_key.hash160())?, 99);

        utxo.rebuild(&chain)?;
        assert_eq!(utxo.find_balance(&alice.public_key.hash160())?, 10);
        assert_eq!(utxo.count_transactions()?, 1);

        Ok(())
    }

    #[test]
    fn test_index_is_stale_until_updated() -> Result<()> {
        let (mut chain, alice, utxo) = memory_chain(10)?;
        let reward = Transaction::new_reward(alice.public_key.hash160(), "", 10);
        let block = chain.append(vec![reward])?;

        assert_eq!(utxo.find_balance(&alice.public_key.hash160())?, 10);
        utxo.update(&block)?;
        assert_eq!(utxo.find_balance(&alice.public_key.hash160())?, 20);

        Ok(())
    }

    #[test]
    fn test_incremental_update_matches_rebuild() -> Result<()> {
        let (mut chain, alice, utxo) = memory_chain(10)?;
        let bob = KeyPair::new()?;

        for amount in [3, 2] {
            let tx = Transaction::new_transfer(&alice, &bob.address(), amount, &utxo, &chain)?;
            let reward = Transaction::new_reward(alice.public_key.hash160(), "", 10);
            utxo.update(&chain.append(vec![reward, tx])?)?;
        }
        let tx = Transaction::new_transfer(&bob, &alice.address(), 5, &utxo, &chain)?;
        utxo.update(&chain.append(vec![tx])?)?;

        let incremental = utxo.store.entries()?;
        let rebuilt = UtxoSet::new(Arc::new(MemoryStore::new()));
        rebuilt.rebuild(&chain)?;

        assert_eq!(rebuilt.store.entries()?, incremental);

        Ok(())
    }

    #[test]
    fn test_partial_spend_keeps_output_indices() -> Result<()> {
        let (mut chain, alice, utxo) = memory_chain(10)?;
        let bob = KeyPair::new()?;

        // Output 0 pays bob, output 1 returns change to alice
        let tx = Transaction::new_transfer(&alice, &bob.address(), 3, &utxo, &chain)?;
        let txid = tx.id;
        utxo.update(&chain.append(vec![tx])?)?;

        let spend_bob = Transaction::new_transfer(&bob, &alice.address(), 3, &utxo, &chain)?;
        utxo.update(&chain.append(vec![spend_bob])?)?;

        let remaining = utxo.find_unspent(&alice.public_key.hash160())?;
        assert!(remaining.iter().any(|(outpoint, output)| *outpoint == OutPoint::new(txid, 1) && output.value == 7));

        // The change output is still spendable at its original index
        let tx = Transaction::new_transfer(&alice, &bob.address(), 10, &utxo, &chain)?;
        assert!(chain.verify_transaction(&tx)?);
        utxo.update(&chain.append(vec![tx])?)?;
        assert_eq!(utxo.find_balance(&bob.public_key.hash160())?, 10);

        Ok(())
    }

    #[test]
    fn test_update_with_unknown_input_leaves_index_untouched() -> Result<()> {
        let (chain, alice, utxo) = memory_chain(10)?;
        let snapshot = utxo.store.entries()?;

        let mut block = chain.resolve_block(&chain.tip())?.unwrap();
        block.transactions.push(Transaction {
            id: Hash256::hash(b"orphan"),
            inputs: vec![crate::core::TxInput {
                previous_output: OutPoint::new(Hash256::hash(b"unknown"), 0),
                signature: vec![],
                public_key: alice.public_key.to_bytes().to_vec(),
            }],
            outputs: vec![TxOutput::new(1, alice.public_key.hash160())],
        });

        assert!(matches!(utxo.update(&block), Err(ChainError::Storage(_))));
        assert_eq!(utxo.store.entries()?, snapshot);

        Ok(())
    }
}
