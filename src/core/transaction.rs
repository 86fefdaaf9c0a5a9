use crate::core::utxo::UtxoSet;
use crate::crypto::hash::{Hash160, Hash256, Hashable};
use crate::crypto::keys::{address_to_hash160, KeyPair};
use crate::crypto::signatures::{SignatureVerifier, Signer};
use crate::{ChainError, Result};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Leading byte of every transaction hashing/signing payload. Changing the
/// payload layout requires a new version, since existing signatures cover it.
pub const TX_FORMAT_VERSION: u8 = 1;

/// Output index carried by a reward input, which spends nothing.
pub const REWARD_VOUT: u32 = u32::MAX;

const RANDOM_MEMO_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Hash256,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub previous_output: OutPoint,
    pub signature: Vec<u8>,
    /// Spender's serialized public key. A reward input has no spender and
    /// carries its memo bytes here instead.
    pub public_key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: u64,
    pub pubkey_hash: Hash160,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: Hash256,
    pub vout: u32,
}

/// Looks up previously appended transactions for signing and verification.
pub trait TransactionResolver {
    fn find_transaction(&self, id: &Hash256) -> Result<Option<Transaction>>;

    /// Every transaction referenced by `tx`'s inputs, keyed by id.
    fn referenced_transactions(&self, tx: &Transaction) -> Result<HashMap<Hash256, Transaction>> {
        let mut prev_txs = HashMap::new();
        if tx.is_reward() {
            return Ok(prev_txs);
        }

        for input in &tx.inputs {
            let txid = input.previous_output.txid;
            if prev_txs.contains_key(&txid) {
                continue;
            }
            let prev_tx = self
                .find_transaction(&txid)?
                .ok_or(ChainError::ReferencedTransactionNotFound(txid))?;
            prev_txs.insert(txid, prev_tx);
        }

        Ok(prev_txs)
    }
}

impl TransactionResolver for HashMap<Hash256, Transaction> {
    fn find_transaction(&self, id: &Hash256) -> Result<Option<Transaction>> {
        Ok(self.get(id).cloned())
    }
}

impl Transaction {
    /// Mints `subsidy` to `recipient`. An empty memo is replaced by random
    /// bytes so that two rewards to the same recipient never share an id.
    pub fn new_reward(recipient: Hash160, memo: &str, subsidy: u64) -> Self {
        let memo = if memo.is_empty() {
            let mut random = [0u8; RANDOM_MEMO_LEN];
            OsRng.fill_bytes(&mut random);
            hex::encode(random)
        } else {
            memo.to_string()
        };

        let reward_input = TxInput {
            previous_output: OutPoint::null(),
            signature: Vec::new(),
            public_key: memo.into_bytes(),
        };

        let mut tx = Self {
            id: Hash256::zero(),
            inputs: vec![reward_input],
            outputs: vec![TxOutput::new(subsidy, recipient)],
        };
        tx.set_id();
        tx
    }

    /// Builds and signs a payment of `amount` from `spender` to the address `to`.
    ///
    /// Unspent outputs are taken first-fit in index order until `amount` is
    /// covered; any excess comes back to the spender as a change output.
    pub fn new_transfer<R: TransactionResolver + ?Sized>(
        spender: &KeyPair,
        to: &str,
        amount: u64,
        utxo_set: &UtxoSet,
        resolver: &R,
    ) -> Result<Self> {
        if amount == 0 {
            return Err(ChainError::InvalidInput("Transfer amount must be positive".to_string()));
        }

        let recipient = address_to_hash160(to)?;
        let spender_hash = spender.public_key.hash160();

        let (accumulated, spendable) = utxo_set.find_spendable_outputs(&spender_hash, amount)?;
        if accumulated < amount {
            return Err(ChainError::InsufficientFunds {
                required: amount,
                available: accumulated,
            });
        }

        let inputs = spendable
            .into_iter()
            .map(|outpoint| TxInput {
                previous_output: outpoint,
                signature: Vec::new(),
                public_key: spender.public_key.to_bytes().to_vec(),
            })
            .collect();

        let mut outputs = vec![TxOutput::new(amount, recipient)];
        if accumulated > amount {
            outputs.push(TxOutput::new(accumulated - amount, spender_hash));
        }

        let mut tx = Self {
            id: Hash256::zero(),
            inputs,
            outputs,
        };
        tx.set_id();

        let prev_txs = resolver.referenced_transactions(&tx)?;
        tx.sign(&spender.private_key, &prev_txs)?;

        log::debug!("Built transfer {} of {} ({} inputs)", tx.id, amount, tx.inputs.len());
        Ok(tx)
    }

    pub fn is_reward(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_output.is_null()
    }

    pub fn set_id(&mut self) {
        self.id = self.hash();
    }

    pub fn total_output_value(&self) -> u64 {
        self.outputs.iter().map(|output| output.value).sum()
    }

    /// Copy with every signature and public key blanked.
    pub fn trimmed_copy(&self) -> Transaction {
        let inputs = self
            .inputs
            .iter()
            .map(|input| TxInput {
                previous_output: input.previous_output,
                signature: Vec::new(),
                public_key: Vec::new(),
            })
            .collect();

        Transaction {
            id: self.id,
            inputs,
            outputs: self.outputs.clone(),
        }
    }

    /// Digest signed by input `index`: the trimmed copy with that input's key
    /// slot holding the owner hash of the output it spends.
    fn signing_digest(trimmed: &mut Transaction, index: usize, owner: &Hash160) -> Hash256 {
        trimmed.inputs[index].public_key = owner.as_bytes().to_vec();
        let digest = trimmed.hash();
        trimmed.inputs[index].public_key.clear();
        digest
    }

    fn referenced_output<'a>(
        input: &TxInput,
        prev_txs: &'a HashMap<Hash256, Transaction>,
    ) -> Result<Option<&'a TxOutput>> {
        let outpoint = &input.previous_output;
        let prev_tx = prev_txs
            .get(&outpoint.txid)
            .ok_or(ChainError::ReferencedTransactionNotFound(outpoint.txid))?;
        Ok(prev_tx.outputs.get(outpoint.vout as usize))
    }

    pub fn sign<S: Signer + ?Sized>(
        &mut self,
        signer: &S,
        prev_txs: &HashMap<Hash256, Transaction>,
    ) -> Result<()> {
        if self.is_reward() {
            return Ok(());
        }

        // Resolve everything up front so a failure leaves the transaction untouched
        let mut owners = Vec::with_capacity(self.inputs.len());
        for input in &self.inputs {
            let output = Self::referenced_output(input, prev_txs)?.ok_or_else(|| {
                ChainError::InvalidTransaction(format!(
                    "Input references missing output {}:{}",
                    input.previous_output.txid, input.previous_output.vout
                ))
            })?;
            owners.push(output.pubkey_hash);
        }

        let mut trimmed = self.trimmed_copy();
        let mut signatures = Vec::with_capacity(owners.len());
        for (index, owner) in owners.iter().enumerate() {
            let digest = Self::signing_digest(&mut trimmed, index, owner);
            signatures.push(signer.sign_digest(&digest)?);
        }

        for (input, signature) in self.inputs.iter_mut().zip(signatures) {
            input.signature = signature;
        }
        self.set_id();

        Ok(())
    }

    /// `Ok(false)` on any bad signature, foreign key or stale id;
    /// `Err` only when a referenced transaction cannot be resolved.
    pub fn verify<V: SignatureVerifier + ?Sized>(
        &self,
        verifier: &V,
        prev_txs: &HashMap<Hash256, Transaction>,
    ) -> Result<bool> {
        if self.is_reward() {
            return Ok(true);
        }
        if self.inputs.is_empty() || self.id != self.hash() {
            return Ok(false);
        }

        let mut trimmed = self.trimmed_copy();
        for (index, input) in self.inputs.iter().enumerate() {
            let Some(output) = Self::referenced_output(input, prev_txs)? else {
                return Ok(false);
            };

            // The key offered must be the one the spent output is locked to
            if Hash160::hash_sha256(&input.public_key) != output.pubkey_hash {
                return Ok(false);
            }

            let digest = Self::signing_digest(&mut trimmed, index, &output.pubkey_hash);
            if !verifier.verify_digest(&input.public_key, &digest, &input.signature) {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

impl Hashable for Transaction {
    /// SHA-256 over the versioned payload; the `id` field is never part of it.
    fn hash(&self) -> Hash256 {
        let mut data = Vec::new();
        data.push(TX_FORMAT_VERSION);

        data.extend_from_slice(&(self.inputs.len() as u32).to_le_bytes());
        for input in &self.inputs {
            data.extend_from_slice(input.previous_output.txid.as_bytes());
            data.extend_from_slice(&input.previous_output.vout.to_le_bytes());
            data.extend_from_slice(&(input.signature.len() as u32).to_le_bytes());
            data.extend_from_slice(&input.signature);
            data.extend_from_slice(&(input.public_key.len() as u32).to_le_bytes());
            data.extend_from_slice(&input.public_key);
        }

        data.extend_from_slice(&(self.outputs.len() as u32).to_le_bytes());
        for output in &self.outputs {
            data.extend_from_slice(&output.value.to_le_bytes());
            data.extend_from_slice(output.pubkey_hash.as_bytes());
        }

        Hash256::hash(&data)
    }
}

impl TxOutput {
    pub fn new(value: u64, pubkey_hash: Hash160) -> Self {
        Self { value, pubkey_hash }
    }

    pub fn is_locked_with_key(&self, pubkey_hash: &Hash160) -> bool {
        &self.pubkey_hash == pubkey_hash
    }
}

impl TxInput {
    pub fn uses_key(&self, pubkey_hash: &Hash160) -> bool {
        &Hash160::hash_sha256(&self.public_key) == pubkey_hash
    }
}

impl OutPoint {
    pub fn new(txid: Hash256, vout: u32) -> Self {
        Self { txid, vout }
    }

    pub fn null() -> Self {
        Self {
            txid: Hash256::zero(),
            vout: REWARD_VOUT,
        }
    }

    pub fn is_null(&self) -> bool {
        self.txid.is_zero() && self.vout == REWARD_VOUT
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Transaction {}:", self.id)?;
        for (i, input) in self.inputs.iter().enumerate() {
            writeln!(f, "     Input {}:", i)?;
            if input.previous_output.is_null() {
                writeln!(f, "       Reward:    {}", String::from_utf8_lossy(&input.public_key))?;
                continue;
            }
            writeln!(f, "       TXID:      {}", input.previous_output.txid)?;
            writeln!(f, "       Out:       {}", input.previous_output.vout)?;
            writeln!(f, "       Signature: {}", hex::encode(&input.signature))?;
            writeln!(f, "       PubKey:    {}", hex::encode(&input.public_key))?;
        }
        for (i, output) in self.outputs.iter().enumerate() {
            writeln!(f, "     Output {}:", i)?;
            writeln!(f, "       Value:  {}", output.value)?;
            writeln!(f, "       Owner:  {}", output.pubkey_hash)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::signatures::Secp256k1Verifier;

    fn funded_pair(value: u64) -> Result<(KeyPair, Transaction)> {
        let owner = KeyPair::new()?;
        let reward = Transaction::new_reward(owner.public_key.hash160(), "genesis", value);
        Ok((owner, reward))
    }

    fn spend(owner: &KeyPair, source: &Transaction, to: Hash160, value: u64) -> Transaction {
        let mut tx = Transaction {
            id: Hash256::zero(),
            inputs: vec![TxInput {
                previous_output: OutPoint::new(source.id, 0),
                signature: Vec::new(),
                public_key: owner.public_key.to_bytes().to_vec(),
            }],
            outputs: vec![TxOutput::new(value, to)],
        };
        tx.set_id();
        tx
    }

    fn prev_map(txs: &[&Transaction]) -> HashMap<Hash256, Transaction> {
        txs.iter().map(|tx| (tx.id, (*tx).clone())).collect()
    }

    #[test]
    fn test_reward_transaction() {
        let recipient = Hash160::hash_sha256(b"recipient");
        let tx = Transaction::new_reward(recipient, "Genesis block", 10);

        assert!(tx.is_reward());
        assert_eq!(tx.inputs.len(), 1);
        assert_eq!(tx.outputs.len(), 1);
        assert_eq!(tx.outputs[0].value, 10);
        assert_eq!(tx.inputs[0].public_key, b"Genesis block".to_vec());
        assert_eq!(tx.id, tx.hash());
    }

    #[test]
    fn test_empty_memo_gets_random_payload() {
        let recipient = Hash160::hash_sha256(b"recipient");
        let first = Transaction::new_reward(recipient, "", 10);
        let second = Transaction::new_reward(recipient, "", 10);

        assert_eq!(first.inputs[0].public_key.len(), RANDOM_MEMO_LEN * 2);
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_is_reward_requires_sentinel() -> Result<()> {
        let (owner, reward) = funded_pair(10)?;
        let tx = spend(&owner, &reward, owner.public_key.hash160(), 10);
        assert!(!tx.is_reward());

        let mut two_inputs = reward.clone();
        two_inputs.inputs.push(two_inputs.inputs[0].clone());
        assert!(!two_inputs.is_reward());

        Ok(())
    }

    #[test]
    fn test_transaction_hash_ignores_id() {
        let recipient = Hash160::hash_sha256(b"recipient");
        let tx = Transaction::new_reward(recipient, "test", 1000);

        let mut other = tx.clone();
        other.id = Hash256::hash(b"something else");

        assert_eq!(tx.hash(), other.hash());
        assert_ne!(tx.hash(), Hash256::zero());
    }

    #[test]
    fn test_sign_and_verify() -> Result<()> {
        let (owner, reward) = funded_pair(10)?;
        let recipient = KeyPair::new()?;
        let prev_txs = prev_map(&[&reward]);

        let mut tx = spend(&owner, &reward, recipient.public_key.hash160(), 10);
        tx.sign(&owner.private_key, &prev_txs)?;

        assert!(!tx.inputs[0].signature.is_empty());
        assert_eq!(tx.id, tx.hash());
        assert!(tx.verify(&Secp256k1Verifier, &prev_txs)?);

        Ok(())
    }

    #[test]
    fn test_flipped_signature_byte_fails() -> Result<()> {
        let (owner, reward) = funded_pair(10)?;
        let prev_txs = prev_map(&[&reward]);

        let mut tx = spend(&owner, &reward, Hash160::hash_sha256(b"bob"), 10);
        tx.sign(&owner.private_key, &prev_txs)?;

        for position in [0, 31, 32, 63] {
            let mut tampered = tx.clone();
            tampered.inputs[0].signature[position] ^= 0x01;
            assert!(!tampered.verify(&Secp256k1Verifier, &prev_txs)?);

            // Even with a consistent id the signature itself must not check out
            tampered.set_id();
            assert!(!tampered.verify(&Secp256k1Verifier, &prev_txs)?);
        }

        Ok(())
    }

    #[test]
    fn test_signature_bound_to_spent_output() -> Result<()> {
        let owner = KeyPair::new()?;
        let first = Transaction::new_reward(owner.public_key.hash160(), "one", 10);
        let second = Transaction::new_reward(owner.public_key.hash160(), "two", 10);
        let prev_txs = prev_map(&[&first, &second]);

        let mut tx = spend(&owner, &first, Hash160::hash_sha256(b"bob"), 10);
        tx.sign(&owner.private_key, &prev_txs)?;

        // Replaying the signature against a different prior output must fail
        let mut replayed = tx.clone();
        replayed.inputs[0].previous_output = OutPoint::new(second.id, 0);
        replayed.set_id();
        assert!(!replayed.verify(&Secp256k1Verifier, &prev_txs)?);

        Ok(())
    }

    #[test]
    fn test_foreign_key_cannot_spend() -> Result<()> {
        let (owner, reward) = funded_pair(10)?;
        let thief = KeyPair::new()?;
        let prev_txs = prev_map(&[&reward]);

        let mut tx = spend(&thief, &reward, thief.public_key.hash160(), 10);
        tx.sign(&thief.private_key, &prev_txs)?;

        assert!(!tx.verify(&Secp256k1Verifier, &prev_txs)?);
        assert!(!tx.inputs[0].uses_key(&owner.public_key.hash160()));

        Ok(())
    }

    #[test]
    fn test_sign_missing_reference() -> Result<()> {
        let (owner, reward) = funded_pair(10)?;
        let mut tx = spend(&owner, &reward, owner.public_key.hash160(), 10);
        let before = tx.clone();

        let result = tx.sign(&owner.private_key, &HashMap::new());
        assert!(matches!(result, Err(ChainError::ReferencedTransactionNotFound(id)) if id == reward.id));
        assert_eq!(tx, before);

        let result = tx.verify(&Secp256k1Verifier, &HashMap::new());
        assert!(matches!(result, Err(ChainError::ReferencedTransactionNotFound(_))));

        Ok(())
    }

    #[test]
    fn test_reward_sign_is_noop_and_verifies() -> Result<()> {
        let (owner, reward) = funded_pair(10)?;
        let mut signed = reward.clone();
        signed.sign(&owner.private_key, &HashMap::new())?;

        assert_eq!(signed, reward);
        assert!(reward.verify(&Secp256k1Verifier, &HashMap::new())?);

        Ok(())
    }

    #[test]
    fn test_default_resolver_on_map() -> Result<()> {
        let (owner, reward) = funded_pair(10)?;
        let tx = spend(&owner, &reward, owner.public_key.hash160(), 10);

        let resolver = prev_map(&[&reward]);
        let resolved = resolver.referenced_transactions(&tx)?;
        assert_eq!(resolved.get(&reward.id), Some(&reward));

        let empty: HashMap<Hash256, Transaction> = HashMap::new();
        assert!(empty.referenced_transactions(&tx).is_err());
        assert!(empty.referenced_transactions(&reward)?.is_empty());

        Ok(())
    }
}
