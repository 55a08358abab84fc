use crate::error::{ChainError, ChainResult};
use crate::transaction::Transaction;
use crate::wire::canonical_bytes_excluding;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{Hash256, Target256};
use std::collections::HashMap;

/// Top-level fields excluded from the block's hash: derived ledger state,
/// recomputable from the transaction list and the parent block, not part of
/// the block's identity.
const HASH_EXCLUDED_FIELDS: &[&str] = &["balances", "next_nonce"];

/// A block: a proposed batch of transactions atop a parent, plus the running
/// account ledger produced by applying them.
///
/// `transactions` is an insertion-ordered sequence, not a map: the canonical
/// encoding hashes it as a JSON array, so admission order is part of the
/// block's identity without needing a side channel to recover it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub prev_hash: Option<Hash256>,
    pub target: Target256,
    pub proof: u32,
    pub balances: HashMap<String, u32>,
    pub next_nonce: HashMap<String, u32>,
    pub transactions: Vec<Transaction>,
    pub chain_length: u32,
    pub timestamp: DateTime<Utc>,
    pub reward_addr: String,
    pub coinbase_reward: u32,
}

impl Block {
    /// Builds a new block extending `prev_block` (or a genesis block, if
    /// `prev_block` is `None`), inheriting its parent's ledger verbatim.
    #[must_use]
    pub fn new(
        reward_addr: String,
        prev_block: Option<&Block>,
        target: Target256,
        coinbase_reward: u32,
    ) -> Self {
        let (balances, next_nonce, chain_length) = prev_block.map_or_else(
            || (HashMap::new(), HashMap::new(), 0),
            |parent| {
                (
                    parent.balances.clone(),
                    parent.next_nonce.clone(),
                    parent.chain_length + 1,
                )
            },
        );

        Self {
            prev_hash: prev_block.map(|p| p.hash()).transpose().ok().flatten(),
            target,
            proof: 0,
            balances,
            next_nonce,
            transactions: Vec::new(),
            chain_length,
            timestamp: Utc::now(),
            reward_addr,
            coinbase_reward,
        }
    }

    /// The block's identity hash: a canonical encoding of every field except
    /// `balances` and `next_nonce`.
    ///
    /// # Errors
    ///
    /// Returns an error if canonical encoding fails.
    pub fn hash(&self) -> shared::Result<Hash256> {
        let bytes = canonical_bytes_excluding(self, HASH_EXCLUDED_FIELDS)?;
        Ok(Hash256::sha256(&bytes))
    }

    #[must_use]
    pub fn is_genesis(&self) -> bool {
        self.chain_length == 0
    }

    /// Checks that this block's hash, read as a big-endian 256-bit unsigned
    /// integer, is below `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if hashing fails.
    pub fn has_valid_proof(&self) -> shared::Result<bool> {
        let hash = self.hash()?;
        Ok(hash.as_target() < self.target)
    }

    #[must_use]
    pub fn balance_of(&self, address: &str) -> u32 {
        self.balances.get(address).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn contains(&self, tx_id: &str) -> bool {
        self.transactions
            .iter()
            .any(|tx| tx.id().map(|id| id.to_string() == tx_id).unwrap_or(false))
    }

    #[must_use]
    pub fn sufficient_funds(&self, tx: &Transaction) -> bool {
        tx.total_output()
            .map(|total| total <= self.balance_of(&tx.info.from))
            .unwrap_or(false)
    }

    /// Admits `tx` into this block, updating balances and the sender's next
    /// expected nonce. Checks run in this exact order: not already present,
    /// signed, signature valid, sufficient funds, nonce matches exactly.
    ///
    /// # Errors
    ///
    /// Returns the specific [`ChainError`] variant for whichever check
    /// failed first.
    pub fn add_transaction(&mut self, tx: Transaction) -> ChainResult<()> {
        let tx_id = tx.id()?.to_string();

        if self.contains(&tx_id) {
            return Err(ChainError::DuplicateTransaction(tx_id));
        }
        if tx.signature.is_none() {
            return Err(ChainError::UnsignedTransaction(tx_id));
        }
        if !tx.verify_signature()? {
            return Err(ChainError::InvalidSignature(tx_id));
        }
        if !self.sufficient_funds(&tx) {
            return Err(ChainError::InsufficientFunds(tx_id));
        }

        let expected_nonce = self.next_nonce.get(&tx.info.from).copied().unwrap_or(0);
        if tx.info.nonce < expected_nonce {
            return Err(ChainError::ReplayedNonce {
                address: tx.info.from.clone(),
                expected: expected_nonce,
                got: tx.info.nonce,
            });
        }
        if tx.info.nonce > expected_nonce {
            return Err(ChainError::OutOfOrderNonce {
                address: tx.info.from.clone(),
                expected: expected_nonce,
                got: tx.info.nonce,
            });
        }

        self.next_nonce.insert(tx.info.from.clone(), expected_nonce + 1);

        let total_output = tx.total_output()?;
        let sender_balance = self.balance_of(&tx.info.from);
        self.balances
            .insert(tx.info.from.clone(), sender_balance - total_output);

        for output in &tx.info.outputs {
            let balance = self.balance_of(&output.address);
            self.balances
                .insert(output.address.clone(), balance + output.amount);
        }

        self.transactions.push(tx);

        Ok(())
    }

    /// Re-derives this block's ledger against a new parent: copies the
    /// parent's balances and next-nonce tables, credits the parent's
    /// `reward_addr` with its `coinbase_reward` plus the sum of its own
    /// transactions' fees (the parent's total reward, finally materialized
    /// now that the parent is done accepting transactions), and re-admits
    /// every transaction this block had accepted, in their original order.
    /// Used when a block's parent changes (initial construction atop a new
    /// tip, or a reorg).
    ///
    /// # Errors
    ///
    /// Returns an error if any previously accepted transaction no longer
    /// admits cleanly against the new parent ledger (e.g. a double-spend
    /// introduced by the reorg).
    pub fn rerun(&mut self, prev_block: &Block) -> ChainResult<()> {
        self.balances = prev_block.balances.clone();
        self.next_nonce = prev_block.next_nonce.clone();

        if !prev_block.reward_addr.is_empty() {
            let winner_balance = self.balance_of(&prev_block.reward_addr);
            self.balances.insert(
                prev_block.reward_addr.clone(),
                winner_balance + prev_block.total_rewards(),
            );
        }

        let transactions = std::mem::take(&mut self.transactions);
        for tx in transactions {
            self.add_transaction(tx)?;
        }

        Ok(())
    }

    /// Coinbase reward plus every admitted transaction's fee — the total
    /// this block's miner is paid once it is confirmed.
    #[must_use]
    pub fn total_rewards(&self) -> u32 {
        let fees: u32 = self.transactions.iter().map(|tx| tx.info.fee).sum();
        fees + self.coinbase_reward
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Output;
    use shared::KeyPair;

    fn genesis_with_balance(address: &str, amount: u32) -> Block {
        let mut block = Block::new(String::new(), None, Target256::max(), 0);
        block.balances.insert(address.to_string(), amount);
        block
    }

    fn signed_tx(keypair: &KeyPair, nonce: u32, fee: u32, outputs: Vec<Output>) -> Transaction {
        let mut tx =
            Transaction::new(nonce, keypair.public_key.clone(), fee, outputs, None).unwrap();
        tx.sign(keypair).unwrap();
        tx
    }

    #[test]
    fn genesis_block_has_chain_length_zero_and_no_parent() {
        let block = Block::new("alice".to_string(), None, Target256::max(), 25);
        assert!(block.is_genesis());
        assert!(block.prev_hash.is_none());
    }

    #[test]
    fn child_block_inherits_parent_balances_and_chain_length() {
        let parent = genesis_with_balance("alice", 100);
        let child = Block::new("bob".to_string(), Some(&parent), Target256::max(), 25);
        assert_eq!(child.chain_length, 1);
        assert_eq!(child.balance_of("alice"), 100);
        assert_eq!(child.prev_hash.unwrap(), parent.hash().unwrap());
    }

    #[test]
    fn add_transaction_moves_balance_and_advances_nonce() {
        let keypair = KeyPair::generate().unwrap();
        let address = keypair.public_key.address().unwrap();
        let mut block = genesis_with_balance(&address, 100);

        let tx = signed_tx(&keypair, 0, 1, vec![Output::new("bob".to_string(), 20)]);
        block.add_transaction(tx).unwrap();

        assert_eq!(block.balance_of(&address), 79);
        assert_eq!(block.balance_of("bob"), 20);
        assert_eq!(block.next_nonce.get(&address).copied(), Some(1));
    }

    #[test]
    fn duplicate_transaction_is_rejected() {
        let keypair = KeyPair::generate().unwrap();
        let address = keypair.public_key.address().unwrap();
        let mut block = genesis_with_balance(&address, 100);

        let tx = signed_tx(&keypair, 0, 1, vec![Output::new("bob".to_string(), 20)]);
        block.add_transaction(tx.clone()).unwrap();

        assert!(matches!(
            block.add_transaction(tx),
            Err(ChainError::DuplicateTransaction(_))
        ));
    }

    #[test]
    fn replayed_nonce_is_rejected() {
        let keypair = KeyPair::generate().unwrap();
        let address = keypair.public_key.address().unwrap();
        let mut block = genesis_with_balance(&address, 100);

        let first = signed_tx(&keypair, 0, 1, vec![Output::new("bob".to_string(), 10)]);
        block.add_transaction(first).unwrap();

        let replay = signed_tx(&keypair, 0, 1, vec![Output::new("carol".to_string(), 10)]);
        assert!(matches!(
            block.add_transaction(replay),
            Err(ChainError::ReplayedNonce { .. })
        ));
    }

    #[test]
    fn out_of_order_nonce_is_rejected() {
        let keypair = KeyPair::generate().unwrap();
        let address = keypair.public_key.address().unwrap();
        let mut block = genesis_with_balance(&address, 100);

        let skip_ahead = signed_tx(&keypair, 5, 1, vec![Output::new("bob".to_string(), 10)]);
        assert!(matches!(
            block.add_transaction(skip_ahead),
            Err(ChainError::OutOfOrderNonce { .. })
        ));
    }

    #[test]
    fn insufficient_funds_is_rejected() {
        let keypair = KeyPair::generate().unwrap();
        let address = keypair.public_key.address().unwrap();
        let mut block = genesis_with_balance(&address, 5);

        let tx = signed_tx(&keypair, 0, 1, vec![Output::new("bob".to_string(), 20)]);
        assert!(matches!(
            block.add_transaction(tx),
            Err(ChainError::InsufficientFunds(_))
        ));
    }

    #[test]
    fn rerun_credits_parent_coinbase_and_parents_own_fees_to_parent_reward_addr() {
        let miner = KeyPair::generate().unwrap();
        let miner_address = miner.public_key.address().unwrap();
        let sender = KeyPair::generate().unwrap();
        let sender_address = sender.public_key.address().unwrap();

        // The parent itself carried a fee-paying transaction; that fee isn't
        // credited to the miner until the parent is rerun against *its*
        // child, same as the coinbase reward.
        let mut genesis = genesis_with_balance(&sender_address, 100);
        genesis.reward_addr = miner_address.clone();
        let mut parent = Block::new(miner_address.clone(), Some(&genesis), Target256::max(), 25);
        let parent_tx = signed_tx(&sender, 0, 3, vec![Output::new("bob".to_string(), 10)]);
        parent.add_transaction(parent_tx).unwrap();

        let mut child = Block::new(miner_address.clone(), Some(&parent), Target256::max(), 25);
        child.rerun(&parent).unwrap();

        assert_eq!(child.balance_of(&miner_address), 25 + 3);
        assert_eq!(child.balance_of(&sender_address), 87);
        assert_eq!(child.balance_of("bob"), 10);
    }

    #[test]
    fn total_rewards_sums_fees_and_coinbase() {
        let keypair = KeyPair::generate().unwrap();
        let address = keypair.public_key.address().unwrap();
        let mut block = genesis_with_balance(&address, 100);
        block.coinbase_reward = 25;

        let tx = signed_tx(&keypair, 0, 3, vec![Output::new("bob".to_string(), 10)]);
        block.add_transaction(tx).unwrap();

        assert_eq!(block.total_rewards(), 28);
    }

    #[test]
    fn hash_excludes_balances_and_next_nonce() {
        let keypair = KeyPair::generate().unwrap();
        let address = keypair.public_key.address().unwrap();
        let mut a = genesis_with_balance(&address, 100);
        let mut b = genesis_with_balance(&address, 5000);
        a.timestamp = b.timestamp;
        assert_eq!(a.hash().unwrap(), b.hash().unwrap());
    }
}
