//! A single cooperative miner: one bounded burst of proof attempts at a
//! time, sharing the node's chain lock with every other component instead
//! of racing N independent OS threads against disjoint nonce ranges.

use crate::block::Block;
use crate::blockchain::Chain;
use crate::network::{Network, PROOF_FOUND};
use crate::set::HashIndexedSet;
use crate::transaction::Transaction;
use shared::KeyPair;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Mines new blocks atop the chain it shares with every other node
/// component, pausing between bounded bursts so inbound messages get a turn.
///
/// The block under construction (`candidate`) is persistent across bursts:
/// a burst only advances its `proof` field, it never rebuilds the candidate
/// from scratch. The candidate is only rebuilt by `start_new_search`, which
/// runs exactly when the search actually needs to restart — after this miner
/// lands a block of its own, or after `sync_transactions` decides the chain
/// moved out from under it.
pub struct Miner {
    chain: Arc<Mutex<Chain>>,
    reward_addr: String,
    mining_rounds: u32,
    coinbase_amount: u32,
    mempool: Mutex<HashIndexedSet<String, Transaction>>,
    candidate: Mutex<Block>,
}

impl Miner {
    /// # Errors
    ///
    /// Returns an error if the keypair's address cannot be derived.
    pub fn new(
        chain: Arc<Mutex<Chain>>,
        keypair: &KeyPair,
        mining_rounds: u32,
        coinbase_amount: u32,
    ) -> shared::Result<Self> {
        let reward_addr = keypair.public_key.address()?;
        let candidate = {
            let tip = chain.lock().expect("chain lock poisoned").tip().clone();
            Block::new(reward_addr.clone(), Some(&tip), tip.target, coinbase_amount)
        };

        Ok(Self {
            chain,
            reward_addr,
            mining_rounds,
            coinbase_amount,
            mempool: Mutex::new(HashIndexedSet::new()),
            candidate: Mutex::new(candidate),
        })
    }

    /// Adds a received transaction to the mempool so it is a candidate for
    /// inclusion in the next block this miner assembles.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be hashed.
    pub fn add_transaction(&self, tx: Transaction) -> shared::Result<()> {
        let id = tx.id()?.to_string();
        self.mempool.lock().expect("mempool lock poisoned").add(id, tx);
        Ok(())
    }

    #[must_use]
    pub fn mempool_len(&self) -> usize {
        self.mempool.lock().expect("mempool lock poisoned").len()
    }

    /// Runs one cooperative mining burst: advances the persistent candidate's
    /// proof by up to `mining_rounds` consecutive values, without rebuilding
    /// it or touching the chain lock unless a proof actually turns up.
    /// Returns `true` and announces the block if a proof was found.
    pub fn run_burst(&self, network: &dyn Network) -> bool {
        let mined = {
            let mut candidate = self.candidate.lock().expect("candidate lock poisoned");
            let pause_point = candidate.proof.wrapping_add(self.mining_rounds);
            let mut found = false;
            while candidate.proof < pause_point {
                if candidate.has_valid_proof().unwrap_or(false) {
                    found = true;
                    break;
                }
                candidate.proof = candidate.proof.wrapping_add(1);
            }
            if !found {
                return false;
            }
            candidate.clone()
        };

        let accepted = {
            let mut chain = self.chain.lock().expect("chain lock poisoned");
            chain.receive_block(mined.clone())
        };
        if let Err(err) = accepted {
            warn!(%err, "mined block rejected by own chain manager");
            // Don't retry the exact same (rejected) proof forever.
            let mut candidate = self.candidate.lock().expect("candidate lock poisoned");
            candidate.proof = candidate.proof.wrapping_add(1);
            return false;
        }

        self.start_new_search(Vec::new());

        if let Ok(data) = serde_json::to_vec(&mined) {
            network.broadcast(PROOF_FOUND, data);
        }
        if let Ok(hash) = mined.hash() {
            info!(%hash, chain_length = mined.chain_length, "⛏️ found proof");
        }
        true
    }

    /// Rebuilds the candidate atop the chain's current tip: `carry_over`
    /// transactions (typically recovered from an abandoned fork) are merged
    /// into the mempool first, then the whole mempool is replayed into the
    /// fresh candidate and cleared. A transaction that fails to admit (stale
    /// nonce, insufficient funds, already included upstream) is dropped here
    /// rather than retried forever — if it's still valid, its sender's own
    /// node will re-announce it.
    fn start_new_search(&self, carry_over: Vec<Transaction>) {
        let tip = {
            let chain = self.chain.lock().expect("chain lock poisoned");
            chain.tip().clone()
        };
        let mut new_candidate = Block::new(
            self.reward_addr.clone(),
            Some(&tip),
            tip.target,
            self.coinbase_amount,
        );

        let mut mempool = self.mempool.lock().expect("mempool lock poisoned");
        for tx in carry_over {
            if let Ok(id) = tx.id() {
                mempool.add(id.to_string(), tx);
            }
        }
        for tx in mempool.to_vec() {
            let _ = new_candidate.add_transaction(tx);
        }
        mempool.clear();
        drop(mempool);

        *self.candidate.lock().expect("candidate lock poisoned") = new_candidate;
    }

    /// Recomputes the mempool after the chain's tip may have moved out from
    /// under this miner's in-flight candidate (a block arrived from the
    /// network between bursts, possibly as part of a reorg).
    ///
    /// A cheap guard first rules out the common case where the new tip isn't
    /// actually ahead of the candidate: nothing to do, and walking the whole
    /// chain back on every inbound block would both waste work and needlessly
    /// throw away search progress. When the tip has genuinely moved ahead,
    /// the candidate's own ancestor chain (starting from the block it was
    /// built on) is walked alongside the new tip's ancestor chain until they
    /// meet at a common ancestor; every transaction unique to the candidate's
    /// side carries over into the next search, every transaction unique to
    /// the adopted side is dropped from the mempool.
    pub fn sync_transactions(&self, chain: &Chain) {
        let candidate_parent = {
            let candidate = self.candidate.lock().expect("candidate lock poisoned");
            match candidate.prev_hash {
                Some(hash) => hash,
                None => return,
            }
        };

        let old_head = match chain.get_block(&candidate_parent) {
            Some(block) => block.clone(),
            None => return,
        };
        let new_head = chain.tip().clone();

        if new_head.chain_length <= old_head.chain_length {
            return;
        }

        let mut abandoned = HashIndexedSet::<String, Transaction>::new();
        let mut adopted = HashIndexedSet::<String, Transaction>::new();

        extend(&mut abandoned, &old_head);
        let mut old_cursor = old_head.prev_hash.and_then(|h| chain.get_block(&h).cloned());
        let mut new_cursor = Some(new_head);

        while let (Some(old_block), Some(new_block)) = (&old_cursor, &new_cursor) {
            if old_block.hash().ok() == new_block.hash().ok() {
                break;
            }
            if new_block.chain_length > old_block.chain_length {
                extend(&mut adopted, new_block);
                new_cursor = new_block.prev_hash.and_then(|h| chain.get_block(&h).cloned());
            } else {
                extend(&mut abandoned, old_block);
                old_cursor = old_block.prev_hash.and_then(|h| chain.get_block(&h).cloned());
            }
        }

        let mut carry_over = Vec::new();
        for key in abandoned.keys() {
            if !adopted.contains(key) {
                if let Some(tx) = abandoned.get(key) {
                    carry_over.push(tx.clone());
                }
            }
        }

        self.start_new_search(carry_over);
    }
}

fn extend(set: &mut HashIndexedSet<String, Transaction>, block: &Block) {
    for tx in &block.transactions {
        if let Ok(id) = tx.id() {
            set.add(id.to_string(), tx.clone());
        }
    }
}
