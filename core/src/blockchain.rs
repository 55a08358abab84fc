use crate::block::Block;
use crate::error::{ChainError, ChainResult};
use crate::network::{Envelope, Network, MISSING_BLOCK, POST_TRANSACTION};
use crate::set::HashIndexedSet;
use crate::transaction::{Output, Transaction};
use serde::{Deserialize, Serialize};
use shared::types::NodeConfig;
use shared::{Hash256, KeyPair};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A request for a block this node doesn't have, naming both the missing
/// block and where the answer should be sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissingBlockRequest {
    pub requester_address: String,
    pub hash: Hash256,
}

/// The chain manager: ingests blocks from the network, buffers orphans until
/// their parent arrives, tracks the longest valid chain, and manages this
/// node's own outgoing transactions.
pub struct Chain {
    address: String,
    keypair: KeyPair,
    nonce: u32,
    config: NodeConfig,
    network: Arc<dyn Network>,

    blocks: HashMap<Hash256, Block>,
    /// Orphans waiting on a parent, keyed by the missing parent's hash.
    pending_blocks: HashMap<Hash256, HashIndexedSet<Hash256, Block>>,
    last_block: Hash256,
    last_confirmed_block: Hash256,

    pending_outgoing: HashIndexedSet<String, Transaction>,
}

impl Chain {
    /// Starts a new chain manager rooted at `genesis`.
    ///
    /// # Panics
    ///
    /// Panics if `genesis` is not actually a genesis block, or if it cannot
    /// be hashed.
    #[must_use]
    pub fn new(
        keypair: KeyPair,
        network: Arc<dyn Network>,
        config: NodeConfig,
        genesis: Block,
    ) -> Self {
        assert!(genesis.is_genesis(), "starting block must be a genesis block");
        let address = keypair.public_key.address().expect("valid keypair");
        let genesis_hash = genesis.hash().expect("genesis block hashes cleanly");

        let mut blocks = HashMap::new();
        blocks.insert(genesis_hash, genesis);

        Self {
            address,
            keypair,
            nonce: 0,
            config,
            network,
            blocks,
            pending_blocks: HashMap::new(),
            last_block: genesis_hash,
            last_confirmed_block: genesis_hash,
            pending_outgoing: HashIndexedSet::new(),
        }
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub fn tip(&self) -> &Block {
        self.blocks
            .get(&self.last_block)
            .expect("the tip is always a known block")
    }

    #[must_use]
    pub fn tip_hash(&self) -> Hash256 {
        self.last_block
    }

    #[must_use]
    pub fn get_block(&self, hash: &Hash256) -> Option<&Block> {
        self.blocks.get(hash)
    }

    #[must_use]
    pub fn pending_block_count(&self) -> usize {
        self.pending_blocks.values().map(HashIndexedSet::len).sum()
    }

    /// The confirmed balance of `address`: its balance in the last confirmed
    /// block, not the (possibly still-reorganizable) tip.
    #[must_use]
    pub fn confirmed_balance(&self, address: &str) -> u32 {
        self.blocks
            .get(&self.last_confirmed_block)
            .map_or(0, |b| b.balance_of(address))
    }

    /// This node's confirmed balance minus the total of its own not-yet-
    /// confirmed outgoing transactions — what's actually safe to spend.
    #[must_use]
    pub fn available_balance(&self) -> u32 {
        let outgoing: u32 = self
            .pending_outgoing
            .values()
            .filter_map(|tx| tx.total_output().ok())
            .sum();
        self.confirmed_balance(&self.address)
            .saturating_sub(outgoing)
    }

    /// Ingests a block from the network. Duplicates are silently ignored.
    /// A block whose parent is unknown is parked in the pending-orphan queue
    /// (not an error) and the parent is requested, at most once per missing
    /// hash. A block that extends the tip or a longer fork becomes the new
    /// tip.
    ///
    /// # Errors
    ///
    /// Returns an error if the block's proof is invalid, or if replaying its
    /// transactions against its resolved parent fails.
    pub fn receive_block(&mut self, mut block: Block) -> ChainResult<()> {
        let block_hash = block.hash()?;
        if self.blocks.contains_key(&block_hash) {
            return Ok(());
        }

        if !block.is_genesis() && !block.has_valid_proof()? {
            return Err(ChainError::InvalidProof(block_hash.to_string()));
        }

        if !block.is_genesis() {
            let Some(prev_hash) = block.prev_hash else {
                return Err(ChainError::UnknownParent("missing prev_hash".to_string()));
            };
            let parent = match self.blocks.get(&prev_hash) {
                Some(parent) => parent.clone(),
                None => {
                    self.park_orphan(prev_hash, block);
                    return Ok(());
                }
            };
            block.rerun(&parent)?;
        }

        info!(%block_hash, chain_length = block.chain_length, "📦 accepted block");
        self.blocks.insert(block_hash, block);
        let accepted_length = self.blocks[&block_hash].chain_length;

        if accepted_length > self.tip().chain_length {
            self.last_block = block_hash;
            self.set_last_confirmed();
        }

        if let Some(children) = self.pending_blocks.remove(&block_hash) {
            for child in children.to_vec() {
                self.receive_block(child)?;
            }
        }

        Ok(())
    }

    fn park_orphan(&mut self, missing_parent: Hash256, block: Block) {
        let block_hash = block.hash().unwrap_or_else(|_| Hash256::zero());
        let already_requested = self.pending_blocks.contains_key(&missing_parent);

        self.pending_blocks
            .entry(missing_parent)
            .or_default()
            .add(block_hash, block);

        debug!(%missing_parent, %block_hash, "⏳ parked orphan block");
        if !already_requested {
            self.request_missing_block(missing_parent);
        }
    }

    fn request_missing_block(&self, hash: Hash256) {
        let request = MissingBlockRequest {
            requester_address: self.address.clone(),
            hash,
        };
        if let Ok(data) = serde_json::to_vec(&request) {
            self.network.broadcast(MISSING_BLOCK, data);
        }
    }

    /// Answers a [`MissingBlockRequest`] if we have the requested block.
    pub fn provide_missing_block(&self, envelope: &Envelope) {
        let Ok(request) = serde_json::from_slice::<MissingBlockRequest>(&envelope.data) else {
            warn!("received malformed MISSING_BLOCK request");
            return;
        };
        if let Some(block) = self.blocks.get(&request.hash) {
            if let Ok(data) = serde_json::to_vec(block) {
                self.network
                    .send_message(&request.requester_address, crate::network::PROOF_FOUND, data);
            }
        }
    }

    /// Builds, signs, queues and broadcasts a transaction spending from this
    /// node's own account.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::LocalOverspend`] if `fee` plus the sum of
    /// `outputs` exceeds this node's available balance.
    pub fn post_transaction(&mut self, outputs: Vec<Output>, fee: u32) -> ChainResult<Transaction> {
        let requested: u32 = outputs.iter().map(|o| o.amount).sum::<u32>() + fee;
        let available = self.available_balance();
        if requested > available {
            return Err(ChainError::LocalOverspend {
                available,
                requested,
            });
        }

        let mut tx = Transaction::new(
            self.nonce,
            self.keypair.public_key.clone(),
            fee,
            outputs,
            None,
        )?;
        tx.sign(&self.keypair)?;
        self.nonce += 1;

        let tx_id = tx.id()?.to_string();
        self.pending_outgoing.add(tx_id, tx.clone());

        if let Ok(data) = serde_json::to_vec(&tx) {
            self.network.broadcast(POST_TRANSACTION, data);
        }

        Ok(tx)
    }

    /// Rebroadcasts every locally originated transaction not yet confirmed.
    /// Used after reconnecting, or after a reorg drops transactions back out
    /// of the confirmed chain.
    pub fn resend_pending_transactions(&self) {
        for tx in self.pending_outgoing.values() {
            if let Ok(data) = serde_json::to_vec(tx) {
                self.network.broadcast(POST_TRANSACTION, data);
            }
        }
    }

    /// Walks back `confirmed_depth` blocks from the tip to find the new
    /// confirmed block, then prunes any locally originated transaction the
    /// new confirmed block itself contains out of the pending-outgoing set
    /// (it has finally settled, so is no longer this node's concern to
    /// rebroadcast). Transactions in blocks merely passed through on the
    /// way there are left alone — they aren't confirmed yet.
    fn set_last_confirmed(&mut self) {
        let mut cursor = self.last_block;
        for _ in 0..self.config.confirmed_depth {
            let Some(block) = self.blocks.get(&cursor) else {
                break;
            };
            match block.prev_hash {
                Some(parent) => cursor = parent,
                None => break,
            }
        }
        self.last_confirmed_block = cursor;

        if let Some(block) = self.blocks.get(&cursor) {
            for tx in &block.transactions {
                if let Ok(tx_id) = tx.id() {
                    self.pending_outgoing.remove(&tx_id.to_string());
                }
            }
        }
    }

    /// Every address with a nonzero confirmed balance, sorted by address.
    #[must_use]
    pub fn show_all_balances(&self) -> Vec<(String, u32)> {
        let confirmed = self.blocks.get(&self.last_confirmed_block);
        let mut balances: Vec<(String, u32)> = confirmed
            .map(|b| {
                b.balances
                    .iter()
                    .filter(|(_, &amount)| amount > 0)
                    .map(|(addr, &amount)| (addr.clone(), amount))
                    .collect()
            })
            .unwrap_or_default();
        balances.sort_by(|a, b| a.0.cmp(&b.0));
        balances
    }
}
