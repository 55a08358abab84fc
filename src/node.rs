//! Wires the chain manager and miner together into a single addressable node
//! and routes inbound network envelopes to the right one of the two.

use node_core::blockchain::Chain;
use node_core::mining::Miner;
use node_core::transaction::Transaction;
use node_core::{Envelope, MessageSink, MISSING_BLOCK, POST_TRANSACTION, PROOF_FOUND};
use std::sync::{Arc, Mutex};
use tracing::warn;

/// A running node: a chain manager plus the miner that keeps proposing
/// blocks on top of it. Cheap to clone; everything of substance lives behind
/// `Arc`.
#[derive(Clone)]
pub struct Node {
    pub chain: Arc<Mutex<Chain>>,
    pub miner: Arc<Miner>,
}

impl Node {
    #[must_use]
    pub fn new(chain: Arc<Mutex<Chain>>, miner: Arc<Miner>) -> Self {
        Self { chain, miner }
    }

    #[must_use]
    pub fn address(&self) -> String {
        self.chain.lock().expect("chain lock poisoned").address().to_string()
    }
}

impl MessageSink for Node {
    fn deliver(&self, msg: &str, data: Vec<u8>) {
        match msg {
            POST_TRANSACTION => match serde_json::from_slice::<Transaction>(&data) {
                Ok(tx) => {
                    if let Err(err) = self.miner.add_transaction(tx) {
                        warn!(%err, "failed to queue received transaction");
                    }
                }
                Err(err) => warn!(%err, "malformed POST_TRANSACTION payload"),
            },
            PROOF_FOUND => match serde_json::from_slice::<node_core::block::Block>(&data) {
                Ok(block) => {
                    let result = self.chain.lock().expect("chain lock poisoned").receive_block(block);
                    match result {
                        Ok(()) => {
                            let chain = self.chain.lock().expect("chain lock poisoned");
                            self.miner.sync_transactions(&chain);
                        }
                        Err(err) => warn!(%err, "rejected block from PROOF_FOUND"),
                    }
                }
                Err(err) => warn!(%err, "malformed PROOF_FOUND payload"),
            },
            MISSING_BLOCK => {
                let envelope = Envelope::new(MISSING_BLOCK.to_string(), data);
                self.chain.lock().expect("chain lock poisoned").provide_missing_block(&envelope);
            }
            other => warn!(msg = other, "no handler for message"),
        }
    }
}
