//! Shared type aliases and small value types used across the workspace.

use serde::{Deserialize, Serialize};

/// Transaction id (hash of its `TransactionInfo`).
pub type TxId = crate::Hash256;

/// Block id (hash of the block, excluding its balance/nonce tables).
pub type BlockId = crate::Hash256;

/// An account address: `hex(sha256("{n:x}||{e:x}"))` of its RSA public key.
pub type Address = String;

/// Account balance, in whole coins.
pub type Amount = u32;

/// Per-account transaction nonce.
pub type Nonce = u32;

/// Chain length (number of blocks since, and including, genesis).
pub type ChainLength = u32;

/// Network environment a node is configured for.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkType {
    /// Main production network.
    Mainnet,
    /// Test network.
    Testnet,
    /// Local development network.
    #[default]
    Devnet,
}

/// A node's persisted, user-editable configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Network environment.
    pub network: NetworkType,
    /// TCP address this node listens on for peer connections.
    pub listen_address: String,
    /// Connection strings of peers to register with on startup.
    pub bootstrap_peers: Vec<String>,
    /// Maximum nonce values tried per mining burst before yielding the node lock.
    pub mining_rounds: u32,
    /// Fee used for locally authored transactions that don't specify one.
    pub default_tx_fee: Amount,
    /// Reward credited to a block's `reward_addr` on confirmation.
    pub coinbase_amount: Amount,
    /// Number of blocks a tip must lead by before its ancestors are confirmed.
    pub confirmed_depth: u32,
    /// Leading zero bits required of the genesis block's target.
    pub genesis_difficulty_bits: u32,
    /// Path to the node's persisted state file (keypair, peers, tip).
    pub state_file: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: NetworkType::Devnet,
            listen_address: "127.0.0.1:9000".to_string(),
            bootstrap_peers: vec![],
            mining_rounds: 2000,
            default_tx_fee: 1,
            coinbase_amount: 25,
            confirmed_depth: 6,
            genesis_difficulty_bits: 15,
            state_file: "node.json".to_string(),
        }
    }
}

/// Snapshot statistics about the locally known chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainStats {
    /// Length of the current tip.
    pub chain_length: ChainLength,
    /// Hash of the current tip.
    pub tip_hash: BlockId,
    /// Total number of transactions across the whole chain.
    pub total_transactions: u64,
    /// Number of blocks buffered in the pending-orphan queue.
    pub pending_blocks: u64,
}

/// Information about a known peer connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInfo {
    /// The peer's account address.
    pub address: Address,
    /// The peer's TCP connection string (`host:port`).
    pub connection: String,
}
