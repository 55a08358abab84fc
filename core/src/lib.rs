pub mod block;
pub mod blockchain;
pub mod error;
pub mod mining;
pub mod network;
pub mod set;
pub mod transaction;
pub mod wire;

pub use block::Block;
pub use blockchain::{Chain, MissingBlockRequest};
pub use error::{ChainError, ChainResult};
pub use mining::Miner;
pub use network::{
    Envelope, MessageSink, Network, MISSING_BLOCK, POST_TRANSACTION, PROOF_FOUND, REGISTER,
    START_MINING,
};
pub use set::HashIndexedSet;
pub use transaction::{Output, Transaction, TransactionInfo};
pub use wire::{canonical_bytes, canonical_bytes_excluding};

// Re-exports of the shared crypto/hash/config surface, for convenience.
pub use shared::{BlockchainError, Hash256, Result, Target256};
