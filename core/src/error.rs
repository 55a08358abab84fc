use shared::BlockchainError;
use std::fmt;

/// Errors raised by the block state machine, chain manager and miner.
///
/// A local enum wrapping [`BlockchainError`] rather than a flat re-export,
/// so that call sites can match on the specific rejection reason (a
/// transaction's nonce being replayed vs. out of order are kept distinct
/// here, unlike the shared crate's single `NonceNotFound`).
#[derive(Debug, Clone, PartialEq)]
pub enum ChainError {
    /// A transaction with this id is already present in the block.
    DuplicateTransaction(String),
    /// A transaction arrived with no signature attached.
    UnsignedTransaction(String),
    /// A transaction's signature does not verify against its claimed sender.
    InvalidSignature(String),
    /// The sender's balance cannot cover this transaction's outputs and fee.
    InsufficientFunds(String),
    /// A transaction's nonce is strictly below the sender's expected nonce.
    ReplayedNonce {
        address: String,
        expected: u32,
        got: u32,
    },
    /// A transaction's nonce is strictly above the sender's expected nonce.
    OutOfOrderNonce {
        address: String,
        expected: u32,
        got: u32,
    },
    /// A block's proof does not satisfy its target.
    InvalidProof(String),
    /// A block's parent is not yet known locally; not necessarily an error —
    /// the chain manager parks the block rather than rejecting it, but
    /// surfaces this to callers that need to know why.
    UnknownParent(String),
    /// Re-deriving a block's ledger against a new parent failed (e.g. one of
    /// its transactions no longer admits cleanly).
    RerunFailed(String),
    /// A locally authored transaction would exceed the account's available
    /// balance (confirmed balance minus pending outgoing transactions).
    LocalOverspend { available: u32, requested: u32 },
    /// The node's persisted state file could not be loaded.
    ConfigLoad(String),
    /// A lower-level crypto, hash or wire-format error.
    Shared(BlockchainError),
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateTransaction(id) => write!(f, "duplicate transaction {id}"),
            Self::UnsignedTransaction(id) => write!(f, "unsigned transaction {id}"),
            Self::InvalidSignature(id) => write!(f, "invalid signature for transaction {id}"),
            Self::InsufficientFunds(id) => write!(f, "insufficient funds for transaction {id}"),
            Self::ReplayedNonce {
                address,
                expected,
                got,
            } => write!(
                f,
                "replayed transaction from {address}: expected nonce {expected}, got {got}"
            ),
            Self::OutOfOrderNonce {
                address,
                expected,
                got,
            } => write!(
                f,
                "out-of-order transaction from {address}: expected nonce {expected}, got {got}"
            ),
            Self::InvalidProof(id) => write!(f, "invalid proof for block {id}"),
            Self::UnknownParent(hash) => write!(f, "unknown parent block {hash}"),
            Self::RerunFailed(reason) => write!(f, "failed to rerun block: {reason}"),
            Self::LocalOverspend {
                available,
                requested,
            } => write!(
                f,
                "account doesn't have enough balance for transaction: available {available}, requested {requested}"
            ),
            Self::ConfigLoad(reason) => write!(f, "failed to load node state: {reason}"),
            Self::Shared(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ChainError {}

impl From<BlockchainError> for ChainError {
    fn from(err: BlockchainError) -> Self {
        Self::Shared(err)
    }
}

/// Alias for `Result` with [`ChainError`].
pub type ChainResult<T> = std::result::Result<T, ChainError>;
