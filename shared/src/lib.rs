pub mod crypto;
pub mod error;
pub mod hash;
pub mod types;

pub use crypto::{
    public_key_from_bytes, sign_transaction_hash, signature_from_bytes,
    verify_transaction_signature, KeyPair, PrivateKey, PublicKey, Signature, SignatureAlgorithm,
};
pub use error::BlockchainError;
pub use hash::{Hash256, Target256};

pub type Result<T> = std::result::Result<T, BlockchainError>;
