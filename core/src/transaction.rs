use crate::wire::canonical_bytes;
use serde::{Deserialize, Serialize};
use shared::{BlockchainError, Hash256, KeyPair, PublicKey, Result, Signature};

/// A single payment to an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub address: String,
    pub amount: u32,
}

impl Output {
    #[must_use]
    pub const fn new(address: String, amount: u32) -> Self {
        Self { address, amount }
    }
}

/// The signed portion of a transaction. This, not the enclosing
/// `Transaction`, is what gets hashed for the transaction id and what gets
/// signed — the signature can never cover itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionInfo {
    pub from: String,
    pub nonce: u32,
    pub public_key: PublicKey,
    pub fee: u32,
    pub outputs: Vec<Output>,
    pub data: Option<String>,
}

/// A transaction moving value out of one account into one or more others.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub info: TransactionInfo,
    pub signature: Option<Signature>,
}

impl Transaction {
    /// Builds an unsigned transaction. The sender's address is derived from
    /// `public_key`, not taken on trust from the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the public key's address cannot be derived.
    pub fn new(
        nonce: u32,
        public_key: PublicKey,
        fee: u32,
        outputs: Vec<Output>,
        data: Option<String>,
    ) -> Result<Self> {
        if outputs.is_empty() {
            return Err(BlockchainError::InvalidTransaction(
                "a transaction must have at least one output".into(),
            ));
        }
        let from = public_key.address()?;
        Ok(Self {
            info: TransactionInfo {
                from,
                nonce,
                public_key,
                fee,
                outputs,
                data,
            },
            signature: None,
        })
    }

    /// Signs this transaction's `info` with `keypair`, replacing any existing
    /// signature. `keypair`'s public key must match `info.from`.
    ///
    /// # Errors
    ///
    /// Returns an error if hashing or signing fails.
    pub fn sign(&mut self, keypair: &KeyPair) -> Result<()> {
        let id = self.id()?;
        self.signature = Some(keypair.sign(id.as_bytes())?);
        Ok(())
    }

    /// The transaction id: the hash of its `info`, excluding the signature.
    ///
    /// # Errors
    ///
    /// Returns an error if canonical encoding fails.
    pub fn id(&self) -> Result<Hash256> {
        let bytes = canonical_bytes(&self.info)?;
        Ok(Hash256::sha256(&bytes))
    }

    /// Verifies the signature against this transaction's id and the sender's
    /// claimed public key.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no signature to verify, or if hashing or
    /// signature verification fails.
    pub fn verify_signature(&self) -> Result<bool> {
        let Some(signature) = &self.signature else {
            return Err(BlockchainError::InvalidSignature);
        };
        if signature.public_key().address()? != self.info.from {
            return Ok(false);
        }
        let id = self.id()?;
        signature.verify(id.as_bytes())
    }

    /// Sum of this transaction's outputs plus its fee — the total debited
    /// from the sender's balance.
    ///
    /// # Errors
    ///
    /// Returns an error on `u32` overflow.
    pub fn total_output(&self) -> Result<u32> {
        let mut total = self.info.fee;
        for output in &self.info.outputs {
            total = total
                .checked_add(output.amount)
                .ok_or_else(|| BlockchainError::InvalidTransaction("amount overflow".into()))?;
        }
        Ok(total)
    }
}
