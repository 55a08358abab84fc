//! RSA-2048 signing and address derivation.

use crate::{BlockchainError, Hash256, Result};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

/// Bit size of every keypair minted by this crate.
pub const RSA_KEY_BITS: usize = 2048;

/// Signature algorithms supported by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    Rsa2048Pkcs1v15Sha256,
}

/// An RSA-2048 public key, stored as PKCS#1 DER.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    der: Vec<u8>,
}

/// An RSA-2048 private key, stored as PKCS#1 DER. Zeroized on drop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateKey {
    der: Vec<u8>,
}

/// An RSA-2048 keypair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPair {
    pub public_key: PublicKey,
    pub private_key: PrivateKey,
}

/// A PKCS#1v1.5 signature over the SHA-256 digest of some message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    data: Vec<u8>,
    public_key: PublicKey,
    algorithm: SignatureAlgorithm,
    timestamp: DateTime<Utc>,
}

impl PublicKey {
    /// Builds a public key from its PKCS#1 DER encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes do not decode to a valid RSA public key.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        RsaPublicKey::from_pkcs1_der(&bytes)
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
        Ok(Self { der: bytes })
    }

    /// Returns the PKCS#1 DER encoding of this key.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.der
    }

    #[must_use]
    pub const fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::Rsa2048Pkcs1v15Sha256
    }

    fn to_rsa(&self) -> Result<RsaPublicKey> {
        RsaPublicKey::from_pkcs1_der(&self.der)
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))
    }

    /// Derives this key's account address: `hex(sha256("{n:x}||{e:x}"))` where
    /// `n` and `e` are the public modulus and exponent, each formatted as
    /// lowercase hex with no leading zeros and no `0x` prefix. This exact
    /// format is part of the wire contract and must not change.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored DER is not a valid RSA public key.
    pub fn address(&self) -> Result<String> {
        let key = self.to_rsa()?;
        let material = format!("{:x}||{:x}", key.n(), key.e());
        Ok(Hash256::sha256(material.as_bytes()).to_string())
    }
}

impl PrivateKey {
    /// Builds a private key from its PKCS#1 DER encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes do not decode to a valid RSA private key.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        RsaPrivateKey::from_pkcs1_der(&bytes)
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
        Ok(Self { der: bytes })
    }

    /// Returns the PKCS#1 DER encoding of this key.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.der
    }

    #[must_use]
    pub const fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::Rsa2048Pkcs1v15Sha256
    }

    fn to_rsa(&self) -> Result<RsaPrivateKey> {
        RsaPrivateKey::from_pkcs1_der(&self.der)
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))
    }
}

impl KeyPair {
    /// Generates a new RSA-2048 keypair.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub fn generate() -> Result<Self> {
        let mut rng = OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;
        let public_key = RsaPublicKey::from(&private_key);

        let private_der = private_key
            .to_pkcs1_der()
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?
            .as_bytes()
            .to_vec();
        let public_der = public_key
            .to_pkcs1_der()
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?
            .into_vec();

        Ok(Self {
            public_key: PublicKey { der: public_der },
            private_key: PrivateKey { der: private_der },
        })
    }

    /// Signs a message, returning a PKCS#1v1.5 signature over its SHA-256 digest.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn sign(&self, message: &[u8]) -> Result<Signature> {
        let key = self.private_key.to_rsa()?;
        let digest = Sha256::digest(message);
        let data = key
            .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
            .map_err(|e| BlockchainError::CryptographicError(e.to_string()))?;

        Ok(Signature {
            data,
            public_key: self.public_key.clone(),
            algorithm: SignatureAlgorithm::Rsa2048Pkcs1v15Sha256,
            timestamp: Utc::now(),
        })
    }
}

impl Signature {
    /// Verifies the signature against a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored public key is invalid. A mismatched or
    /// forged signature is reported as `Ok(false)`, not an error.
    pub fn verify(&self, message: &[u8]) -> Result<bool> {
        let key = self.public_key.to_rsa()?;
        let digest = Sha256::digest(message);
        Ok(key
            .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &self.data)
            .is_ok())
    }

    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    #[must_use]
    pub const fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Zeroize for PrivateKey {
    fn zeroize(&mut self) {
        self.der.zeroize();
    }
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

/// Signs a transaction hash with the given keypair.
///
/// # Errors
///
/// Returns an error if signing fails.
pub fn sign_transaction_hash(tx_hash: &Hash256, keypair: &KeyPair) -> Result<Signature> {
    keypair.sign(tx_hash.as_bytes())
}

/// Verifies a signature against a transaction hash.
///
/// # Errors
///
/// Returns an error if the embedded public key is invalid.
pub fn verify_transaction_signature(tx_hash: &Hash256, signature: &Signature) -> Result<bool> {
    signature.verify(tx_hash.as_bytes())
}

/// Creates a public key from its PKCS#1 DER encoding.
///
/// # Errors
///
/// Returns an error if the bytes are invalid.
pub fn public_key_from_bytes(bytes: &[u8]) -> Result<PublicKey> {
    PublicKey::from_bytes(bytes.to_vec())
}

/// Reassembles a signature from its raw components.
#[must_use]
pub fn signature_from_bytes(
    signature_data: Vec<u8>,
    public_key: PublicKey,
    timestamp: DateTime<Utc>,
) -> Signature {
    Signature {
        data: signature_data,
        public_key,
        algorithm: SignatureAlgorithm::Rsa2048Pkcs1v15Sha256,
        timestamp,
    }
}
