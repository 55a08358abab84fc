use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;

/// 256-bit hash used to identify blocks, transactions and addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash256([u8; 32]);

impl Hash256 {
    /// Creates a zeroed hash
    #[must_use]
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Creates a hash from a 32-byte array
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes of the hash
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Computes the SHA-256 digest of the provided data
    #[must_use]
    pub fn sha256(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let result = hasher.finalize();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        Self(hash)
    }

    /// Interprets this hash as a big-endian 256-bit unsigned integer.
    #[must_use]
    pub const fn as_target(&self) -> Target256 {
        Target256(self.0)
    }

    /// Counts the number of leading zero bits in the hash.
    #[must_use]
    pub fn leading_zeros(&self) -> u32 {
        let mut zeros = 0;
        for &byte in &self.0 {
            if byte == 0 {
                zeros += 8;
            } else {
                zeros += byte.leading_zeros();
                break;
            }
        }
        zeros
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// A 256-bit unsigned integer, big-endian byte order, used as a proof-of-work
/// target. Comparisons are plain big-endian magnitude comparisons — this is
/// deliberately not reduced to a leading-zero-bit count, since an arbitrary
/// target is not always a power of two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target256([u8; 32]);

impl Target256 {
    /// The maximum representable target: `2^256 - 1`.
    #[must_use]
    pub const fn max() -> Self {
        Self([0xff; 32])
    }

    /// Builds a target of the form `(2^256 - 1) >> leading_zero_bits`,
    /// i.e. the maximum value with `leading_zero_bits` leading zero bits.
    #[must_use]
    pub fn with_leading_zero_bits(leading_zero_bits: u32) -> Self {
        let leading_zero_bits = leading_zero_bits.min(256);
        let mut bytes = [0u8; 32];
        let full_zero_bytes = (leading_zero_bits / 8) as usize;
        let remaining_bits = leading_zero_bits % 8;
        for byte in bytes.iter_mut().skip(full_zero_bytes) {
            *byte = 0xff;
        }
        if full_zero_bytes < 32 && remaining_bits > 0 {
            bytes[full_zero_bytes] = 0xffu8 >> remaining_bits;
        }
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl PartialOrd for Target256 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Target256 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Display for Target256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}
