//! Block digest computation
//!
//! The digest is Blake2s-256 over a length-framed preimage of the block's
//! content fields and nonce:
//!
//! ```text
//! len(previous_hash) u64 LE | previous_hash | created_at i64 LE |
//! len(payload) u64 LE | payload | nonce u64 LE
//! ```
//!
//! Framing the variable-length fields keeps distinct field splits from
//! producing the same preimage.

use crate::core::constants::{DIGEST_HEX_LEN, DIGEST_SIZE};
use crate::core::Nonce;
use crate::error::{Error, Result};
use blake2::{Blake2s256, Digest as _};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte block digest
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; DIGEST_SIZE]);

impl Digest {
    /// Create a Digest from raw bytes
    pub const fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the digest as bytes
    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    /// Canonical string form: 64 lowercase hex characters
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a digest from its hex form
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| Error::integrity(format!("Invalid digest hex: {}", e)))?;
        if bytes.len() != DIGEST_SIZE {
            return Err(Error::integrity(format!(
                "Expected {} digest bytes, got {}",
                DIGEST_SIZE,
                bytes.len()
            )));
        }

        let mut array = [0u8; DIGEST_SIZE];
        array.copy_from_slice(&bytes);
        Ok(Self(array))
    }

    /// Number of leading `'0'` characters in the hex form
    pub fn leading_zero_nibbles(&self) -> u32 {
        let mut count = 0;
        for byte in self.0 {
            if byte == 0 {
                count += 2;
                continue;
            }
            if byte >> 4 == 0 {
                count += 1;
            }
            break;
        }
        count
    }

    /// True when the first `prefix_len` hex characters are all the sentinel
    pub fn has_sentinel_prefix(&self, prefix_len: u32) -> bool {
        debug_assert!(prefix_len as usize <= DIGEST_HEX_LEN);
        self.leading_zero_nibbles() >= prefix_len
    }
}

/// Compute the digest of a block's fields at the given nonce
pub fn compute(previous_hash: &[u8], created_at: i64, payload: &[u8], nonce: Nonce) -> Digest {
    let mut hasher = Blake2s256::new();
    hasher.update((previous_hash.len() as u64).to_le_bytes());
    hasher.update(previous_hash);
    hasher.update(created_at.to_le_bytes());
    hasher.update((payload.len() as u64).to_le_bytes());
    hasher.update(payload);
    hasher.update(nonce.to_le_bytes());
    Digest(hasher.finalize().into())
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hex = String::deserialize(deserializer)?;
        Self::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}
