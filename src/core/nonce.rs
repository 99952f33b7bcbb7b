//! Nonce type for proof-of-work search

use serde::{Deserialize, Serialize};
use std::fmt;

/// 64-bit search counter mixed into a block's digest
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Nonce(pub u64);

impl Nonce {
    /// First nonce of every fresh block
    pub const ZERO: Nonce = Nonce(0);

    /// Create a new Nonce
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the inner value
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The next nonce, or `None` once the counter would overflow
    pub fn checked_next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }

    /// Convert nonce to little-endian bytes
    pub fn to_le_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Nonce {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Nonce> for u64 {
    fn from(nonce: Nonce) -> Self {
        nonce.0
    }
}
