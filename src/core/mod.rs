//! Core types for block sealing
//!
//! This module contains the digest function, the block record and the
//! types the miner works with: Nonce, Difficulty and Digest.

mod block;
pub mod digest;
mod difficulty;
mod nonce;

pub use block::{Block, SealedBlock};
pub use difficulty::Difficulty;
pub use digest::Digest;
pub use nonce::Nonce;

/// Constants for the digest and its predicate
pub mod constants {
    /// Size of a digest in bytes (Blake2s-256)
    pub const DIGEST_SIZE: usize = 32;

    /// Length of a digest's canonical hex form
    pub const DIGEST_HEX_LEN: usize = DIGEST_SIZE * 2;

    /// Character a sealed digest's prefix must consist of
    pub const SENTINEL: char = '0';

    /// Largest satisfiable difficulty
    pub const MAX_DIFFICULTY: u32 = DIGEST_HEX_LEN as u32;
}


#[cfg(test)]
mod tests_property;
