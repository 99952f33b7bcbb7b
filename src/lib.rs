//! Block Sealer
//!
//! Proof-of-work sealing for a single block:
//! - Blake2s-256 digest over the block's previous hash, timestamp, payload and nonce
//! - Block record whose nonce and digest only ever change together
//! - Sequential nonce search with cancellation, attempt caps and deadlines
//! - Multi-threaded search over disjoint nonce ranges, first success wins
//!
//! ```no_run
//! use block_sealer::{miner, Block, Difficulty};
//!
//! let block = Block::genesis("genesis");
//! let sealed = miner::seal_blocking(block, Difficulty::new(4)?)?;
//! println!("{}", sealed.digest());
//! # Ok::<(), block_sealer::Error>(())
//! ```

#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]
#![forbid(unsafe_code)]

pub mod config;
pub mod core;
pub mod error;
pub mod miner;
pub mod utils;

pub use crate::core::{Block, Difficulty, Digest, Nonce, SealedBlock};
pub use config::Config;
pub use error::{Error, Result};
pub use miner::{CpuSealer, SealOptions, Sealer, Unsealed};

/// Application information
pub const APP_NAME: &str = "block-sealer";
/// Crate version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
