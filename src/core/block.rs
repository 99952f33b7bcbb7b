//! Block record and its sealed form

use crate::core::{digest, Difficulty, Digest, Nonce};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A block under construction or being sealed
///
/// Content fields are fixed at construction. Nonce and digest only change
/// together, through `&mut self` methods that recompute before returning,
/// so every observer sees a consistent pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Block {
    previous_hash: Vec<u8>,
    payload: Vec<u8>,
    created_at: i64,
    nonce: Nonce,
    digest: Digest,
}

impl Block {
    /// Create a block stamped with the current wall-clock time
    pub fn new(payload: impl Into<Vec<u8>>, previous_hash: impl Into<Vec<u8>>) -> Self {
        Self::with_timestamp(payload, previous_hash, chrono::Utc::now().timestamp())
    }

    /// Create a genesis block (empty previous hash)
    pub fn genesis(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(payload, Vec::new())
    }

    /// Create a block with an explicit creation time (Unix seconds)
    pub fn with_timestamp(
        payload: impl Into<Vec<u8>>,
        previous_hash: impl Into<Vec<u8>>,
        created_at: i64,
    ) -> Self {
        Self::at_nonce(payload.into(), previous_hash.into(), created_at, Nonce::ZERO)
    }

    fn at_nonce(payload: Vec<u8>, previous_hash: Vec<u8>, created_at: i64, nonce: Nonce) -> Self {
        let digest = digest::compute(&previous_hash, created_at, &payload, nonce);
        Self {
            previous_hash,
            payload,
            created_at,
            nonce,
            digest,
        }
    }

    /// Copy of this block repositioned at `nonce`, for disjoint range search
    pub(crate) fn restarted_at(&self, nonce: Nonce) -> Self {
        Self::at_nonce(
            self.payload.clone(),
            self.previous_hash.clone(),
            self.created_at,
            nonce,
        )
    }

    /// Recompute and store the digest from the current fields
    pub fn recompute(&mut self) -> Digest {
        self.digest = self.expected_digest();
        self.digest
    }

    /// Advance the nonce by one and recompute the digest in a single step
    ///
    /// Returns `None` without touching the block when the nonce is already
    /// `u64::MAX`.
    pub fn advance_nonce(&mut self) -> Option<Digest> {
        let next = self.nonce.checked_next()?;
        self.nonce = next;
        Some(self.recompute())
    }

    /// True when the stored digest matches the current fields
    pub fn is_consistent(&self) -> bool {
        self.digest == self.expected_digest()
    }

    fn expected_digest(&self) -> Digest {
        digest::compute(&self.previous_hash, self.created_at, &self.payload, self.nonce)
    }

    /// Digest of the prior sealed block (empty for genesis)
    pub fn previous_hash(&self) -> &[u8] {
        &self.previous_hash
    }

    /// The committed payload
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Creation time in Unix seconds
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// Current nonce
    pub fn nonce(&self) -> Nonce {
        self.nonce
    }

    /// Current digest
    pub fn digest(&self) -> Digest {
        self.digest
    }

    /// True for a block with no previous hash
    pub fn is_genesis(&self) -> bool {
        self.previous_hash.is_empty()
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("previous_hash", &hex::encode(&self.previous_hash))
            .field("payload_len", &self.payload.len())
            .field("created_at", &self.created_at)
            .field("nonce", &self.nonce)
            .field("digest", &self.digest)
            .finish()
    }
}

/// A block whose digest satisfied the difficulty it was sealed at
///
/// Read-only: it exposes no mutators and can be shared freely. The
/// difficulty it was sealed at travels with it, and loading a document
/// whose digest does not meet that difficulty fails.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BlockDocument", into = "BlockDocument")]
pub struct SealedBlock {
    block: Block,
    difficulty: Difficulty,
}

impl SealedBlock {
    /// Wrap a block the miner has checked against `difficulty`
    pub(crate) fn from_searched(block: Block, difficulty: Difficulty) -> Self {
        debug_assert!(block.is_consistent() && difficulty.is_met_by(&block.digest));
        Self { block, difficulty }
    }

    /// Check the digest against the content fields and a required difficulty
    pub fn verify(&self, difficulty: Difficulty) -> Result<()> {
        if !self.block.is_consistent() {
            return Err(Error::integrity("digest does not match block contents"));
        }
        if !difficulty.is_met_by(&self.block.digest) {
            return Err(Error::integrity(format!(
                "digest {} does not meet difficulty {}",
                self.block.digest, difficulty
            )));
        }
        Ok(())
    }

    /// Serialize to a JSON document
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a JSON document
    ///
    /// Fails with `Error::Integrity` if the digest does not recompute from
    /// the stored fields or does not meet the stored difficulty.
    pub fn from_json(json: &str) -> Result<Self> {
        let document: BlockDocument = serde_json::from_str(json)?;
        Self::try_from(document)
    }

    /// The underlying block
    pub fn as_block(&self) -> &Block {
        &self.block
    }

    /// Digest of the prior sealed block (empty for genesis)
    pub fn previous_hash(&self) -> &[u8] {
        self.block.previous_hash()
    }

    /// The committed payload
    pub fn payload(&self) -> &[u8] {
        self.block.payload()
    }

    /// Creation time in Unix seconds
    pub fn created_at(&self) -> i64 {
        self.block.created_at()
    }

    /// Final nonce
    pub fn nonce(&self) -> Nonce {
        self.block.nonce()
    }

    /// Final digest
    pub fn digest(&self) -> Digest {
        self.block.digest()
    }

    /// Difficulty the block was sealed at
    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }
}

impl fmt::Debug for SealedBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealedBlock")
            .field("block", &self.block)
            .field("difficulty", &self.difficulty)
            .finish()
    }
}

impl fmt::Display for SealedBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SealedBlock(nonce={}, digest={}, difficulty={})",
            self.nonce(),
            self.digest(),
            self.difficulty
        )
    }
}

/// Persisted layout, in stable field order
#[derive(Serialize, Deserialize)]
struct BlockDocument {
    #[serde(with = "hex::serde")]
    previous_hash: Vec<u8>,
    #[serde(with = "hex::serde")]
    payload: Vec<u8>,
    created_at: i64,
    nonce: Nonce,
    digest: Digest,
    difficulty: Difficulty,
}

impl From<SealedBlock> for BlockDocument {
    fn from(sealed: SealedBlock) -> Self {
        let block = sealed.block;
        Self {
            previous_hash: block.previous_hash,
            payload: block.payload,
            created_at: block.created_at,
            nonce: block.nonce,
            digest: block.digest,
            difficulty: sealed.difficulty,
        }
    }
}

impl TryFrom<BlockDocument> for SealedBlock {
    type Error = Error;

    fn try_from(doc: BlockDocument) -> Result<Self> {
        let block = Block::at_nonce(doc.payload, doc.previous_hash, doc.created_at, doc.nonce);
        if block.digest != doc.digest {
            return Err(Error::integrity(format!(
                "stored digest {} does not match recomputed {}",
                doc.digest, block.digest
            )));
        }
        if !doc.difficulty.is_met_by(&block.digest) {
            return Err(Error::integrity(format!(
                "digest {} does not meet sealing difficulty {}",
                block.digest, doc.difficulty
            )));
        }
        Ok(Self {
            block,
            difficulty: doc.difficulty,
        })
    }
}
