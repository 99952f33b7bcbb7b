//! Proof-of-work search
//!
//! [`seal`] is the sequential search: a pure function over an owned block,
//! a difficulty and explicit cancellation/bound inputs. [`CpuSealer`] runs
//! that search on dedicated threads, optionally splitting the nonce space
//! across several of them.

use crate::core::{Block, Difficulty, Digest, Nonce, SealedBlock};
use crate::error::Error;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::Span;

pub mod cpu;
mod search;

pub use cpu::CpuSealer;
pub use search::{seal, seal_blocking};

/// Where a block is in the sealing state machine
///
/// `Unsealed -> Searching -> {Sealed | Failed | Cancelled}`; the last three
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealState {
    /// Constructed, not yet handed to a search
    Unsealed,
    /// A search is advancing the nonce
    Searching,
    /// The digest met the difficulty
    Sealed,
    /// The search stopped on a bound without a solution
    Failed,
    /// The search was cancelled; the block is left unsealed
    Cancelled,
}

impl SealState {
    /// True once no further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SealState::Sealed | SealState::Failed | SealState::Cancelled
        )
    }
}

impl std::fmt::Display for SealState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SealState::Unsealed => "unsealed",
            SealState::Searching => "searching",
            SealState::Sealed => "sealed",
            SealState::Failed => "failed",
            SealState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Snapshot of a search, taken between steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SealProgress {
    /// State at the time of the snapshot
    pub state: SealState,
    /// Nonce of the block
    pub nonce: Nonce,
    /// Digest matching `nonce`
    pub digest: Digest,
    /// Digests evaluated so far by the reporting search
    pub attempts: u64,
}

impl SealProgress {
    /// Snapshot of a block that has not been searched yet
    pub fn unsealed(block: &Block) -> Self {
        Self::of(block, SealState::Unsealed, 0)
    }

    fn of(block: &Block, state: SealState, attempts: u64) -> Self {
        Self {
            state,
            nonce: block.nonce(),
            digest: block.digest(),
            attempts,
        }
    }
}

/// Publishes [`SealProgress`] snapshots to any number of watchers
///
/// Once a terminal snapshot has been published nothing else is sent.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: Arc<watch::Sender<SealProgress>>,
    terminal: bool,
}

impl ProgressReporter {
    /// Create a reporter and a receiver primed with `block`'s current state
    pub fn channel(block: &Block) -> (Self, watch::Receiver<SealProgress>) {
        let (tx, rx) = watch::channel(SealProgress::unsealed(block));
        (
            Self {
                tx: Arc::new(tx),
                terminal: true,
            },
            rx,
        )
    }

    /// Copy that only publishes `Searching` snapshots, for a search whose
    /// outcome is reported by someone else
    fn searching_only(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
            terminal: false,
        }
    }

    fn report(&self, block: &Block, state: SealState, attempts: u64) {
        if state.is_terminal() && !self.terminal {
            return;
        }
        let snapshot = SealProgress::of(block, state, attempts);
        self.tx.send_if_modified(|current| {
            if current.state.is_terminal() {
                return false;
            }
            *current = snapshot;
            true
        });
    }
}

/// Bounds and observation hooks for a search
#[derive(Debug, Clone)]
pub struct SealOptions {
    /// Stop with `Exhausted` after this many digests (at least one is checked)
    pub max_attempts: Option<u64>,
    /// Stop with `Exhausted` once this instant has passed
    pub deadline: Option<Instant>,
    /// Digests between progress snapshots
    pub progress_interval: u64,
    /// Receives progress snapshots
    pub progress: Option<ProgressReporter>,
}

impl SealOptions {
    /// Default number of digests between progress snapshots
    pub const DEFAULT_PROGRESS_INTERVAL: u64 = 100_000;

    /// Unbounded search without progress reporting
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            deadline: None,
            progress_interval: Self::DEFAULT_PROGRESS_INTERVAL,
            progress: None,
        }
    }

    /// Cap the number of digests evaluated
    pub fn with_max_attempts(mut self, max_attempts: u64) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Stop after `timeout` from now
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Stop at a fixed instant
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Publish snapshots every `interval` digests
    pub fn with_progress(mut self, reporter: ProgressReporter, interval: u64) -> Self {
        self.progress = Some(reporter);
        self.progress_interval = interval.max(1);
        self
    }
}

impl Default for SealOptions {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// A search that ended without sealing, with the block handed back
///
/// The block's nonce and digest are the last consistent pair the search
/// produced.
#[derive(Debug, thiserror::Error)]
#[error("{reason}")]
pub struct Unsealed {
    block: Block,
    reason: Error,
}

impl Unsealed {
    /// Pair a block with the reason it was not sealed
    pub fn new(block: Block, reason: Error) -> Self {
        Self { block, reason }
    }

    /// The unsealed block
    pub fn block(&self) -> &Block {
        &self.block
    }

    /// Why sealing stopped
    pub fn reason(&self) -> &Error {
        &self.reason
    }

    /// Take back the block
    pub fn into_block(self) -> Block {
        self.block
    }

    /// Split into block and reason
    pub fn into_parts(self) -> (Block, Error) {
        (self.block, self.reason)
    }
}

impl From<Unsealed> for Error {
    fn from(unsealed: Unsealed) -> Self {
        unsealed.reason
    }
}

/// Statistics for a sealer
#[derive(Debug, Clone, Default)]
pub struct SealStats {
    /// Total digests evaluated
    pub total_attempts: u64,
    /// Number of blocks sealed
    pub blocks_sealed: u64,
    /// Time spent searching
    pub elapsed: Duration,
    /// Average digests per second
    pub hash_rate: f64,
}

/// Trait for sealer implementations
///
/// A sealer owns the block for the duration of the search and either
/// returns it sealed or hands it back inside [`Unsealed`].
#[async_trait]
pub trait Sealer: Send + Sync {
    /// Get the sealer type name for logging
    fn sealer_type(&self) -> &'static str;

    /// Search for a nonce meeting `difficulty`
    async fn seal(
        &self,
        block: Block,
        difficulty: Difficulty,
        options: SealOptions,
        cancellation: CancellationToken,
    ) -> Result<SealedBlock, Unsealed>;

    /// Get statistics for the searches run so far
    fn stats(&self) -> SealStats {
        SealStats::default()
    }
}

/// Create a tracing span for a sealing operation
pub fn seal_span(sealer_type: &str, difficulty: Difficulty, threads: usize) -> Span {
    tracing::info_span!(
        "seal",
        sealer_type = sealer_type,
        difficulty = difficulty.value(),
        threads = threads,
    )
}
