//! Error handling for block sealing
//!
//! A single error type covers the sealing outcomes (invalid difficulty,
//! cancellation, exhausted search) and the ambient layers around them
//! (configuration, I/O, persisted documents).

use thiserror::Error;

/// Result type alias for sealing operations
pub type Result<T> = std::result::Result<T, Error>;

/// Why a bounded search stopped without a solution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustionReason {
    /// The configured attempt cap was reached
    AttemptLimit,
    /// The configured deadline passed
    Deadline,
    /// The nonce counter reached `u64::MAX`
    NonceSpace,
}

impl std::fmt::Display for ExhaustionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExhaustionReason::AttemptLimit => write!(f, "attempt limit reached"),
            ExhaustionReason::Deadline => write!(f, "deadline passed"),
            ExhaustionReason::NonceSpace => write!(f, "nonce space exhausted"),
        }
    }
}

/// Main error type for block sealing
#[derive(Error, Debug)]
pub enum Error {
    /// Difficulty is negative or longer than the digest's hex form
    #[error("Invalid difficulty {requested}: must be between 0 and {max}")]
    InvalidDifficulty {
        /// Difficulty as given at the boundary
        requested: i64,
        /// Largest accepted difficulty
        max: u32,
    },

    /// The search was stopped by an external request
    #[error("Sealing cancelled at nonce {nonce}")]
    Cancelled {
        /// Nonce of the block when the search stopped
        nonce: u64,
    },

    /// A bounded search ran out without satisfying the predicate
    #[error("No solution found after {attempts} attempts: {reason}")]
    Exhausted {
        /// Digests evaluated before giving up
        attempts: u64,
        /// Which bound was hit
        reason: ExhaustionReason,
    },

    /// A persisted block does not match its recomputed digest
    #[error("Integrity check failed: {0}")]
    Integrity(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Worker thread errors
    #[error("Worker error: {0}")]
    Worker(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Create an invalid difficulty error
    pub fn invalid_difficulty(requested: i64, max: u32) -> Self {
        Self::InvalidDifficulty { requested, max }
    }

    /// Create a cancellation error
    pub fn cancelled(nonce: u64) -> Self {
        Self::Cancelled { nonce }
    }

    /// Create an exhaustion error
    pub fn exhausted(attempts: u64, reason: ExhaustionReason) -> Self {
        Self::Exhausted { attempts, reason }
    }

    /// Create an integrity error
    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a worker error
    pub fn worker(msg: impl Into<String>) -> Self {
        Self::Worker(msg.into())
    }

    /// True for the outcomes of a search that ran, as opposed to input errors
    pub fn is_search_outcome(&self) -> bool {
        matches!(self, Error::Cancelled { .. } | Error::Exhausted { .. })
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::InvalidDifficulty { .. } => "invalid_difficulty",
            Error::Cancelled { .. } => "cancelled",
            Error::Exhausted { .. } => "exhausted",
            Error::Integrity(_) => "integrity",
            Error::Config(_) => "config",
            Error::Worker(_) => "worker",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Yaml(_) => "yaml",
        }
    }
}
