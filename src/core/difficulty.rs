//! Difficulty: the number of leading sentinel characters a sealed digest needs

use crate::core::constants::MAX_DIFFICULTY;
use crate::core::Digest;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Validated difficulty in `0..=MAX_DIFFICULTY`
///
/// The predicate is met when the first `difficulty` characters of the
/// digest's hex form are all `'0'`. Difficulty 0 is met by every digest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(try_from = "i64", into = "u32")]
pub struct Difficulty(u32);

impl Difficulty {
    /// Difficulty that every digest satisfies
    pub const NONE: Difficulty = Difficulty(0);

    /// Create a difficulty, rejecting values past the digest's hex length
    pub fn new(value: u32) -> Result<Self> {
        if value > MAX_DIFFICULTY {
            return Err(Error::invalid_difficulty(value as i64, MAX_DIFFICULTY));
        }
        Ok(Self(value))
    }

    /// Get the inner value
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Check a digest against this difficulty
    pub fn is_met_by(self, digest: &Digest) -> bool {
        digest.has_sentinel_prefix(self.0)
    }

    /// Expected number of attempts under a uniform digest model (16^difficulty)
    pub fn expected_attempts(self) -> f64 {
        16f64.powi(self.0 as i32)
    }
}

impl TryFrom<i64> for Difficulty {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        if value < 0 || value > MAX_DIFFICULTY as i64 {
            return Err(Error::invalid_difficulty(value, MAX_DIFFICULTY));
        }
        Ok(Self(value as u32))
    }
}

impl From<Difficulty> for u32 {
    fn from(difficulty: Difficulty) -> Self {
        difficulty.0
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
