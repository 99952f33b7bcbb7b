//! Sequential nonce search

use super::{SealOptions, SealState, Unsealed};
use crate::core::{Block, Difficulty, Nonce, SealedBlock};
use crate::error::{Error, ExhaustionReason};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Digests between deadline checks
const DEADLINE_CHECK_INTERVAL: u64 = 1024;

/// Seal `block` at `difficulty`, blocking the calling thread
///
/// Checks the current digest, then advances the nonce by one and
/// recomputes until the predicate holds. The token is checked at every
/// step. Bounds in `options` stop the search with `Exhausted`; reaching
/// `u64::MAX` does too.
pub fn seal(
    block: Block,
    difficulty: Difficulty,
    options: &SealOptions,
    cancellation: &CancellationToken,
) -> Result<SealedBlock, Unsealed> {
    let attempts = AtomicU64::new(0);
    search_range(block, difficulty, options, cancellation, None, &attempts)
}

/// Seal with no bounds and no way to cancel
pub fn seal_blocking(block: Block, difficulty: Difficulty) -> Result<SealedBlock, Unsealed> {
    seal(
        block,
        difficulty,
        &SealOptions::unbounded(),
        &CancellationToken::new(),
    )
}

/// Search from the block's current nonce up to (not including) `end`
///
/// Digests evaluated are added to `total_attempts` as the search goes.
pub(crate) fn search_range(
    mut block: Block,
    difficulty: Difficulty,
    options: &SealOptions,
    cancellation: &CancellationToken,
    end: Option<Nonce>,
    total_attempts: &AtomicU64,
) -> Result<SealedBlock, Unsealed> {
    let start = block.nonce();
    let progress_interval = options.progress_interval.max(1);
    let mut attempts = 0u64;
    let mut unreported = 0u64;

    debug!(
        start = %start,
        end = ?end.map(Nonce::value),
        difficulty = %difficulty,
        "Starting nonce search"
    );
    report(options, &block, SealState::Searching, attempts);

    let outcome = loop {
        attempts += 1;
        unreported += 1;

        if difficulty.is_met_by(&block.digest()) {
            break Ok(());
        }

        if cancellation.is_cancelled() {
            break Err(Error::cancelled(block.nonce().value()));
        }

        if options.max_attempts.is_some_and(|max| attempts >= max) {
            break Err(Error::exhausted(attempts, ExhaustionReason::AttemptLimit));
        }

        if attempts % DEADLINE_CHECK_INTERVAL == 0
            && options.deadline.is_some_and(|deadline| Instant::now() >= deadline)
        {
            break Err(Error::exhausted(attempts, ExhaustionReason::Deadline));
        }

        if end.is_some() && block.nonce().checked_next() == end {
            break Err(Error::exhausted(attempts, ExhaustionReason::NonceSpace));
        }

        if block.advance_nonce().is_none() {
            break Err(Error::exhausted(attempts, ExhaustionReason::NonceSpace));
        }

        if unreported >= progress_interval {
            total_attempts.fetch_add(unreported, Ordering::Relaxed);
            unreported = 0;
            trace!(nonce = %block.nonce(), attempts, "Search progress");
            report(options, &block, SealState::Searching, attempts);
        }
    };

    total_attempts.fetch_add(unreported, Ordering::Relaxed);

    match outcome {
        Ok(()) => {
            debug!(
                nonce = %block.nonce(),
                digest = %block.digest(),
                attempts,
                "Nonce search succeeded"
            );
            report(options, &block, SealState::Sealed, attempts);
            Ok(SealedBlock::from_searched(block, difficulty))
        }
        Err(reason) => {
            let state = match reason {
                Error::Cancelled { .. } => SealState::Cancelled,
                _ => SealState::Failed,
            };
            debug!(nonce = %block.nonce(), attempts, %reason, "Nonce search stopped");
            report(options, &block, state, attempts);
            Err(Unsealed::new(block, reason))
        }
    }
}

fn report(options: &SealOptions, block: &Block, state: SealState, attempts: u64) {
    if let Some(reporter) = &options.progress {
        reporter.report(block, state, attempts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::ProgressReporter;
    use assert_matches::assert_matches;
    use std::time::Duration;

    fn hard() -> Difficulty {
        Difficulty::new(20).unwrap()
    }

    #[test]
    fn test_zero_difficulty_seals_immediately() {
        let block = Block::with_timestamp("genesis", "", 1_000);
        let sealed = seal_blocking(block.clone(), Difficulty::NONE).unwrap();
        assert_eq!(sealed.nonce(), Nonce::ZERO);
        assert_eq!(sealed.digest(), block.digest());
    }

    #[test]
    fn test_seal_difficulty_one() {
        let block = Block::with_timestamp("genesis", "", 1_000);
        let difficulty = Difficulty::new(1).unwrap();
        let sealed = seal_blocking(block, difficulty).unwrap();

        assert!(sealed.digest().to_hex().starts_with('0'));
        assert!(sealed.verify(difficulty).is_ok());
    }

    #[test]
    fn test_sealed_nonce_is_first_solution() {
        let block = Block::with_timestamp("first", "prev", 42);
        let difficulty = Difficulty::new(2).unwrap();
        let sealed = seal_blocking(block.clone(), difficulty).unwrap();

        // Every earlier nonce fails the predicate
        let mut replay = block;
        while replay.nonce() < sealed.nonce() {
            assert!(!difficulty.is_met_by(&replay.digest()));
            replay.advance_nonce().unwrap();
        }
        assert_eq!(replay.digest(), sealed.digest());
    }

    #[test]
    fn test_cancelled_before_start() {
        let block = Block::with_timestamp("payload", "", 1_000);
        let token = CancellationToken::new();
        token.cancel();

        let unsealed = seal(block.clone(), hard(), &SealOptions::unbounded(), &token).unwrap_err();
        assert_matches!(unsealed.reason(), Error::Cancelled { nonce: 0 });
        assert_eq!(unsealed.block(), &block);
        assert!(unsealed.block().is_consistent());
    }

    #[test]
    fn test_attempt_limit() {
        let block = Block::with_timestamp("payload", "", 1_000);
        let options = SealOptions::unbounded().with_max_attempts(50);
        let unsealed = seal(block, hard(), &options, &CancellationToken::new()).unwrap_err();

        assert_matches!(
            unsealed.reason(),
            Error::Exhausted {
                attempts: 50,
                reason: ExhaustionReason::AttemptLimit
            }
        );
        // 50 digests checked means 49 increments
        assert_eq!(unsealed.block().nonce(), Nonce::new(49));
        assert!(unsealed.block().is_consistent());
    }

    #[test]
    fn test_deadline() {
        let block = Block::with_timestamp("payload", "", 1_000);
        let options = SealOptions::unbounded().with_timeout(Duration::ZERO);
        let unsealed = seal(block, hard(), &options, &CancellationToken::new()).unwrap_err();

        assert_matches!(
            unsealed.reason(),
            Error::Exhausted {
                reason: ExhaustionReason::Deadline,
                ..
            }
        );
        assert!(unsealed.block().is_consistent());
    }

    #[test]
    fn test_nonce_space_exhausted() {
        let block = Block::with_timestamp("payload", "", 1_000).restarted_at(Nonce::new(u64::MAX - 2));
        let unsealed = seal_blocking(block, hard()).unwrap_err();

        assert_matches!(
            unsealed.reason(),
            Error::Exhausted {
                attempts: 3,
                reason: ExhaustionReason::NonceSpace
            }
        );
        assert_eq!(unsealed.block().nonce(), Nonce::new(u64::MAX));
    }

    #[test]
    fn test_range_end_is_exclusive() {
        let block = Block::with_timestamp("payload", "", 1_000);
        let attempts = AtomicU64::new(0);
        let unsealed = search_range(
            block,
            hard(),
            &SealOptions::unbounded(),
            &CancellationToken::new(),
            Some(Nonce::new(10)),
            &attempts,
        )
        .unwrap_err();

        assert_eq!(unsealed.block().nonce(), Nonce::new(9));
        assert_eq!(attempts.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn test_progress_snapshots_are_consistent() {
        let block = Block::with_timestamp("payload", "", 1_000);
        let (reporter, rx) = ProgressReporter::channel(&block);
        let options = SealOptions::unbounded()
            .with_max_attempts(25)
            .with_progress(reporter, 5);

        let unsealed = seal(block.clone(), hard(), &options, &CancellationToken::new()).unwrap_err();

        let last = *rx.borrow();
        assert_eq!(last.state, SealState::Failed);
        assert_eq!(last.attempts, 25);
        assert_eq!(last.nonce, unsealed.block().nonce());
        assert_eq!(last.digest, unsealed.block().digest());
    }
}
