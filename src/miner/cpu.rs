//! CPU sealer running the nonce search on dedicated blocking threads
//!
//! With one thread the block moves onto a blocking thread and the search is
//! the sequential one. With more, the nonce space above the block's current
//! nonce is split into contiguous ranges, one per thread, each searched on
//! its own copy of the block. The first thread to seal cancels the others.

use super::search::search_range;
use super::{seal_span, SealOptions, SealState, SealStats, Sealer, Unsealed};
use crate::core::{Block, Difficulty, Nonce, SealedBlock};
use crate::error::Error;
use crate::utils::compute_hash_rate;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

/// CPU sealer using one or more threads
pub struct CpuSealer {
    threads: usize,
    stats: Arc<CpuSealStats>,
}

/// Thread-safe statistics for the CPU sealer
#[derive(Debug, Default)]
struct CpuSealStats {
    total_attempts: AtomicU64,
    blocks_sealed: AtomicU64,
    busy_nanos: AtomicU64,
}

impl CpuSealStats {
    fn record_search(&self, elapsed: Duration, sealed: bool) {
        self.busy_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
        if sealed {
            self.blocks_sealed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn to_seal_stats(&self) -> SealStats {
        let total_attempts = self.total_attempts.load(Ordering::Relaxed);
        let elapsed = Duration::from_nanos(self.busy_nanos.load(Ordering::Relaxed));

        SealStats {
            total_attempts,
            blocks_sealed: self.blocks_sealed.load(Ordering::Relaxed),
            elapsed,
            hash_rate: compute_hash_rate(total_attempts, elapsed),
        }
    }
}

/// One thread's share of the nonce space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NonceRange {
    start: Nonce,
    /// Exclusive; `None` runs to the top of the nonce space
    end: Option<Nonce>,
}

/// Split `[start, u64::MAX]` into `parts` contiguous ranges
///
/// Returns a single open range when the space is too small to split.
fn split_nonce_space(start: Nonce, parts: usize) -> Vec<NonceRange> {
    let span = u64::MAX - start.value();
    let chunk = span / parts.max(1) as u64;
    if parts <= 1 || chunk == 0 {
        return vec![NonceRange { start, end: None }];
    }

    (0..parts as u64)
        .map(|i| {
            let range_start = start.value() + i * chunk;
            let end = if i + 1 == parts as u64 {
                None
            } else {
                Some(Nonce::new(range_start + chunk))
            };
            NonceRange {
                start: Nonce::new(range_start),
                end,
            }
        })
        .collect()
}

/// Split an attempt cap into per-thread shares summing to exactly `max_attempts`
///
/// The first `max % threads` shares take one extra attempt. A share of
/// zero means that range is not searched.
fn split_attempts(max_attempts: Option<u64>, threads: usize) -> Vec<Option<u64>> {
    let threads = threads.max(1) as u64;
    (0..threads)
        .map(|i| {
            max_attempts.map(|max| {
                // A cap of zero still checks the current digest
                let max = max.max(1);
                max / threads + u64::from(i < max % threads)
            })
        })
        .collect()
}

/// Outcome of a parallel search in which no range sealed
///
/// The caller's cancellation takes precedence; otherwise an exhaustion
/// reason is reported with the attempts of every range.
fn resolve_failure(first: Unsealed, caller_cancelled: bool, total_attempts: u64) -> Unsealed {
    let (block, reason) = first.into_parts();
    let reason = if caller_cancelled {
        Error::cancelled(block.nonce().value())
    } else {
        match reason {
            Error::Exhausted { reason, .. } => Error::exhausted(total_attempts, reason),
            other => other,
        }
    };
    Unsealed::new(block, reason)
}

impl CpuSealer {
    /// Create a CPU sealer (0 threads = one per available core)
    pub fn new(threads: usize) -> Self {
        let threads = if threads == 0 {
            num_cpus::get()
        } else {
            threads
        };

        debug!("Creating CPU sealer with {} threads", threads);

        Self {
            threads,
            stats: Arc::new(CpuSealStats::default()),
        }
    }

    /// Number of search threads
    pub fn threads(&self) -> usize {
        self.threads
    }

    async fn seal_single(
        &self,
        block: Block,
        difficulty: Difficulty,
        options: SealOptions,
        cancellation: CancellationToken,
    ) -> Result<SealedBlock, Unsealed> {
        let fallback = block.clone();
        let stats = Arc::clone(&self.stats);

        let handle = task::spawn_blocking(move || {
            let started = Instant::now();
            let result = search_range(
                block,
                difficulty,
                &options,
                &cancellation,
                None,
                &stats.total_attempts,
            );
            stats.record_search(started.elapsed(), result.is_ok());
            result
        });

        match handle.await {
            Ok(result) => result,
            Err(e) => Err(Unsealed::new(
                fallback,
                Error::worker(format!("search thread failed: {}", e)),
            )),
        }
    }

    async fn seal_parallel(
        &self,
        block: Block,
        difficulty: Difficulty,
        options: SealOptions,
        cancellation: CancellationToken,
        ranges: Vec<NonceRange>,
    ) -> Result<SealedBlock, Unsealed> {
        let fallback = block.clone();
        let threads = ranges.len();
        let race = cancellation.child_token();
        let attempts_before = self.stats.total_attempts.load(Ordering::Relaxed);
        let reporter = options.progress.clone();
        let shares = split_attempts(options.max_attempts, threads);

        let (result_tx, mut result_rx) = mpsc::unbounded_channel();
        let mut handles = Vec::with_capacity(threads);

        for (index, (range, max_attempts)) in ranges.into_iter().zip(shares).enumerate() {
            if max_attempts == Some(0) {
                continue;
            }

            let thread_block = if index == 0 {
                block.clone()
            } else {
                block.restarted_at(range.start)
            };
            let mut options = options.clone();
            options.max_attempts = max_attempts;
            // Only the first range reports, and never its own outcome
            options.progress = match &reporter {
                Some(reporter) if index == 0 => Some(reporter.searching_only()),
                _ => None,
            };
            let race = race.clone();
            let stats = Arc::clone(&self.stats);
            let result_tx = result_tx.clone();

            handles.push(task::spawn_blocking(move || {
                let started = Instant::now();
                let result = search_range(
                    thread_block,
                    difficulty,
                    &options,
                    &race,
                    range.end,
                    &stats.total_attempts,
                );
                if result.is_ok() {
                    // First success wins; stop the other ranges
                    race.cancel();
                }
                stats.record_search(started.elapsed(), result.is_ok());
                // Receiver outlives every thread
                let _ = result_tx.send((index, result));
            }));
        }

        drop(result_tx);

        let mut winner = None;
        let mut failures: Vec<Option<Unsealed>> = (0..threads).map(|_| None).collect();

        while let Some((index, result)) = result_rx.recv().await {
            match result {
                Ok(sealed) if winner.is_none() => {
                    debug!(thread = index, nonce = %sealed.nonce(), "Range search won");
                    winner = Some(sealed);
                }
                Ok(sealed) => {
                    debug!(thread = index, nonce = %sealed.nonce(), "Late solution discarded");
                }
                Err(unsealed) => failures[index] = Some(unsealed),
            }
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Search thread failed: {}", e);
            }
        }

        let total = self.stats.total_attempts.load(Ordering::Relaxed) - attempts_before;

        if let Some(sealed) = winner {
            if let Some(reporter) = &reporter {
                reporter.report(sealed.as_block(), SealState::Sealed, total);
            }
            return Ok(sealed);
        }

        let unsealed = match failures.into_iter().flatten().next() {
            Some(first) => resolve_failure(first, cancellation.is_cancelled(), total),
            None => Unsealed::new(
                fallback,
                Error::worker("search thread exited without a result"),
            ),
        };
        if let Some(reporter) = &reporter {
            let state = match unsealed.reason() {
                Error::Cancelled { .. } => SealState::Cancelled,
                _ => SealState::Failed,
            };
            reporter.report(unsealed.block(), state, total);
        }
        Err(unsealed)
    }
}

#[async_trait]
impl Sealer for CpuSealer {
    fn sealer_type(&self) -> &'static str {
        "cpu"
    }

    async fn seal(
        &self,
        block: Block,
        difficulty: Difficulty,
        options: SealOptions,
        cancellation: CancellationToken,
    ) -> Result<SealedBlock, Unsealed> {
        let span = seal_span(self.sealer_type(), difficulty, self.threads);

        async move {
            info!(
                "Sealing block at difficulty {} (~{:.0} expected attempts)",
                difficulty,
                difficulty.expected_attempts()
            );

            let ranges = split_nonce_space(block.nonce(), self.threads);

            // Difficulty 0 is met at the current nonce; no race needed
            if ranges.len() == 1 || difficulty == Difficulty::NONE {
                self.seal_single(block, difficulty, options, cancellation)
                    .await
            } else {
                self.seal_parallel(block, difficulty, options, cancellation, ranges)
                    .await
            }
        }
        .instrument(span)
        .await
    }

    fn stats(&self) -> SealStats {
        self.stats.to_seal_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExhaustionReason;
    use crate::miner::ProgressReporter;
    use assert_matches::assert_matches;

    #[test]
    fn test_cpu_sealer_creation() {
        let sealer = CpuSealer::new(2);
        assert_eq!(sealer.threads(), 2);
        assert_eq!(sealer.sealer_type(), "cpu");
        assert!(CpuSealer::new(0).threads() >= 1);
    }

    #[test]
    fn test_split_nonce_space() {
        let ranges = split_nonce_space(Nonce::ZERO, 4);
        assert_eq!(ranges.len(), 4);
        assert_eq!(ranges[0].start, Nonce::ZERO);
        assert_eq!(ranges[3].end, None);

        // Contiguous and disjoint
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end, Some(pair[1].start));
        }
    }

    #[test]
    fn test_split_small_space() {
        let ranges = split_nonce_space(Nonce::new(u64::MAX - 1), 4);
        assert_eq!(ranges, vec![NonceRange { start: Nonce::new(u64::MAX - 1), end: None }]);

        let ranges = split_nonce_space(Nonce::new(7), 1);
        assert_eq!(ranges.len(), 1);
    }

    #[test]
    fn test_split_attempts() {
        assert_eq!(split_attempts(None, 3), vec![None, None, None]);
        assert_eq!(split_attempts(Some(100), 3), vec![Some(34), Some(33), Some(33)]);
        assert_eq!(split_attempts(Some(10), 4), vec![Some(3), Some(3), Some(2), Some(2)]);
        assert_eq!(split_attempts(Some(2), 4), vec![Some(1), Some(1), Some(0), Some(0)]);
        assert_eq!(split_attempts(Some(0), 2), vec![Some(1), Some(0)]);

        for threads in 1..=8 {
            for max in 1..=50u64 {
                let total: u64 = split_attempts(Some(max), threads).into_iter().flatten().sum();
                assert_eq!(total, max);
            }
        }
    }

    #[test]
    fn test_resolve_failure_prefers_caller_cancellation() {
        let block = Block::with_timestamp("payload", "", 1_000);
        let exhausted = || {
            Unsealed::new(
                block.clone(),
                Error::exhausted(5, ExhaustionReason::AttemptLimit),
            )
        };

        let unsealed = resolve_failure(exhausted(), true, 40);
        assert_matches!(unsealed.reason(), Error::Cancelled { nonce: 0 });
        assert_eq!(unsealed.block(), &block);

        let unsealed = resolve_failure(exhausted(), false, 40);
        assert_matches!(
            unsealed.reason(),
            Error::Exhausted {
                attempts: 40,
                reason: ExhaustionReason::AttemptLimit
            }
        );
    }

    #[tokio::test]
    async fn test_single_thread_seal() {
        let sealer = CpuSealer::new(1);
        let block = Block::with_timestamp("genesis", "", 1_000);
        let difficulty = Difficulty::new(2).unwrap();

        let sealed = sealer
            .seal(block, difficulty, SealOptions::unbounded(), CancellationToken::new())
            .await
            .unwrap();
        assert!(sealed.verify(difficulty).is_ok());

        let stats = sealer.stats();
        assert_eq!(stats.blocks_sealed, 1);
        assert_eq!(stats.total_attempts, sealed.nonce().value() + 1);
    }

    #[tokio::test]
    async fn test_parallel_seal() {
        let sealer = CpuSealer::new(4);
        let block = Block::with_timestamp("parallel", "prev", 1_000);
        let difficulty = Difficulty::new(3).unwrap();

        let sealed = sealer
            .seal(block.clone(), difficulty, SealOptions::unbounded(), CancellationToken::new())
            .await
            .unwrap();

        assert!(sealed.verify(difficulty).is_ok());
        assert_eq!(sealed.payload(), block.payload());
        assert_eq!(sealed.created_at(), block.created_at());
    }

    #[tokio::test]
    async fn test_parallel_zero_difficulty_keeps_nonce() {
        let sealer = CpuSealer::new(4);
        let block = Block::with_timestamp("genesis", "", 1_000);

        let sealed = sealer
            .seal(block, Difficulty::NONE, SealOptions::unbounded(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(sealed.nonce(), Nonce::ZERO);
    }

    #[tokio::test]
    async fn test_parallel_cancellation() {
        let sealer = CpuSealer::new(2);
        let block = Block::with_timestamp("payload", "", 1_000);
        let token = CancellationToken::new();
        token.cancel();

        let unsealed = sealer
            .seal(block.clone(), Difficulty::new(20).unwrap(), SealOptions::unbounded(), token)
            .await
            .unwrap_err();

        assert_matches!(unsealed.reason(), Error::Cancelled { .. });
        assert_eq!(unsealed.block(), &block);
    }

    #[tokio::test]
    async fn test_parallel_attempt_limit() {
        let sealer = CpuSealer::new(2);
        let block = Block::with_timestamp("payload", "", 1_000);
        let options = SealOptions::unbounded().with_max_attempts(100);

        let unsealed = sealer
            .seal(block, Difficulty::new(20).unwrap(), options, CancellationToken::new())
            .await
            .unwrap_err();

        assert_matches!(
            unsealed.reason(),
            Error::Exhausted {
                attempts: 100,
                reason: ExhaustionReason::AttemptLimit
            }
        );
        assert!(unsealed.block().is_consistent());
    }

    #[tokio::test]
    async fn test_parallel_attempt_limit_uneven_split() {
        let sealer = CpuSealer::new(3);
        let block = Block::with_timestamp("payload", "", 1_000);
        let options = SealOptions::unbounded().with_max_attempts(100);

        let unsealed = sealer
            .seal(block, Difficulty::new(20).unwrap(), options, CancellationToken::new())
            .await
            .unwrap_err();

        assert_matches!(
            unsealed.reason(),
            Error::Exhausted {
                attempts: 100,
                reason: ExhaustionReason::AttemptLimit
            }
        );
        assert_eq!(sealer.stats().total_attempts, 100);
    }

    #[tokio::test]
    async fn test_parallel_attempt_limit_below_thread_count() {
        let sealer = CpuSealer::new(4);
        let block = Block::with_timestamp("payload", "", 1_000);
        let options = SealOptions::unbounded().with_max_attempts(2);

        let unsealed = sealer
            .seal(block, Difficulty::new(20).unwrap(), options, CancellationToken::new())
            .await
            .unwrap_err();

        assert_matches!(unsealed.reason(), Error::Exhausted { attempts: 2, .. });
    }

    #[tokio::test]
    async fn test_parallel_final_snapshot_matches_sealed_block() {
        for created_at in 0..10 {
            let sealer = CpuSealer::new(4);
            let block = Block::with_timestamp("parallel progress", "", created_at);
            let (reporter, rx) = ProgressReporter::channel(&block);
            let options = SealOptions::unbounded().with_progress(reporter, 1);

            let sealed = sealer
                .seal(block, Difficulty::new(3).unwrap(), options, CancellationToken::new())
                .await
                .unwrap();

            let last = *rx.borrow();
            assert_eq!(last.state, SealState::Sealed);
            assert_eq!(last.nonce, sealed.nonce());
            assert_eq!(last.digest, sealed.digest());
            assert_eq!(last.attempts, sealer.stats().total_attempts);
        }
    }

    #[tokio::test]
    async fn test_parallel_failure_snapshot_is_terminal() {
        let sealer = CpuSealer::new(3);
        let block = Block::with_timestamp("payload", "", 1_000);
        let (reporter, rx) = ProgressReporter::channel(&block);
        let options = SealOptions::unbounded()
            .with_max_attempts(60)
            .with_progress(reporter, 1);

        let unsealed = sealer
            .seal(block, Difficulty::new(20).unwrap(), options, CancellationToken::new())
            .await
            .unwrap_err();

        let last = *rx.borrow();
        assert_eq!(last.state, SealState::Failed);
        assert_eq!(last.nonce, unsealed.block().nonce());
        assert_eq!(last.digest, unsealed.block().digest());
        assert_eq!(last.attempts, 60);
    }
}
