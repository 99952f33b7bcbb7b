//! Block Sealer - Main Application
//!
//! Builds a block from the configured payload and previous hash, seals it
//! with the CPU sealer and writes the sealed block document.

use anyhow::Context;
use block_sealer::{
    config::Config,
    miner::{ProgressReporter, SealProgress},
    utils::{format_duration, format_hash_rate, init_logging},
    Block, CpuSealer, Difficulty, SealedBlock, Sealer, APP_NAME, APP_VERSION,
};
use std::path::Path;
use std::time::Instant;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().await?;

    init_logging(config.log_level(), config.log_format());

    if config.print_config {
        print!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }

    if let Some(path) = &config.verify {
        return verify_document(path, config.required_difficulty()?).await;
    }

    run(config).await
}

/// Seal a block as configured and write the result
async fn run(config: Config) -> anyhow::Result<()> {
    info!("{} {} starting", APP_NAME, APP_VERSION);

    let difficulty = config.difficulty()?;
    let block = Block::new(config.payload_bytes(), config.previous_hash_bytes()?);
    info!(
        created_at = block.created_at(),
        genesis = block.is_genesis(),
        initial_digest = %block.digest(),
        "Block constructed"
    );

    let (reporter, progress_rx) = ProgressReporter::channel(&block);
    let options = config.seal_options(Some(reporter))?;
    let sealer = CpuSealer::new(config.threads());

    let cancellation = CancellationToken::new();
    let signal_handle = tokio::spawn(cancel_on_ctrl_c(cancellation.clone()));
    let progress_handle = tokio::spawn(log_progress(progress_rx));

    let started = Instant::now();
    let result = sealer.seal(block, difficulty, options, cancellation).await;
    let elapsed = started.elapsed();

    signal_handle.abort();
    progress_handle.abort();

    let stats = sealer.stats();
    match result {
        Ok(sealed) => {
            info!(
                digest = %sealed.digest(),
                nonce = %sealed.nonce(),
                attempts = stats.total_attempts,
                elapsed = %format_duration(elapsed),
                hash_rate = %format_hash_rate(stats.hash_rate),
                "Block sealed"
            );
            write_document(&sealed, config.output.as_deref()).await
        }
        Err(unsealed) => {
            let (block, reason) = unsealed.into_parts();
            if reason.is_search_outcome() {
                warn!(
                    category = reason.category(),
                    nonce = %block.nonce(),
                    digest = %block.digest(),
                    attempts = stats.total_attempts,
                    "Block left unsealed"
                );
            } else {
                error!(category = reason.category(), "Search failed: {}", reason);
            }
            Err(reason).context("sealing failed")
        }
    }
}

/// Cancel the search on Ctrl-C
async fn cancel_on_ctrl_c(cancellation: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Interrupt received, cancelling search");
            cancellation.cancel();
        }
        Err(e) => error!("Failed to listen for interrupt: {}", e),
    }
}

/// Log progress snapshots until the search reaches a terminal state
async fn log_progress(mut rx: watch::Receiver<SealProgress>) {
    while rx.changed().await.is_ok() {
        let progress = *rx.borrow_and_update();
        debug!(
            state = %progress.state,
            nonce = %progress.nonce,
            digest = %progress.digest,
            attempts = progress.attempts,
            "Search progress"
        );
        if progress.state.is_terminal() {
            break;
        }
    }
}

async fn write_document(sealed: &SealedBlock, output: Option<&Path>) -> anyhow::Result<()> {
    let json = sealed.to_json()?;
    match output {
        Some(path) => {
            tokio::fs::write(path, format!("{}\n", json))
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("Sealed block written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

/// Load a sealed block document and check it against `required`, or the
/// difficulty it was sealed at when none is given
async fn verify_document(path: &Path, required: Option<Difficulty>) -> anyhow::Result<()> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let sealed = SealedBlock::from_json(&json)?;
    let difficulty = required.unwrap_or(sealed.difficulty());
    sealed.verify(difficulty)?;

    info!(
        digest = %sealed.digest(),
        nonce = %sealed.nonce(),
        difficulty = %difficulty,
        "Sealed block verified"
    );
    Ok(())
}
