//! Configuration management for the block sealer
//!
//! Supports configuration via command line arguments, environment variables
//! and configuration files (YAML/JSON). Values given on the command line win;
//! the file fills in whatever the command line left unset.

use crate::core::Difficulty;
use crate::error::{Error, Result};
use crate::miner::{ProgressReporter, SealOptions};
use crate::utils::logging::LOG_FORMATS;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_DIFFICULTY: i64 = 4;
const DEFAULT_THREADS: usize = 1;
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_LOG_FORMAT: &str = "plain";

/// Complete configuration for the block sealer
#[derive(Debug, Clone, Default, Parser, Serialize, Deserialize)]
#[command(
    name = "block-sealer",
    version = env!("CARGO_PKG_VERSION"),
    about = "Seal a block with proof of work",
    long_about = "Builds a block from a payload and previous hash, then searches for a nonce whose Blake2s-256 digest starts with the requested number of hex zeros"
)]
#[serde(default)]
pub struct Config {
    /// Configuration file path (YAML or JSON)
    #[arg(long, value_name = "FILE")]
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    /// Print the resolved configuration and exit
    #[arg(long)]
    #[serde(skip)]
    pub print_config: bool,

    /// Verify a sealed block document instead of sealing
    #[arg(long, value_name = "FILE")]
    #[serde(skip)]
    pub verify: Option<PathBuf>,

    /// Block payload
    #[arg(short = 'p', long, env = "BLOCK_SEALER_PAYLOAD")]
    pub payload: Option<String>,

    /// Previous block digest as hex (omit for a genesis block)
    #[arg(short = 'P', long)]
    pub previous_hash: Option<String>,

    /// Number of leading hex zeros the digest needs
    #[arg(short = 'd', long, allow_negative_numbers = true, env = "BLOCK_SEALER_DIFFICULTY")]
    pub difficulty: Option<i64>,

    /// Search threads (0 = one per core)
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Give up after this many digests
    #[arg(long)]
    pub max_attempts: Option<u64>,

    /// Give up after this long (e.g. "30s", "5m")
    #[arg(long)]
    pub timeout: Option<String>,

    /// Digests between progress snapshots
    #[arg(long)]
    pub progress_interval: Option<u64>,

    /// Write the sealed block document here instead of stdout
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Log level or filter directive
    #[arg(short = 'l', long)]
    pub log_level: Option<String>,

    /// Log format (plain, json, pretty)
    #[arg(long)]
    pub log_format: Option<String>,
}

impl Config {
    /// Parse the command line, merge the config file and validate
    pub async fn load() -> Result<Self> {
        Self::resolve(Self::parse()).await
    }

    /// Merge the config file named by `cli` (if any) and validate
    pub async fn resolve(cli: Self) -> Result<Self> {
        let config = match &cli.config_file {
            Some(path) => {
                let file_config = Self::load_from_file(path).await?;
                cli.merge_with_file(file_config)
            }
            None => cli,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    async fn load_from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        if path.extension().and_then(|s| s.to_str()) == Some("json") {
            serde_json::from_str(&content).map_err(Error::from)
        } else {
            // Default to YAML
            serde_yaml::from_str(&content).map_err(Error::from)
        }
    }

    /// Fill unset CLI values from the file
    fn merge_with_file(mut self, file: Self) -> Self {
        self.payload = self.payload.or(file.payload);
        self.previous_hash = self.previous_hash.or(file.previous_hash);
        self.difficulty = self.difficulty.or(file.difficulty);
        self.threads = self.threads.or(file.threads);
        self.max_attempts = self.max_attempts.or(file.max_attempts);
        self.timeout = self.timeout.or(file.timeout);
        self.progress_interval = self.progress_interval.or(file.progress_interval);
        self.output = self.output.or(file.output);
        self.log_level = self.log_level.or(file.log_level);
        self.log_format = self.log_format.or(file.log_format);
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.difficulty()?;
        self.previous_hash_bytes()?;
        self.timeout_duration()?;

        if self.max_attempts == Some(0) {
            return Err(Error::config("max_attempts must be greater than 0"));
        }

        if self.progress_interval == Some(0) {
            return Err(Error::config("progress_interval must be greater than 0"));
        }

        if !LOG_FORMATS.contains(&self.log_format()) {
            return Err(Error::config(format!(
                "Unknown log format '{}', expected one of {:?}",
                self.log_format(),
                LOG_FORMATS
            )));
        }

        Ok(())
    }

    /// Get the validated difficulty
    pub fn difficulty(&self) -> Result<Difficulty> {
        Difficulty::try_from(self.difficulty.unwrap_or(DEFAULT_DIFFICULTY))
    }

    /// Get the difficulty only if one was given explicitly
    pub fn required_difficulty(&self) -> Result<Option<Difficulty>> {
        self.difficulty.map(Difficulty::try_from).transpose()
    }

    /// Get the payload bytes (empty when unset)
    pub fn payload_bytes(&self) -> Vec<u8> {
        self.payload.clone().unwrap_or_default().into_bytes()
    }

    /// Get the decoded previous hash (empty for genesis)
    pub fn previous_hash_bytes(&self) -> Result<Vec<u8>> {
        match &self.previous_hash {
            Some(hex_str) => hex::decode(hex_str)
                .map_err(|e| Error::config(format!("Invalid previous hash: {}", e))),
            None => Ok(Vec::new()),
        }
    }

    /// Get the parsed timeout
    pub fn timeout_duration(&self) -> Result<Option<Duration>> {
        self.timeout
            .as_deref()
            .map(|s| {
                humantime::parse_duration(s)
                    .map_err(|e| Error::config(format!("Invalid timeout '{}': {}", s, e)))
            })
            .transpose()
    }

    /// Get the thread count
    pub fn threads(&self) -> usize {
        self.threads.unwrap_or(DEFAULT_THREADS)
    }

    /// Get the log level directive
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    /// Get the log format
    pub fn log_format(&self) -> &str {
        self.log_format.as_deref().unwrap_or(DEFAULT_LOG_FORMAT)
    }

    /// Build search options, attaching `reporter` if given
    pub fn seal_options(&self, reporter: Option<ProgressReporter>) -> Result<SealOptions> {
        let mut options = SealOptions::unbounded();
        if let Some(max_attempts) = self.max_attempts {
            options = options.with_max_attempts(max_attempts);
        }
        if let Some(timeout) = self.timeout_duration()? {
            options = options.with_timeout(timeout);
        }
        let interval = self
            .progress_interval
            .unwrap_or(SealOptions::DEFAULT_PROGRESS_INTERVAL);
        if let Some(reporter) = reporter {
            options = options.with_progress(reporter, interval);
        } else {
            options.progress_interval = interval;
        }
        Ok(options)
    }
}
