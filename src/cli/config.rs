//! CLI configuration module
//!
//! Turns command-line flags into engine and transport settings.

use crate::cli::args::CliArgs;
use crate::transfer::{validate_chunk_size, RetryPolicy, TransferOptions};
use std::path::PathBuf;
use std::time::Duration;
use anyhow::Result;

/// Runtime configuration for one invocation
#[derive(Debug, Clone)]
pub struct Config {
    /// Explicit config.json path, if given
    pub config_path: Option<PathBuf>,
    /// Upload range size in bytes
    pub chunk_size: u64,
    /// Attempts per chunk
    pub retries: u32,
    /// HTTP request timeout
    pub timeout: Duration,
    /// Renew tokens this long before they expire
    pub renew_margin: chrono::Duration,
    /// Verbose output
    pub verbose: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Config {
    /// Create configuration from CLI arguments
    pub fn from_args(args: &CliArgs) -> Self {
        Self {
            config_path: args.config.clone(),
            chunk_size: args.upload_range_kb.saturating_mul(1024),
            retries: args.retries,
            timeout: Duration::from_secs(args.timeout_secs),
            renew_margin: chrono::Duration::seconds(crate::auth::token::DEFAULT_RENEW_MARGIN_SECS),
            verbose: args.verbose,
            quiet: args.quiet,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        validate_chunk_size(self.chunk_size)
            .map_err(|_| anyhow::anyhow!("upload range must be a positive multiple of 320 KiB, got {} bytes", self.chunk_size))?;

        if self.retries == 0 {
            return Err(anyhow::anyhow!("retries must be at least 1"));
        }

        if self.timeout.is_zero() {
            return Err(anyhow::anyhow!("timeout must be at least 1 second"));
        }

        Ok(())
    }

    /// Engine settings derived from the flags
    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            chunk_size: self.chunk_size,
            retry: RetryPolicy {
                max_attempts: self.retries,
                ..RetryPolicy::default()
            },
        }
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}
