//! CLI arguments module
//!
//! Defines command-line argument parsing using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI arguments for the OneDrive uploader
#[derive(Debug, Parser)]
#[command(name = "onedrive-uploader")]
#[command(about = "Upload and download files to and from OneDrive", long_about = None)]
pub struct CliArgs {
    /// Path to config.json
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Upload range size in KiB (must be a multiple of 320)
    #[arg(short = 'u', long, global = true, default_value_t = 9600)]
    pub upload_range_kb: u64,

    /// HTTP request timeout in seconds
    #[arg(long, global = true, default_value_t = 300)]
    pub timeout_secs: u64,

    /// Attempts per upload chunk, including the first
    #[arg(long, global = true, default_value_t = 3)]
    pub retries: u32,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Defaults to `ls /` when omitted
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Sign in and store the credential
    Login,
    /// Create a remote folder
    Mkdir { path: String },
    /// Upload local files into a remote folder
    Up {
        /// Local files to upload
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,
        /// Remote destination folder
        dest: String,
    },
    /// Download a remote file
    Down {
        /// Remote file path
        remote: String,
        /// Local file or directory
        #[arg(default_value = ".")]
        local: PathBuf,
    },
    /// Delete a remote item
    Rm { path: String },
    /// List a remote folder
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Show metadata of a remote item
    Info { path: String },
    /// Print the SHA1 hash of a remote file
    Sha1 { path: String },
    /// Print the SHA256 hash of a remote file
    Sha256 { path: String },
    /// Search the drive
    Search { query: String },
    /// Convert an old config and its secret store into config.json
    Migrate {
        /// Old config file
        source: PathBuf,
    },
    /// Create an anonymous view link
    Share { path: String },
    /// Print the version
    Version,
}

impl Command {
    /// Whether the command talks to the drive and needs a valid credential
    pub fn needs_auth(&self) -> bool {
        !matches!(self, Command::Login | Command::Version | Command::Migrate { .. })
    }
}

impl CliArgs {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The subcommand to run, `ls /` if none was given
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Ls { path: "/".to_string() })
    }

    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Get the log level based on verbosity settings
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::ERROR
        } else {
            tracing::Level::WARN
        }
    }
}
