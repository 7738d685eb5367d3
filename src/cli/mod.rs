//! CLI module
//!
//! Command-line interface for the OneDrive uploader.

pub mod args;
pub mod commands;
pub mod config;
pub mod progress;

pub use args::{CliArgs, Command};
pub use config::Config;
pub use progress::{spawn_renderer, ProgressDisplay, TransferStats};
