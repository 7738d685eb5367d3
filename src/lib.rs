//! onedrive-uploader
//!
//! OneDrive command-line client with resumable chunked uploads, streamed
//! downloads and automatic OAuth token renewal.

pub mod auth;
pub mod cli;
pub mod config;
pub mod drive;
pub mod error;
pub mod transfer;
pub mod transport;

pub use error::DriveError;

pub use auth::{Credential, CredentialStore, JsonFileStore, OAuthApp, TokenManager};
pub use config::{find_config_path, migrate_config, DriveConfig};
pub use drive::{DriveClient, DriveItem};
pub use transfer::{ProgressReporter, RetryPolicy, TransferEngine, TransferEvent, TransferOptions};
pub use transport::{HttpTransport, ReqwestTransport};
pub use cli::{CliArgs, Command, Config, ProgressDisplay, TransferStats};
