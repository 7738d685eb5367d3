//! Chunked transfer engine
//!
//! Moves one file at a time between the local disk and the drive. Uploads
//! go through a resumable session as a sequence of 320 KiB-aligned range
//! PUTs; downloads stream the content into the target file. Both report
//! through a [`ProgressReporter`].

pub mod download;
pub mod progress;
pub mod retry;
pub mod session;
pub mod upload;

use std::sync::Arc;

use crate::drive::DriveClient;
use crate::error::DriveError;

pub use progress::{is_well_ordered, ProgressReceiver, ProgressReporter, TransferEvent};
pub use retry::RetryPolicy;
pub use session::{content_range, validate_chunk_size, UploadSession, CHUNK_ALIGNMENT, DEFAULT_CHUNK_SIZE};

/// Engine tuning, built by the caller and handed to [`TransferEngine::new`]
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Upload range size; a positive multiple of [`CHUNK_ALIGNMENT`]
    pub chunk_size: u64,
    /// Per-chunk retry behaviour
    pub retry: RetryPolicy,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry: RetryPolicy::default(),
        }
    }
}

/// Uploads and downloads single files over a [`DriveClient`]
pub struct TransferEngine {
    client: Arc<DriveClient>,
    options: TransferOptions,
}

impl TransferEngine {
    pub fn new(client: Arc<DriveClient>, options: TransferOptions) -> Result<Self, DriveError> {
        validate_chunk_size(options.chunk_size)?;
        Ok(Self { client, options })
    }

    pub fn client(&self) -> &Arc<DriveClient> {
        &self.client
    }

    pub fn options(&self) -> &TransferOptions {
        &self.options
    }
}
