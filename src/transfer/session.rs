//! Upload session bookkeeping

use crate::error::DriveError;

/// Upload ranges must be aligned to 320 KiB
pub const CHUNK_ALIGNMENT: u64 = 327_680;

/// Default range size: 30 × 320 KiB (9600 KiB)
pub const DEFAULT_CHUNK_SIZE: u64 = CHUNK_ALIGNMENT * 30;

/// Reject chunk sizes the session protocol would refuse
pub fn validate_chunk_size(chunk_size: u64) -> Result<(), DriveError> {
    if chunk_size == 0 || chunk_size % CHUNK_ALIGNMENT != 0 {
        return Err(DriveError::validation_error_with_field(
            format!("{} is not a positive multiple of 320 KiB", chunk_size),
            "chunk_size",
        ));
    }
    Ok(())
}

/// One file's resumable upload, consumed front to back
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub upload_url: String,
    pub remote_path: String,
    total_size: u64,
    chunk_size: u64,
    next_offset: u64,
}

impl UploadSession {
    pub fn new(
        upload_url: impl Into<String>,
        remote_path: impl Into<String>,
        total_size: u64,
        chunk_size: u64,
    ) -> Result<Self, DriveError> {
        validate_chunk_size(chunk_size)?;
        Ok(Self {
            upload_url: upload_url.into(),
            remote_path: remote_path.into(),
            total_size,
            chunk_size,
            next_offset: 0,
        })
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    pub fn is_complete(&self) -> bool {
        self.next_offset == self.total_size
    }

    /// Length of the next chunk; 0 once complete
    pub fn next_len(&self) -> u64 {
        self.chunk_size.min(self.total_size - self.next_offset)
    }

    /// Number of range requests a full upload needs
    pub fn chunk_count(&self) -> u64 {
        self.total_size.div_ceil(self.chunk_size)
    }

    /// Record `sent` bytes as acknowledged
    pub fn advance(&mut self, sent: u64) -> Result<u64, DriveError> {
        let next = self.next_offset + sent;
        if next > self.total_size {
            return Err(DriveError::transfer_error(format!(
                "offset {} would pass the declared size {}",
                next, self.total_size
            )));
        }
        self.next_offset = next;
        Ok(next)
    }
}

/// `Content-Range` value for `len` bytes at `offset`
pub fn content_range(offset: u64, len: u64, total: u64) -> String {
    format!("bytes {}-{}/{}", offset, offset + len - 1, total)
}
