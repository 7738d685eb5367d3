//! Download path

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::drive::normalize_path;
use crate::error::DriveError;
use crate::transfer::progress::ProgressReporter;
use crate::transfer::TransferEngine;
use crate::transport::StreamingResponse;

impl TransferEngine {
    /// Download the remote file `remote_source` to `local_dest`.
    ///
    /// An existing directory as `local_dest` receives the file under its
    /// remote name. Returns the path written. A partial file is left in
    /// place on failure.
    pub async fn download(
        &self,
        remote_source: &str,
        local_dest: &Path,
        mut progress: ProgressReporter,
    ) -> Result<PathBuf, DriveError> {
        let result = self.download_file(remote_source, local_dest, &mut progress).await;
        if let Err(e) = &result {
            debug!("Download of {} failed: {}", remote_source, e);
        }
        progress.finish(result.is_ok());
        result
    }

    async fn download_file(
        &self,
        remote_source: &str,
        local_dest: &Path,
        progress: &mut ProgressReporter,
    ) -> Result<PathBuf, DriveError> {
        let remote = normalize_path(remote_source)?;
        let display_name = remote.rsplit('/').next().unwrap_or_default();
        progress.resolving(display_name);

        let item = self.client.info(&remote).await?;
        if item.is_folder() {
            return Err(DriveError::validation_error_with_field(
                format!("{} is a folder; only files can be downloaded", remote),
                "path",
            ));
        }
        progress.start(&item.name, item.size);

        let target = resolve_target(local_dest, &item.name).await;
        let response = self.client.open_download(&remote, &item).await?;
        if let Some(length) = response.content_length {
            if length != item.size {
                return Err(DriveError::transfer_error_full(
                    format!("server announced {} bytes but the item has {}", length, item.size),
                    remote,
                    "file changed since its metadata was read",
                ));
            }
        }
        debug!("Streaming {} ({} bytes) to {}", remote, item.size, target.display());

        let mut file = File::create(&target).await.map_err(|e| {
            DriveError::local_io_error_full("could not create local file", target.display().to_string(), e.to_string())
        })?;

        let written = match write_body(response, &mut file, &target, progress).await {
            Ok(written) => written,
            Err(e) => {
                warn!("Partial download left at {}", target.display());
                return Err(e.with_context(format!("downloading {}", remote)));
            }
        };

        if written != item.size {
            warn!("Partial download left at {}", target.display());
            return Err(DriveError::transfer_error_full(
                format!("expected {} bytes, received {}", item.size, written),
                remote,
                "connection closed early",
            ));
        }

        info!("Downloaded {} to {}", remote, target.display());
        Ok(target)
    }
}

/// Where a download lands: inside `dest` when it is an existing directory
async fn resolve_target(dest: &Path, name: &str) -> PathBuf {
    match tokio::fs::metadata(dest).await {
        Ok(metadata) if metadata.is_dir() => dest.join(name),
        _ => dest.to_path_buf(),
    }
}

/// Copy the response body into `file`, reporting cumulative bytes
async fn write_body(
    mut response: StreamingResponse,
    file: &mut File,
    target: &Path,
    progress: &mut ProgressReporter,
) -> Result<u64, DriveError> {
    let mut written = 0u64;
    let result = loop {
        let chunk = match response.body.next().await {
            None => break Ok(written),
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => {
                break Err(DriveError::TransferError {
                    message: "connection failed mid-stream".to_string(),
                    path: None,
                    source: Some(e.to_string()),
                })
            }
        };
        if let Err(e) = file.write_all(&chunk).await {
            break Err(DriveError::local_io_error_full(
                "could not write local file",
                target.display().to_string(),
                e.to_string(),
            ));
        }
        written += chunk.len() as u64;
        progress.progress(written);
    };

    // whatever arrived is kept on disk, even on failure
    file.flush().await.map_err(|e| {
        DriveError::local_io_error_full("could not flush local file", target.display().to_string(), e.to_string())
    })?;
    result
}
