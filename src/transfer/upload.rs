//! Upload path

use std::io::SeekFrom;
use std::path::Path;

use bytes::{Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info, warn};

use crate::drive::{join_remote, ChunkAck};
use crate::error::DriveError;
use crate::transfer::progress::ProgressReporter;
use crate::transfer::session::{content_range, UploadSession};
use crate::transfer::TransferEngine;

impl TransferEngine {
    /// Upload `local_file` into the remote folder `remote_dir`.
    ///
    /// A directory is rejected with `ValidationError` before any request is
    /// made. `Finish` is emitted exactly once if `Start` was.
    pub async fn upload(
        &self,
        local_file: &Path,
        remote_dir: &str,
        mut progress: ProgressReporter,
    ) -> Result<(), DriveError> {
        let result = self.upload_file(local_file, remote_dir, &mut progress).await;
        if let Err(e) = &result {
            debug!("Upload of {} failed: {}", local_file.display(), e);
        }
        progress.finish(result.is_ok());
        result
    }

    async fn upload_file(
        &self,
        local_file: &Path,
        remote_dir: &str,
        progress: &mut ProgressReporter,
    ) -> Result<(), DriveError> {
        let local = local_file.display().to_string();
        let metadata = tokio::fs::metadata(local_file)
            .await
            .map_err(|e| DriveError::local_io_error_full("could not stat local file", &local, e.to_string()))?;
        if metadata.is_dir() {
            return Err(DriveError::validation_error_with_field(
                format!("{} is a directory; only files can be uploaded", local),
                "path",
            ));
        }

        let name = local_file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| DriveError::validation_error_with_field("file name is not valid UTF-8", "path"))?;
        let remote_path = join_remote(remote_dir, name)?;
        let total_size = metadata.len();

        if total_size == 0 {
            // sessions cannot carry zero bytes
            progress.start(name, 0);
            self.client.upload_small(&remote_path, Bytes::new()).await?;
            info!("Uploaded empty file {}", remote_path);
            return Ok(());
        }

        let upload_url = self.client.create_upload_session(&remote_path).await?;
        let mut session = UploadSession::new(upload_url, remote_path, total_size, self.options.chunk_size)?;
        info!(
            "Uploading {} to {} ({} bytes in {} chunks)",
            local,
            session.remote_path,
            total_size,
            session.chunk_count()
        );
        progress.start(name, total_size);

        let mut file = File::open(local_file)
            .await
            .map_err(|e| DriveError::local_io_error_full("could not open local file", &local, e.to_string()))?;

        while !session.is_complete() {
            let offset = session.next_offset();
            let len = session.next_len();
            let chunk = read_chunk(&mut file, offset, len)
                .await
                .map_err(|e| DriveError::local_io_error_full("could not read local file", &local, e.to_string()))?;

            let range = content_range(offset, len, total_size);
            debug!("PUT {}", range);
            let upload_url = session.upload_url.as_str();
            let ack = self
                .options
                .retry
                .run(&format!("chunk {}", range), |_| {
                    self.client.put_range(upload_url, chunk.clone(), offset, total_size)
                })
                .await
                .map_err(|e| e.with_context(format!("uploading {}", session.remote_path)))?;

            let next = session.advance(len)?;
            progress.progress(next);

            match ack {
                ChunkAck::Completed(_) if !session.is_complete() => {
                    return Err(DriveError::transfer_error_full(
                        "server finalized the upload before all bytes were sent",
                        session.remote_path.clone(),
                        range,
                    ));
                }
                ChunkAck::Accepted if session.is_complete() => {
                    warn!("Last chunk of {} was accepted but not finalized", session.remote_path);
                }
                _ => {}
            }
        }

        info!("Uploaded {}", session.remote_path);
        Ok(())
    }
}

/// Read exactly `len` bytes at `offset`
async fn read_chunk(file: &mut File, offset: u64, len: u64) -> std::io::Result<Bytes> {
    file.seek(SeekFrom::Start(offset)).await?;
    let mut buf = BytesMut::zeroed(len as usize);
    file.read_exact(&mut buf).await?;
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use serde_json::json;

    use crate::auth::Credential;
    use crate::drive::client::tests::{client_with, valid_credential};
    use crate::error::DriveError;
    use crate::transfer::progress::{is_well_ordered, ProgressReceiver, ProgressReporter, TransferEvent};
    use crate::transfer::{RetryPolicy, TransferEngine, TransferOptions, CHUNK_ALIGNMENT};
    use crate::transport::mock::MockTransport;
    use crate::transport::{HttpResponse, Method};

    const UPLOAD_URL: &str = "https://upload.example/session/abc";

    fn engine(transport: Arc<MockTransport>, credential: Credential, chunk_size: u64) -> TransferEngine {
        let client = Arc::new(client_with(transport, credential));
        TransferEngine::new(
            client,
            TransferOptions {
                chunk_size,
                retry: RetryPolicy::immediate(3),
            },
        )
        .unwrap()
    }

    fn write_file(dir: &tempfile::TempDir, name: &str, size: usize) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, data).unwrap();
        path
    }

    fn session_created() -> serde_json::Value {
        json!({"uploadUrl": UPLOAD_URL})
    }

    fn drain(rx: &mut ProgressReceiver) -> Vec<TransferEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_one_million_bytes_in_four_puts() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "data.bin", 1_000_000);

        let transport = Arc::new(
            MockTransport::new()
                .reply_json(200, session_created())
                .reply(HttpResponse::new(202, "{}"))
                .reply(HttpResponse::new(202, "{}"))
                .reply(HttpResponse::new(202, "{}"))
                .reply_json(201, json!({"id": "X", "name": "data.bin", "size": 1_000_000, "file": {}})),
        );
        let engine = engine(transport.clone(), valid_credential(), CHUNK_ALIGNMENT);
        let (reporter, mut rx) = ProgressReporter::channel();

        engine.upload(&path, "/Backups", reporter).await.unwrap();

        let puts: Vec<_> = transport
            .requests()
            .into_iter()
            .filter(|r| r.method == Method::Put)
            .collect();
        let ranges: Vec<_> = puts
            .iter()
            .map(|r| r.header_value("Content-Range").unwrap().to_string())
            .collect();
        assert_eq!(
            ranges,
            vec![
                "bytes 0-327679/1000000",
                "bytes 327680-655359/1000000",
                "bytes 655360-983039/1000000",
                "bytes 983040-999999/1000000",
            ]
        );
        assert_eq!(puts.iter().map(|r| r.body.len()).sum::<usize>(), 1_000_000);
        assert!(transport.requests()[0].url.ends_with("root:/Backups/data.bin:/createUploadSession"));

        let events = drain(&mut rx);
        assert!(is_well_ordered(&events));
        assert_eq!(events.first(), Some(&TransferEvent::Start { name: "data.bin".into(), total_size: 1_000_000 }));
        assert_eq!(events[events.len() - 2], TransferEvent::Progress { bytes_transferred: 1_000_000 });
        assert_eq!(events.last(), Some(&TransferEvent::Finish { success: true }));
    }

    #[tokio::test]
    async fn test_put_count_matches_ceiling_for_larger_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let chunk = CHUNK_ALIGNMENT * 2;
        let size = (chunk * 2 + 1) as usize;
        let path = write_file(&dir, "odd.bin", size);

        let transport = Arc::new(
            MockTransport::new()
                .reply_json(200, session_created())
                .reply(HttpResponse::new(202, "{}"))
                .reply(HttpResponse::new(202, "{}"))
                .reply(HttpResponse::new(200, "{}")),
        );
        let engine = engine(transport.clone(), valid_credential(), chunk);

        engine.upload(&path, "/", ProgressReporter::disabled()).await.unwrap();
        assert_eq!(transport.count(Method::Put, UPLOAD_URL), 3);
        assert_eq!(transport.remaining(), 0);
    }

    #[tokio::test]
    async fn test_transient_503_counts_chunk_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "small.txt", 1000);

        let transport = Arc::new(
            MockTransport::new()
                .reply_json(200, session_created())
                .reply(HttpResponse::new(503, "busy"))
                .reply(HttpResponse::new(503, "busy"))
                .reply_json(201, json!({"name": "small.txt", "size": 1000, "file": {}})),
        );
        let engine = engine(transport.clone(), valid_credential(), CHUNK_ALIGNMENT);
        let (reporter, mut rx) = ProgressReporter::channel();

        engine.upload(&path, "/", reporter).await.unwrap();

        let puts: Vec<_> = transport.requests().into_iter().filter(|r| r.method == Method::Put).collect();
        assert_eq!(puts.len(), 3);
        assert!(puts.iter().all(|r| r.header_value("Content-Range") == Some("bytes 0-999/1000")));

        let events = drain(&mut rx);
        let progress: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                TransferEvent::Progress { bytes_transferred } => Some(*bytes_transferred),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![1000]);
    }

    #[tokio::test]
    async fn test_retries_exhausted_fails_with_finish_false() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "flaky.txt", 10);

        let transport = Arc::new(
            MockTransport::new()
                .reply_json(200, session_created())
                .reply(HttpResponse::new(500, ""))
                .fail(DriveError::transient("timed out"))
                .reply(HttpResponse::new(502, "")),
        );
        let engine = engine(transport.clone(), valid_credential(), CHUNK_ALIGNMENT);
        let (reporter, mut rx) = ProgressReporter::channel();

        let err = engine.upload(&path, "/", reporter).await.unwrap_err();
        assert!(matches!(err, DriveError::TransferError { .. }));

        let events = drain(&mut rx);
        assert!(is_well_ordered(&events));
        assert_eq!(events.last(), Some(&TransferEvent::Finish { success: false }));
    }

    #[tokio::test]
    async fn test_client_error_fails_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "bad.txt", 10);

        let transport = Arc::new(
            MockTransport::new()
                .reply_json(200, session_created())
                .reply(HttpResponse::new(416, "range not satisfiable"))
                .reply(HttpResponse::new(202, "{}")),
        );
        let engine = engine(transport.clone(), valid_credential(), CHUNK_ALIGNMENT);

        let err = engine.upload(&path, "/", ProgressReporter::disabled()).await.unwrap_err();
        assert!(matches!(err, DriveError::ApiError { status: 416, .. }));
        assert_eq!(transport.count(Method::Put, UPLOAD_URL), 1);
    }

    #[tokio::test]
    async fn test_directory_is_rejected_without_requests() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        let engine = engine(transport.clone(), valid_credential(), CHUNK_ALIGNMENT);
        let (reporter, mut rx) = ProgressReporter::channel();

        let err = engine.upload(dir.path(), "/", reporter).await.unwrap_err();
        assert!(matches!(err, DriveError::ValidationError { .. }));
        assert!(transport.requests().is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_missing_local_file_is_local_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        let engine = engine(transport.clone(), valid_credential(), CHUNK_ALIGNMENT);

        let err = engine
            .upload(&dir.path().join("nope.bin"), "/", ProgressReporter::disabled())
            .await
            .unwrap_err();
        assert!(matches!(err, DriveError::LocalIOError { .. }));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_expired_token_renewed_once_before_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "a.txt", 700_000);

        let transport = Arc::new(
            MockTransport::new()
                .reply_json(200, json!({"access_token": "fresh", "expires_in": 3600}))
                .reply_json(200, session_created())
                .reply(HttpResponse::new(202, "{}"))
                .reply(HttpResponse::new(202, "{}"))
                .reply(HttpResponse::new(201, "{}")),
        );
        let expired = Credential::new("stale", "refresh", Utc::now() - Duration::minutes(5));
        let engine = engine(transport.clone(), expired, CHUNK_ALIGNMENT);

        engine.upload(&path, "/", ProgressReporter::disabled()).await.unwrap();

        let requests = transport.requests();
        assert!(requests[0].url.contains("oauth2/v2.0/token"));
        assert_eq!(transport.count(Method::Post, "oauth2/v2.0/token"), 1);
        assert_eq!(requests[1].header_value("Authorization"), Some("Bearer fresh"));
        assert_eq!(engine.client().tokens().renewal_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_file_uses_simple_upload() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "empty.txt", 0);

        let transport = Arc::new(
            MockTransport::new().reply_json(201, json!({"name": "empty.txt", "size": 0, "file": {}})),
        );
        let engine = engine(transport.clone(), valid_credential(), CHUNK_ALIGNMENT);
        let (reporter, mut rx) = ProgressReporter::channel();

        engine.upload(&path, "/Docs", reporter).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].url.ends_with("root:/Docs/empty.txt:/content"));
        assert!(requests[0].body.is_empty());

        let events = drain(&mut rx);
        assert!(is_well_ordered(&events));
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_session_creation_failure_emits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "a.txt", 10);

        let transport = Arc::new(MockTransport::new().reply(HttpResponse::new(403, "denied")));
        let engine = engine(transport, valid_credential(), CHUNK_ALIGNMENT);
        let (reporter, mut rx) = ProgressReporter::channel();

        let err = engine.upload(&path, "/", reporter).await.unwrap_err();
        assert!(matches!(err, DriveError::ApiError { status: 403, .. }));
        assert!(drain(&mut rx).is_empty());
    }
}
