//! Chunked upload engine.
//!
//! Splits a file or directory tree into per-file transfer units and fans
//! them out across a bounded worker pool. Files at or under the request
//! size limit go up in a single PUT; larger files go through the
//! offset-addressed resumable protocol so no single request body exceeds
//! the limit. Each PATCH is idempotent by position, which is what makes
//! the transport's retries safe here.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use hoist_http::Payload;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::error::TransferError;
use crate::progress::{NullProgress, ProgressSink, TaskHandle};
use crate::session::StorageSession;

/// Fixed request-body size limit: files above this are chunked.
pub const REQUEST_SIZE_LIMIT: u64 = 32 * 1024 * 1024;

const READ_BUF_SIZE: usize = 64 * 1024;

#[derive(Clone)]
pub struct UploadOptions {
    /// Request-body size threshold; also the chunk size for resumable
    /// uploads.
    pub size_threshold: u64,
    /// Bound on concurrently transferring workers for one call.
    pub max_workers: usize,
    pub progress: Arc<dyn ProgressSink>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            size_threshold: REQUEST_SIZE_LIMIT,
            max_workers: 8,
            progress: Arc::new(NullProgress),
        }
    }
}

impl fmt::Debug for UploadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadOptions")
            .field("size_threshold", &self.size_threshold)
            .field("max_workers", &self.max_workers)
            .field("progress", &"{ ... }")
            .finish()
    }
}

/// One file scheduled for upload: its on-disk location, pre-scan size,
/// and target path inside the dataset.
struct UploadUnit {
    source: PathBuf,
    size: u64,
    target: String,
}

/// Upload a file or a directory tree into a dataset storage session.
///
/// A single zero-byte file is an error (the protocol cannot transfer
/// empty content); zero-byte files inside a directory are skipped
/// silently, as are files deleted between scanning and uploading. The
/// aggregate progress total is a live estimate: when a file's actual
/// transferred size differs from its pre-scan size, the total is adjusted
/// after that file completes.
pub async fn sync_source(
    session: &StorageSession,
    source: &Path,
    target: Option<&str>,
    options: &UploadOptions,
) -> Result<(), TransferError> {
    let (units, from_directory) = scan(source, target)?;
    let mut total: u64 = units.iter().map(|unit| unit.size).sum();

    let progress = &options.progress;
    let task = progress.add_task("uploading", Some(total));

    let semaphore = Arc::new(Semaphore::new(options.max_workers.max(1)));
    let mut workers = JoinSet::new();
    for unit in units {
        let session = session.clone();
        let progress = Arc::clone(progress);
        let semaphore = Arc::clone(&semaphore);
        let threshold = options.size_threshold;
        workers.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| TransferError::Worker(e.to_string()))?;
            debug!(source = %unit.source.display(), target = %unit.target, "uploading file");
            let actual = upload_file_with(
                &session,
                unit.size,
                &unit.source,
                &unit.target,
                threshold,
                &progress,
                task,
                from_directory,
            )
            .await?;
            Ok::<(u64, u64), TransferError>((unit.size, actual))
        });
    }

    let mut first_error: Option<TransferError> = None;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok((declared, actual))) => {
                if actual != declared {
                    // The file changed on disk since scanning; reconcile
                    // the aggregate total.
                    total = total - declared + actual;
                    progress.set_total(task, Some(total));
                }
            }
            Ok(Err(error)) => first_error = first_error.or(Some(error)),
            Err(join_error) => {
                first_error = first_error.or(Some(TransferError::Worker(join_error.to_string())));
            }
        }
    }
    progress.complete(task);
    match first_error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Upload raw bytes to a target path inside the dataset.
pub async fn upload_bytes(
    session: &StorageSession,
    data: Bytes,
    target: &str,
    progress: &Arc<dyn ProgressSink>,
) -> Result<(), TransferError> {
    let len = data.len() as u64;
    let task = progress.add_task(target, Some(len));
    session
        .put_file(target, Payload::Bytes(data), None)
        .await?;
    progress.advance(task, len);
    progress.complete(task);
    Ok(())
}

/// Upload one file, choosing the direct or resumable path by declared
/// size. Returns the number of bytes actually read from the source.
///
/// With `ignore_missing`, a file that vanished since scanning counts as
/// zero bytes rather than an error (directory uploads race deletions).
pub async fn upload_file(
    session: &StorageSession,
    declared_size: u64,
    source: &Path,
    target: &str,
    options: &UploadOptions,
    task: TaskHandle,
    ignore_missing: bool,
) -> Result<u64, TransferError> {
    upload_file_with(
        session,
        declared_size,
        source,
        target,
        options.size_threshold,
        &options.progress,
        task,
        ignore_missing,
    )
    .await
}

#[allow(clippy::too_many_arguments)]
async fn upload_file_with(
    session: &StorageSession,
    declared_size: u64,
    source: &Path,
    target: &str,
    threshold: u64,
    progress: &Arc<dyn ProgressSink>,
    task: TaskHandle,
    ignore_missing: bool,
) -> Result<u64, TransferError> {
    let file = match File::open(source).await {
        Ok(file) => file,
        Err(error) if error.kind() == io::ErrorKind::NotFound && ignore_missing => {
            return Ok(0);
        }
        Err(error) => return Err(error.into()),
    };
    let mut reader = ProgressReader::new(file, Arc::clone(progress), task);

    if declared_size <= threshold {
        let body = reader.read_up_to(u64::MAX).await?;
        session.put_file(target, Payload::Bytes(body), None).await?;
        return Ok(reader.total_read());
    }

    let upload_id = session.create_upload().await?;
    let mut written: u64 = 0;
    let mut digest = None;
    while written < declared_size {
        let chunk = reader.read_up_to(threshold).await?;
        if chunk.is_empty() {
            break;
        }
        let len = chunk.len() as u64;
        digest = session
            .patch_chunk(&upload_id, chunk, declared_size, written)
            .await?;
        written += len;
        if digest.is_some() {
            // The server has assembled enough to finalize.
            break;
        }
    }
    if digest.is_none() && written != declared_size {
        return Err(TransferError::UnexpectedEof(source.to_path_buf()));
    }
    session
        .put_file(target, Payload::Empty, digest.as_ref())
        .await?;
    Ok(reader.total_read())
}

fn scan(source: &Path, target: Option<&str>) -> Result<(Vec<UploadUnit>, bool), TransferError> {
    if source.is_file() {
        let size = std::fs::metadata(source)?.len();
        if size == 0 {
            return Err(TransferError::UnexpectedEof(source.to_path_buf()));
        }
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| TransferError::SourceNotFound(source.to_path_buf()))?;
        return Ok((
            vec![UploadUnit {
                source: source.to_path_buf(),
                size,
                target: prefixed(target, &name),
            }],
            false,
        ));
    }

    if source.is_dir() {
        let mut units = Vec::new();
        for entry in walkdir::WalkDir::new(source) {
            let entry = entry.map_err(walk_error)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let size = entry.metadata().map_err(walk_error)?.len();
            if size == 0 {
                // Empty placeholder files are not transferable.
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(source)
                .map_err(|e| TransferError::Io(io::Error::other(e)))?;
            units.push(UploadUnit {
                source: entry.path().to_path_buf(),
                size,
                target: prefixed(target, &forward_slashed(relative)),
            });
        }
        return Ok((units, true));
    }

    Err(TransferError::SourceNotFound(source.to_path_buf()))
}

fn prefixed(target: Option<&str>, relative: &str) -> String {
    match target {
        Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), relative),
        None => relative.to_string(),
    }
}

fn forward_slashed(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn walk_error(error: walkdir::Error) -> TransferError {
    match error.into_io_error() {
        Some(io_error) => TransferError::Io(io_error),
        None => TransferError::Io(io::Error::other("walk cycle")),
    }
}

/// Wraps a file so every read advances the progress sink by the bytes
/// read, and counts the total for size reconciliation.
struct ProgressReader {
    file: File,
    progress: Arc<dyn ProgressSink>,
    task: TaskHandle,
    total_read: u64,
}

impl ProgressReader {
    fn new(file: File, progress: Arc<dyn ProgressSink>, task: TaskHandle) -> Self {
        Self {
            file,
            progress,
            task,
            total_read: 0,
        }
    }

    /// Read up to `limit` bytes, or to end of file, whichever comes first.
    async fn read_up_to(&mut self, limit: u64) -> Result<Bytes, io::Error> {
        let mut buf = BytesMut::new();
        let mut scratch = [0u8; READ_BUF_SIZE];
        while (buf.len() as u64) < limit {
            let want = (limit - buf.len() as u64).min(READ_BUF_SIZE as u64) as usize;
            let n = self.file.read(&mut scratch[..want]).await?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&scratch[..n]);
            self.progress.advance(self.task, n as u64);
            self.total_read += n as u64;
        }
        Ok(buf.freeze())
    }

    fn total_read(&self) -> u64 {
        self.total_read
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::testing::RecordingProgress;
    use crate::session::{
        HEADER_DIGEST, HEADER_UPLOAD_ID, HEADER_UPLOAD_LENGTH, HEADER_UPLOAD_OFFSET,
    };
    use crate::testing::{MockClient, MockResponse, storage_session};
    use hoist_http::{Method, Request};
    use std::sync::atomic::Ordering;

    fn plain_ok_client() -> Arc<MockClient> {
        MockClient::new(|_req| MockResponse::ok().header("Upload-ID", "up-1"))
    }

    fn header<'a>(request: &'a Request, name: &str) -> &'a str {
        request
            .headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .unwrap()
    }

    #[tokio::test]
    async fn small_file_uploads_in_one_put() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.bin");
        std::fs::write(&path, b"0123456789").unwrap();

        let client = plain_ok_client();
        let session = storage_session(client.clone());
        let recording = Arc::new(RecordingProgress::new());
        let options = UploadOptions {
            progress: recording.clone(),
            ..Default::default()
        };
        sync_source(&session, &path, None, &options).await.unwrap();

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::Put);
        assert_eq!(requests[0].url, "https://storage.test/files/weights.bin");
        assert_eq!(requests[0].payload.len(), 10);
        assert_eq!(recording.advanced.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn single_file_lands_under_target_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.bin");
        std::fs::write(&path, b"abc").unwrap();

        let client = plain_ok_client();
        let session = storage_session(client.clone());
        sync_source(&session, &path, Some("blobs"), &UploadOptions::default())
            .await
            .unwrap();

        let requests = client.requests();
        assert_eq!(requests[0].url, "https://storage.test/files/blobs/weights.bin");
    }

    #[tokio::test]
    async fn large_file_chunks_with_increasing_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        std::fs::write(&path, b"0123456789").unwrap();

        let client = plain_ok_client();
        let session = storage_session(client.clone());
        let options = UploadOptions {
            size_threshold: 4,
            ..Default::default()
        };
        sync_source(&session, &path, None, &options).await.unwrap();

        let requests = client.requests();
        assert_eq!(requests.len(), 5);
        assert_eq!(requests[0].method, Method::Post);
        assert_eq!(requests[0].url, "https://storage.test/uploads");

        let patches: Vec<_> = requests
            .iter()
            .filter(|r| r.method == Method::Patch)
            .collect();
        assert_eq!(patches.len(), 3);
        for patch in &patches {
            assert_eq!(patch.url, "https://storage.test/uploads/up-1");
            assert_eq!(header(patch, HEADER_UPLOAD_LENGTH), "10");
        }
        let offsets: Vec<&str> = patches
            .iter()
            .map(|r| header(r, HEADER_UPLOAD_OFFSET))
            .collect();
        assert_eq!(offsets, ["0", "4", "8"]);
        let sizes: Vec<usize> = patches.iter().map(|r| r.payload.len()).collect();
        assert_eq!(sizes, [4, 4, 2]);

        let finalize = requests.last().unwrap();
        assert_eq!(finalize.method, Method::Put);
        assert_eq!(finalize.url, "https://storage.test/files/big.bin");
        assert!(finalize.payload.is_empty());
    }

    #[tokio::test]
    async fn early_digest_stops_chunking() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        std::fs::write(&path, b"0123456789").unwrap();

        let client = MockClient::new(|req| {
            if req.method == Method::Patch {
                MockResponse::ok().header(HEADER_DIGEST, "SHA256 q83vEZk=")
            } else {
                MockResponse::ok().header(HEADER_UPLOAD_ID, "up-1")
            }
        });
        let session = storage_session(client.clone());
        let options = UploadOptions {
            size_threshold: 4,
            ..Default::default()
        };
        sync_source(&session, &path, None, &options).await.unwrap();

        let requests = client.requests();
        let patches = requests.iter().filter(|r| r.method == Method::Patch).count();
        assert_eq!(patches, 1);
        let finalize = requests.last().unwrap();
        assert_eq!(finalize.method, Method::Put);
        assert_eq!(header(finalize, HEADER_DIGEST), "SHA256 q83vEZk=");
    }

    #[tokio::test]
    async fn zero_byte_single_file_fails_without_any_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        std::fs::write(&path, b"").unwrap();

        let client = plain_ok_client();
        let session = storage_session(client.clone());
        let err = sync_source(&session, &path, None, &UploadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::UnexpectedEof(_)));
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn directory_skips_empty_files_and_keeps_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data");
        std::fs::create_dir_all(root.join("sub")).unwrap();
        std::fs::write(root.join("empty.txt"), b"").unwrap();
        std::fs::write(root.join("sub").join("rows.txt"), b"0123456789").unwrap();

        let client = plain_ok_client();
        let session = storage_session(client.clone());
        let recording = Arc::new(RecordingProgress::new());
        let options = UploadOptions {
            progress: recording.clone(),
            ..Default::default()
        };
        sync_source(&session, &root, Some("train"), &options)
            .await
            .unwrap();

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].url,
            "https://storage.test/files/train/sub/rows.txt"
        );
        // The empty file never counted toward the total.
        let first_total = recording.totals.lock().unwrap()[0].1;
        assert_eq!(first_total, Some(10));
    }

    #[tokio::test]
    async fn missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let client = plain_ok_client();
        let session = storage_session(client);
        let err = sync_source(
            &session,
            &dir.path().join("nope"),
            None,
            &UploadOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TransferError::SourceNotFound(_)));
    }

    #[tokio::test]
    async fn source_exhausted_before_declared_size_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shrunk.bin");
        std::fs::write(&path, b"012345").unwrap();

        let client = plain_ok_client();
        let session = storage_session(client.clone());
        let options = UploadOptions {
            size_threshold: 4,
            ..Default::default()
        };
        let progress: Arc<dyn ProgressSink> = Arc::new(NullProgress);
        let task = progress.add_task("upload", None);
        // Declared size from a stale scan: the file has since shrunk.
        let err = upload_file(&session, 10, &path, "shrunk.bin", &options, task, false)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::UnexpectedEof(_)));
        // Chunking stopped without finalizing.
        assert!(!client.requests().iter().any(|r| r.method == Method::Put));
    }

    #[tokio::test]
    async fn vanished_file_is_tolerated_when_ignoring_missing() {
        let dir = tempfile::tempdir().unwrap();
        let client = plain_ok_client();
        let session = storage_session(client.clone());
        let progress: Arc<dyn ProgressSink> = Arc::new(NullProgress);
        let task = progress.add_task("upload", None);
        let transferred = upload_file(
            &session,
            10,
            &dir.path().join("raced.bin"),
            "raced.bin",
            &UploadOptions::default(),
            task,
            true,
        )
        .await
        .unwrap();
        assert_eq!(transferred, 0);
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn upload_bytes_puts_and_advances() {
        let client = plain_ok_client();
        let session = storage_session(client.clone());
        let recording = Arc::new(RecordingProgress::new());
        let progress: Arc<dyn ProgressSink> = recording.clone();
        upload_bytes(&session, Bytes::from_static(b"metrics"), "metrics.json", &progress)
            .await
            .unwrap();
        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://storage.test/files/metrics.json");
        assert_eq!(recording.advanced.load(Ordering::SeqCst), 7);
    }
}
