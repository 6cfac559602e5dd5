//! Manifest-paginated download engine.
//!
//! Enumerates a dataset's remote file listing one page at a time so memory
//! stays bounded regardless of dataset size, and materializes files
//! locally through same-directory temporary files so a concurrent reader
//! can never observe a partially-written final path.

use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use hoist_api::{DatasetSize, Digest, FileInfo};
use sha2::{Digest as _, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;
use uuid::Uuid;

use crate::error::TransferError;
use crate::progress::{NullProgress, ProgressSink, TaskHandle};
use crate::session::StorageSession;

/// Lazy pull-based iteration over a dataset manifest.
///
/// Buffers one page at a time and only fetches the next page once the
/// buffer is drained and the previous cursor was non-empty. Finite and
/// not restartable; dropping it early leaks nothing.
pub struct FileIterator {
    session: StorageSession,
    buffer: VecDeque<FileInfo>,
    cursor: Option<String>,
    started: bool,
    failed: bool,
}

impl FileIterator {
    pub fn new(session: StorageSession) -> Self {
        Self {
            session,
            buffer: VecDeque::new(),
            cursor: None,
            started: false,
            failed: false,
        }
    }

    /// Produce the next file, fetching a manifest page only when needed.
    pub async fn next(&mut self) -> Option<Result<FileInfo, TransferError>> {
        loop {
            if let Some(file) = self.buffer.pop_front() {
                return Some(Ok(file));
            }
            if self.failed {
                return None;
            }
            let cursor = if self.started {
                match self.cursor.as_deref() {
                    Some(cursor) if !cursor.is_empty() => cursor.to_string(),
                    // An empty cursor marked the final page.
                    _ => return None,
                }
            } else {
                String::new()
            };
            self.started = true;
            match self.session.manifest_page(&cursor).await {
                Ok(page) => {
                    self.buffer.extend(page.files);
                    self.cursor = Some(page.cursor.unwrap_or_default());
                }
                Err(error) => {
                    self.failed = true;
                    return Some(Err(error));
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct DownloadOptions {
    /// Overwrite existing local files instead of failing.
    pub force: bool,
    /// Bound on concurrently transferring workers for one call.
    pub max_workers: usize,
    /// Verify each file's streamed SHA-256 against its manifest digest.
    pub validate_checksum: bool,
    pub progress: Arc<dyn ProgressSink>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            force: false,
            max_workers: 8,
            validate_checksum: true,
            progress: Arc::new(NullProgress),
        }
    }
}

impl fmt::Debug for DownloadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadOptions")
            .field("force", &self.force)
            .field("max_workers", &self.max_workers)
            .field("validate_checksum", &self.validate_checksum)
            .field("progress", &"{ ... }")
            .finish()
    }
}

/// Download every file in the manifest into `target_dir`.
///
/// When the storage size summary is final the progress total is seeded up
/// front; otherwise the total grows ahead of each new file (downloaded so
/// far + next file + 1) so the display never appears to regress, and is
/// settled to the true total at the end.
pub async fn fetch(
    session: &StorageSession,
    size: Option<&DatasetSize>,
    target_dir: &Path,
    options: &DownloadOptions,
) -> Result<(), TransferError> {
    tokio::fs::create_dir_all(target_dir).await?;

    let progress = &options.progress;
    let known_total = size.filter(|s| s.is_final()).map(|s| s.bytes);
    let task = progress.add_task("downloading", known_total);

    let semaphore = Arc::new(Semaphore::new(options.max_workers.max(1)));
    let mut workers: JoinSet<Result<u64, TransferError>> = JoinSet::new();
    let mut files = FileIterator::new(session.clone());
    let mut first_error: Option<TransferError> = None;
    let mut downloaded: u64 = 0;

    while let Some(item) = files.next().await {
        let file = match item {
            Ok(file) => file,
            Err(error) => {
                first_error = Some(error);
                break;
            }
        };

        // Drain any workers that already finished so completed results
        // don't pile up unbounded.
        while let Some(joined) = workers.try_join_next() {
            collect(joined, &mut downloaded, &mut first_error);
        }
        if first_error.is_some() {
            break;
        }

        if known_total.is_none() {
            let next_size = file.size.unwrap_or(0);
            progress.set_total(task, Some(downloaded + next_size + 1));
        }

        let target_path = join_relative(target_dir, &file.path);
        if !options.force && target_path.exists() {
            first_error = Some(TransferError::FileExists(target_path));
            break;
        }

        let session = session.clone();
        let progress_for_task = Arc::clone(progress);
        let semaphore = Arc::clone(&semaphore);
        let validate = options.validate_checksum;
        workers.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| TransferError::Worker(e.to_string()))?;
            debug!(path = %file.path, "downloading file");
            download_file(&session, &file, &target_path, &progress_for_task, task, validate).await
        });
    }

    // Let in-flight workers finish either way; files already transferred
    // stay transferred.
    while let Some(joined) = workers.join_next().await {
        collect(joined, &mut downloaded, &mut first_error);
    }

    if first_error.is_none() && known_total.is_none() {
        progress.set_total(task, Some(downloaded));
    }
    progress.complete(task);
    match first_error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

fn collect(
    joined: Result<Result<u64, TransferError>, tokio::task::JoinError>,
    downloaded: &mut u64,
    first_error: &mut Option<TransferError>,
) {
    match joined {
        Ok(Ok(bytes)) => *downloaded += bytes,
        Ok(Err(error)) => {
            if first_error.is_none() {
                *first_error = Some(error);
            }
        }
        Err(join_error) => {
            if first_error.is_none() {
                *first_error = Some(TransferError::Worker(join_error.to_string()));
            }
        }
    }
}

/// Stream one file to a same-directory temporary path, then atomically
/// rename over the final target. On any failure the temporary file is
/// removed and the error propagates.
async fn download_file(
    session: &StorageSession,
    file: &FileInfo,
    target: &Path,
    progress: &Arc<dyn ProgressSink>,
    task: TaskHandle,
    validate_checksum: bool,
) -> Result<u64, TransferError> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = target
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!(".tmp.{}.hoist", Uuid::new_v4()));

    match write_to(session, file, &tmp, progress, task, validate_checksum).await {
        Ok(written) => match tokio::fs::rename(&tmp, target).await {
            Ok(()) => Ok(written),
            Err(error) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                Err(error.into())
            }
        },
        Err(error) => {
            let _ = tokio::fs::remove_file(&tmp).await;
            Err(error)
        }
    }
}

async fn write_to(
    session: &StorageSession,
    file: &FileInfo,
    tmp: &Path,
    progress: &Arc<dyn ProgressSink>,
    task: TaskHandle,
    validate_checksum: bool,
) -> Result<u64, TransferError> {
    let mut stream = match &file.url {
        Some(url) => session.stream_url(url).await?,
        // No transient URL on this manifest entry; fall back to the
        // authenticated path route.
        None => session.get_file(&file.path, 0, None).await?.into_body(),
    };

    let mut out = tokio::fs::File::create(tmp).await?;
    let mut hasher = validate_checksum.then(Sha256::new);
    let mut written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if let Some(hasher) = hasher.as_mut() {
            hasher.update(&chunk);
        }
        out.write_all(&chunk).await?;
        written += chunk.len() as u64;
        progress.advance(task, chunk.len() as u64);
    }
    out.flush().await?;
    drop(out);

    if let (Some(hasher), Some(expected)) = (hasher, &file.digest) {
        let actual = Digest::from_decoded(&hasher.finalize());
        if actual != *expected {
            return Err(TransferError::ChecksumMismatch {
                path: file.path.clone(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
    }
    Ok(written)
}

/// Join a forward-slash relative manifest path under the target directory.
fn join_relative(target_dir: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|part| !part.is_empty())
        .fold(target_dir.to_path_buf(), |path, part| path.join(part))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::testing::RecordingProgress;
    use crate::testing::{MockClient, MockResponse, storage_session};
    use serde_json::json;
    use std::sync::Arc;

    fn file_entry(path: &str, content: &[u8], url: &str) -> serde_json::Value {
        json!({
            "path": path,
            "size": content.len(),
            "digest": Digest::compute(content).encoded(),
            "updated": "2024-04-02T09:30:00Z",
            "url": url,
        })
    }

    /// Two manifest pages (a.txt, b.txt | sub/c.txt) plus the signed
    /// content URLs they point at.
    fn paged_client() -> Arc<MockClient> {
        MockClient::new(|req| {
            if req.url.ends_with("/manifest") {
                let cursor = req
                    .query
                    .iter()
                    .find(|(k, _)| k == "cursor")
                    .map(|(_, v)| v.as_str())
                    .unwrap_or("");
                if cursor.is_empty() {
                    MockResponse::json(json!({
                        "files": [
                            file_entry("a.txt", b"alpha", "https://cdn.test/a"),
                            file_entry("b.txt", b"bravo!", "https://cdn.test/b"),
                        ],
                        "cursor": "page-2",
                    }))
                } else {
                    MockResponse::json(json!({
                        "files": [file_entry("sub/c.txt", b"charlie", "https://cdn.test/c")],
                        "cursor": "",
                    }))
                }
            } else if req.url == "https://cdn.test/a" {
                MockResponse::ok().body(&b"alpha"[..])
            } else if req.url == "https://cdn.test/b" {
                MockResponse::ok().body(&b"bravo!"[..])
            } else if req.url == "https://cdn.test/c" {
                MockResponse::ok().body(&b"charlie"[..])
            } else {
                MockResponse {
                    status: 404,
                    headers: Vec::new(),
                    body: bytes::Bytes::new(),
                }
            }
        })
    }

    #[tokio::test]
    async fn manifest_iteration_is_lazy_and_ordered() {
        let client = paged_client();
        let session = storage_session(client.clone());
        let mut files = FileIterator::new(session);

        let mut paths = Vec::new();
        while let Some(file) = files.next().await {
            paths.push(file.unwrap().path);
        }
        assert_eq!(paths, ["a.txt", "b.txt", "sub/c.txt"]);

        let manifest_requests: Vec<_> = client
            .requests()
            .into_iter()
            .filter(|r| r.url.ends_with("/manifest"))
            .collect();
        assert_eq!(manifest_requests.len(), 2);
        let second_cursor = manifest_requests[1]
            .query
            .iter()
            .find(|(k, _)| k == "cursor")
            .map(|(_, v)| v.clone());
        assert_eq!(second_cursor.as_deref(), Some("page-2"));
    }

    #[tokio::test]
    async fn second_page_is_not_fetched_until_needed() {
        let client = paged_client();
        let session = storage_session(client.clone());
        let mut files = FileIterator::new(session);

        files.next().await.unwrap().unwrap();
        files.next().await.unwrap().unwrap();
        let manifest_requests = client
            .requests()
            .into_iter()
            .filter(|r| r.url.ends_with("/manifest"))
            .count();
        assert_eq!(manifest_requests, 1);
    }

    #[tokio::test]
    async fn iterator_stops_without_overfetching_an_empty_dataset() {
        let client = MockClient::new(|_req| {
            MockResponse::json(json!({"files": [], "cursor": ""}))
        });
        let session = storage_session(client.clone());
        let mut files = FileIterator::new(session);
        assert!(files.next().await.is_none());
        assert!(files.next().await.is_none());
        assert_eq!(client.requests().len(), 1);
    }

    #[tokio::test]
    async fn fetch_materializes_all_files_atomically() {
        let client = paged_client();
        let session = storage_session(client);
        let dir = tempfile::tempdir().unwrap();

        fetch(&session, None, dir.path(), &DownloadOptions::default())
            .await
            .unwrap();

        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"alpha");
        assert_eq!(std::fs::read(dir.path().join("b.txt")).unwrap(), b"bravo!");
        assert_eq!(
            std::fs::read(dir.path().join("sub").join("c.txt")).unwrap(),
            b"charlie"
        );
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn existing_file_without_force_fails_and_writes_nothing() {
        let client = MockClient::new(|req| {
            if req.url.ends_with("/manifest") {
                MockResponse::json(json!({
                    "files": [file_entry("a.txt", b"alpha", "https://cdn.test/a")],
                    "cursor": "",
                }))
            } else {
                MockResponse::ok().body(&b"alpha"[..])
            }
        });
        let session = storage_session(client);
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"precious").unwrap();

        let err = fetch(&session, None, dir.path(), &DownloadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::FileExists(_)));
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"precious");
    }

    #[tokio::test]
    async fn force_overwrites_existing_files() {
        let client = MockClient::new(|req| {
            if req.url.ends_with("/manifest") {
                MockResponse::json(json!({
                    "files": [file_entry("a.txt", b"alpha", "https://cdn.test/a")],
                    "cursor": "",
                }))
            } else {
                MockResponse::ok().body(&b"alpha"[..])
            }
        });
        let session = storage_session(client);
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"stale").unwrap();

        let options = DownloadOptions {
            force: true,
            ..Default::default()
        };
        fetch(&session, None, dir.path(), &options).await.unwrap();
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"alpha");
    }

    #[tokio::test]
    async fn checksum_mismatch_fails_and_cleans_up() {
        let client = MockClient::new(|req| {
            if req.url.ends_with("/manifest") {
                // The manifest advertises different content than the
                // storage endpoint serves.
                MockResponse::json(json!({
                    "files": [file_entry("a.txt", b"expected", "https://cdn.test/a")],
                    "cursor": "",
                }))
            } else {
                MockResponse::ok().body(&b"corrupted"[..])
            }
        });
        let session = storage_session(client);
        let dir = tempfile::tempdir().unwrap();

        let err = fetch(&session, None, dir.path(), &DownloadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::ChecksumMismatch { .. }));
        assert!(!dir.path().join("a.txt").exists());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn unsized_progress_never_regresses_and_settles_to_the_truth() {
        let client = MockClient::new(|req| {
            if req.url.ends_with("/manifest") {
                MockResponse::json(json!({
                    "files": [file_entry("a.txt", b"alpha", "https://cdn.test/a")],
                    "cursor": "",
                }))
            } else {
                MockResponse::ok().body(&b"alpha"[..])
            }
        });
        let session = storage_session(client);
        let dir = tempfile::tempdir().unwrap();

        let recording = Arc::new(RecordingProgress::new());
        let options = DownloadOptions {
            progress: recording.clone(),
            ..Default::default()
        };
        fetch(&session, None, dir.path(), &options).await.unwrap();

        let totals: Vec<Option<u64>> = recording
            .totals
            .lock()
            .unwrap()
            .iter()
            .map(|(_, t)| *t)
            .collect();
        // Indeterminate at first, seeded ahead of the file, settled after.
        assert_eq!(totals.first().copied(), Some(None));
        assert!(totals.contains(&Some(6)));
        assert_eq!(totals.last().copied(), Some(Some(5)));
    }

    #[tokio::test]
    async fn final_size_seeds_a_determinate_bar() {
        let client = paged_client();
        let session = storage_session(client);
        let dir = tempfile::tempdir().unwrap();

        let recording = Arc::new(RecordingProgress::new());
        let options = DownloadOptions {
            progress: recording.clone(),
            ..Default::default()
        };
        let size = DatasetSize {
            files: 3,
            bytes: 18,
            final_: Some(true),
        };
        fetch(&session, Some(&size), dir.path(), &options).await.unwrap();

        let totals = recording.totals.lock().unwrap();
        assert_eq!(totals[0].1, Some(18));
        // A known-final total is never re-seeded per file.
        assert_eq!(totals.len(), 1);
    }
}
