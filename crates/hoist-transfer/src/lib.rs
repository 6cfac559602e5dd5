//! Chunked dataset upload and manifest-paginated download engines.
//!
//! # Architecture
//!
//! - [`StorageSession`] - the storage-endpoint wire contract (resumable
//!   uploads, file puts, manifest pages, ranged gets)
//! - [`upload`] - splits a file or directory tree into transfer units and
//!   fans them out across a bounded worker pool; small files go up in one
//!   request, large files through the offset-addressed resumable protocol
//! - [`download`] - consumes the cursor-paginated manifest lazily and
//!   materializes files with atomic rename-on-completion
//! - [`ProgressSink`] - narrow progress capability; [`NullProgress`]
//!   satisfies quiet mode without changing behavior
//!
//! Both engines lean on the transport for retries and keep no retry loops
//! of their own. Partial failure is not rolled back: files already
//! transferred stay transferred, and the first fatal error wins.

pub mod download;
mod error;
mod progress;
mod session;
#[cfg(test)]
pub(crate) mod testing;
pub mod upload;

pub use download::{DownloadOptions, FileIterator, fetch};
pub use error::TransferError;
pub use progress::{BarProgress, NullProgress, ProgressSink, TaskHandle};
pub use session::{
    HEADER_CONTENT_LENGTH, HEADER_DIGEST, HEADER_LAST_MODIFIED, HEADER_UPLOAD_ID,
    HEADER_UPLOAD_LENGTH, HEADER_UPLOAD_OFFSET, StorageSession,
};
pub use upload::{REQUEST_SIZE_LIMIT, UploadOptions, sync_source, upload_bytes, upload_file};
