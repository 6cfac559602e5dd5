use std::path::PathBuf;

use hoist_http::HttpError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    /// The source ran out of bytes before its declared size was reached,
    /// or a standalone source file was empty.
    #[error("unexpected end of input reading '{0}'")]
    UnexpectedEof(PathBuf),

    #[error("source not found: '{0}'")]
    SourceNotFound(PathBuf),

    /// A download target already exists locally and `force` was not set.
    #[error("file already exists: '{0}'")]
    FileExists(PathBuf),

    #[error("checksum for '{path}' failed: expected '{expected}', got '{actual}'")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("storage endpoint did not return an upload ID")]
    MissingUploadId,

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("worker task failed: {0}")]
    Worker(String),
}
