use hoist_http::HttpError;
use hoist_transfer::TransferError;
use thiserror::Error;

use crate::config::ConfigError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("workspace not found: '{0}'")]
    WorkspaceNotFound(String),

    #[error("dataset not found: '{0}'")]
    DatasetNotFound(String),

    #[error("experiment not found: '{0}'")]
    ExperimentNotFound(String),

    #[error("job not found: '{0}'")]
    JobNotFound(String),

    #[error("file not found in dataset: '{0}'")]
    FileNotFound(String),

    #[error("a dataset named '{0}' already exists")]
    DatasetConflict(String),

    #[error("an experiment named '{0}' already exists or is already stopped")]
    ExperimentConflict(String),

    #[error("workspace '{0}' has been archived")]
    WorkspaceArchived(String),

    #[error("workspace not specified and no default workspace set")]
    WorkspaceNotSet,

    /// The dataset was already committed, so its storage session is void.
    #[error("dataset '{0}' has already been committed")]
    DatasetWriteError(String),

    #[error("storage has not been set for dataset '{0}'")]
    DatasetReadError(String),

    #[error("no default organization set and '{0}' doesn't include one")]
    OrganizationNotSet(String),

    #[error("duplicate job: '{0}'")]
    DuplicateJob(String),

    #[error("timed out waiting for jobs to finalize")]
    JobTimeout,

    #[error("{0}")]
    Validation(String),

    #[error(
        "invalid name '{0}': names can only contain letters, digits, periods, dashes, and underscores"
    )]
    InvalidName(String),

    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
