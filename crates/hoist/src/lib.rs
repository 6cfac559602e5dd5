//! Client for the Hoist cluster-job execution service.
//!
//! The service schedules container workloads across clusters; this crate
//! is the typed HTTP façade over it. The interesting client-side logic
//! lives in the transfer engines (chunked dataset uploads and
//! manifest-paginated downloads, re-exported from `hoist-transfer`) and
//! the job-completion poller in [`JobClient::wait_for`] /
//! [`JobClient::as_completed`]; the rest wraps one-shot REST calls.
//!
//! ```no_run
//! use hoist::{Hoist, WaitOptions};
//!
//! # async fn run() -> hoist::Result<()> {
//! let hoist = Hoist::from_env()?;
//! let dataset = hoist
//!     .datasets()
//!     .create("my-data", Some("./data".as_ref()), &Default::default())
//!     .await?;
//! let job = hoist.jobs().get("01J0000000000000000000000").await?;
//! let done = hoist
//!     .jobs()
//!     .wait_for(&[(&job).into()], &WaitOptions::default())
//!     .await?;
//! # let _ = (dataset, done);
//! # Ok(())
//! # }
//! ```

mod cache;
mod client;
mod config;
mod error;
mod poll;
mod services;
#[cfg(test)]
pub(crate) mod testing;

pub use cache::TtlCache;
pub use client::Hoist;
pub use config::{ADDRESS_KEY, CONFIG_PATH_KEY, Config, ConfigError, TOKEN_KEY};
pub use error::{Error, Result};
pub use poll::{Completions, WaitOptions};
pub use services::{
    AccountClient, CreateDatasetOptions, DatasetClient, DatasetRef, ExperimentClient,
    ExperimentRef, JobClient, JobListOptions, JobRef, WorkspaceClient,
};

pub use hoist_api as api;
pub use hoist_http::ByteStream;
pub use hoist_transfer::{
    BarProgress, DownloadOptions, FileIterator, NullProgress, ProgressSink, UploadOptions,
};
