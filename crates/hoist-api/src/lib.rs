//! Typed records for the Hoist scheduling service API.
//!
//! Everything here is plain data: JSON round-tripping with the service's
//! camelCase field naming, nullable timestamps, and the [`Digest`] value
//! type used to integrity-check transferred bytes. No I/O lives in this
//! crate.

mod account;
mod dataset;
mod digest;
mod experiment;
mod job;
pub(crate) mod time;
mod workspace;

pub use account::Account;
pub use dataset::{
    Dataset, DatasetPatch, DatasetSize, DatasetSpec, DatasetStorage, FileInfo, ManifestPage,
};
pub use digest::{Digest, DigestDecodeError};
pub use experiment::{
    DataMount, DataSource, EnvVar, Experiment, ExperimentSpec, ImageSource, ResultSpec,
    TaskContext, TaskSpec,
};
pub use job::{
    CanceledCode, CurrentJobStatus, Job, JobExecution, JobKind, JobPatch, JobStatus,
    JobStatusUpdate, Jobs,
};
pub use workspace::{Workspace, WorkspaceRef};
