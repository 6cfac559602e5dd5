use std::sync::Arc;

use futures_util::StreamExt;
use hoist_api::{Job, JobKind, JobPatch, JobStatusUpdate, Jobs};
use hoist_http::{ByteStream, Method, Payload, Request};
use hoist_transfer::{ProgressSink, TaskHandle};

use crate::client::Hoist;
use crate::error::{Error, Result};
use crate::poll::{self, Completions, WaitOptions};
use crate::services::url_quote;

/// A job argument: either a bare ID or an already-fetched record.
#[derive(Debug, Clone, Copy)]
pub enum JobRef<'a> {
    Id(&'a str),
    Resolved(&'a Job),
}

impl<'a> From<&'a str> for JobRef<'a> {
    fn from(id: &'a str) -> Self {
        JobRef::Id(id)
    }
}

impl<'a> From<&'a Job> for JobRef<'a> {
    fn from(job: &'a Job) -> Self {
        JobRef::Resolved(job)
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobListOptions {
    pub cluster: Option<String>,
    pub experiment: Option<String>,
    pub node: Option<String>,
    pub finalized: bool,
    pub kind: Option<JobKind>,
}

pub struct JobClient<'a> {
    pub(crate) hoist: &'a Hoist,
}

impl<'h> JobClient<'h> {
    pub async fn get(&self, job_id: &str) -> Result<Job> {
        let response = self
            .hoist
            .transport()
            .send(Request::new(Method::Get, format!("jobs/{}", url_quote(job_id))))
            .await;
        match response {
            Ok(response) => Ok(response.json().await?),
            Err(error) if error.status() == Some(404) => {
                Err(Error::JobNotFound(job_id.to_string()))
            }
            Err(error) => Err(error.into()),
        }
    }

    pub(crate) async fn resolve(&self, job: &JobRef<'_>) -> Result<Job> {
        match job {
            JobRef::Id(id) => self.get(id).await,
            JobRef::Resolved(job) => Ok((*job).clone()),
        }
    }

    /// List jobs, gathering every page. One of `cluster`, `experiment`,
    /// or `node` must be given; `node` excludes the other two.
    pub async fn list(&self, options: &JobListOptions) -> Result<Vec<Job>> {
        if options.node.is_some() {
            if options.cluster.is_some() {
                return Err(Error::Validation(
                    "cannot specify both 'node' and 'cluster'".to_string(),
                ));
            }
            if options.experiment.is_some() {
                return Err(Error::Validation(
                    "cannot specify both 'node' and 'experiment'".to_string(),
                ));
            }
        } else if options.cluster.is_none() && options.experiment.is_none() {
            return Err(Error::Validation(
                "one of 'node', 'experiment', or 'cluster' must be specified".to_string(),
            ));
        }

        let mut jobs = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut request = Request::new(Method::Get, "jobs")
                .query("finalized", options.finalized.to_string());
            if let Some(cluster) = &options.cluster {
                request = request.query("cluster", cluster);
            }
            if let Some(experiment) = &options.experiment {
                request = request.query("experiment", experiment);
            }
            if let Some(node) = &options.node {
                request = request.query("node", node);
            }
            if let Some(kind) = options.kind {
                let kind = match kind {
                    JobKind::Execution => "execution",
                    JobKind::Session => "session",
                };
                request = request.query("kind", kind);
            }
            if let Some(cursor) = &cursor {
                request = request.query("cursor", cursor);
            }
            let page: Jobs = self.hoist.transport().send(request).await?.json().await?;
            if let Some(data) = page.data {
                jobs.extend(data);
            }
            match page.next {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(jobs)
    }

    /// Stream the logs for a job, advancing `progress` per chunk. The
    /// progress line completes when the returned stream is dropped.
    pub async fn logs<'r>(
        &self,
        job: impl Into<JobRef<'r>>,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<ByteStream> {
        let job = self.resolve(&job.into()).await?;
        let response = match self
            .hoist
            .transport()
            .send(Request::new(
                Method::Get,
                format!("jobs/{}/logs", url_quote(&job.id)),
            ))
            .await
        {
            Ok(response) => response,
            Err(error) if error.status() == Some(404) => {
                return Err(Error::JobNotFound(job.id));
            }
            Err(error) => return Err(error.into()),
        };
        let task = progress.add_task("downloading logs", None);
        let guard = CompleteOnDrop { progress, task };
        let stream = response.into_body().map(move |chunk| {
            if let Ok(chunk) = &chunk {
                guard.progress.advance(guard.task, chunk.len() as u64);
            }
            chunk
        });
        Ok(Box::pin(stream))
    }

    /// Mark a job as finalized.
    pub async fn finalize<'r>(&self, job: impl Into<JobRef<'r>>) -> Result<Job> {
        self.patch_status(
            job.into(),
            JobStatusUpdate {
                finalized: Some(true),
                ..Default::default()
            },
        )
        .await
    }

    /// Cancel a job.
    pub async fn stop<'r>(&self, job: impl Into<JobRef<'r>>) -> Result<Job> {
        self.patch_status(
            job.into(),
            JobStatusUpdate {
                canceled: Some(true),
                ..Default::default()
            },
        )
        .await
    }

    async fn patch_status(&self, job: JobRef<'_>, update: JobStatusUpdate) -> Result<Job> {
        let id = self.resolve(&job).await?.id;
        let patch = JobPatch {
            status: Some(update),
        };
        let response = self
            .hoist
            .transport()
            .send(
                Request::new(Method::Patch, format!("jobs/{}", url_quote(&id)))
                    .payload(Payload::Json(serde_json::to_value(&patch)?)),
            )
            .await;
        match response {
            Ok(response) => Ok(response.json().await?),
            Err(error) if error.status() == Some(404) => Err(Error::JobNotFound(id)),
            Err(error) => Err(error.into()),
        }
    }

    /// Wait for jobs to finalize, returning them in the same order they
    /// were given, regardless of completion order.
    pub async fn wait_for(&self, jobs: &[JobRef<'_>], options: &WaitOptions) -> Result<Vec<Job>> {
        poll::wait_for(self.hoist, jobs, options).await
    }

    /// Wait for jobs to finalize, yielding each one as it completes.
    pub async fn as_completed(
        &self,
        jobs: &[JobRef<'_>],
        options: &WaitOptions,
    ) -> Result<Completions<'h>> {
        poll::as_completed(self.hoist, jobs, options).await
    }
}

struct CompleteOnDrop {
    progress: Arc<dyn ProgressSink>,
    task: TaskHandle,
}

impl Drop for CompleteOnDrop {
    fn drop(&mut self) {
        self.progress.complete(self.task);
    }
}
