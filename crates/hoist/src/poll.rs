//! Job-completion polling.
//!
//! Bridges the stateless "get job" endpoint into blocking wait
//! primitives. Only `finalized` ends the wait for a job: `exited`,
//! `failed`, and `canceled` are lifecycle stages that strictly precede
//! finalization on the service, and waiting for anything earlier would
//! change observable timing.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hoist_api::Job;
use hoist_transfer::{NullProgress, ProgressSink, TaskHandle};
use tracing::debug;

use crate::client::Hoist;
use crate::error::{Error, Result};
use crate::services::JobRef;

#[derive(Clone)]
pub struct WaitOptions {
    /// Wall-clock bound on the whole wait, checked at pass boundaries.
    pub timeout: Option<Duration>,
    /// Sleep between polling passes.
    pub poll_interval: Duration,
    pub progress: Arc<dyn ProgressSink>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            poll_interval: Duration::from_secs(1),
            progress: Arc::new(NullProgress),
        }
    }
}

impl fmt::Debug for WaitOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitOptions")
            .field("timeout", &self.timeout)
            .field("poll_interval", &self.poll_interval)
            .field("progress", &"{ ... }")
            .finish()
    }
}

pub(crate) async fn wait_for(
    hoist: &Hoist,
    jobs: &[JobRef<'_>],
    options: &WaitOptions,
) -> Result<Vec<Job>> {
    let mut completions = as_completed(hoist, jobs, options).await?;
    // Input order was fixed at resolution; restore it at the end.
    let positions: HashMap<String, usize> = completions
        .pending
        .iter()
        .enumerate()
        .map(|(index, entry)| (entry.job.id.clone(), index))
        .collect();

    let mut finished: Vec<(usize, Job)> = Vec::with_capacity(positions.len());
    while let Some(item) = completions.next().await {
        let job = item?;
        let position = positions.get(&job.id).copied().unwrap_or(usize::MAX);
        finished.push((position, job));
    }
    finished.sort_by_key(|(position, _)| *position);
    Ok(finished.into_iter().map(|(_, job)| job).collect())
}

pub(crate) async fn as_completed<'h>(
    hoist: &'h Hoist,
    jobs: &[JobRef<'_>],
    options: &WaitOptions,
) -> Result<Completions<'h>> {
    if let Some(timeout) = options.timeout
        && timeout <= Duration::ZERO
    {
        return Err(Error::Validation(
            "'timeout' must be a positive number".to_string(),
        ));
    }

    // Resolve every reference once, establishing a stable input order,
    // and reject ambiguous duplicates.
    let mut pending: VecDeque<PendingJob> = VecDeque::with_capacity(jobs.len());
    let mut seen: HashSet<String> = HashSet::with_capacity(jobs.len());
    for job_ref in jobs {
        let job = hoist.jobs().resolve(job_ref).await?;
        if !seen.insert(job.id.clone()) {
            for entry in &pending {
                options.progress.complete(entry.handle);
            }
            return Err(Error::DuplicateJob(job.display_name().to_string()));
        }
        let handle = options.progress.add_task(job.display_name(), None);
        pending.push_back(PendingJob { job, handle });
    }

    Ok(Completions {
        hoist,
        pending,
        queued: VecDeque::new(),
        progress: Arc::clone(&options.progress),
        timeout: options.timeout,
        poll_interval: options.poll_interval,
        started: Instant::now(),
        passes: 0,
        done: false,
    })
}

struct PendingJob {
    job: Job,
    handle: TaskHandle,
}

/// A pull-based stream of jobs in completion order.
///
/// Each call to [`next`](Completions::next) polls every still-pending job
/// in turn; jobs observed finalized within one pass are yielded in pass
/// order. A consumer that stops pulling simply halts further polling, and
/// progress lines are torn down on completion, error, or abandonment.
pub struct Completions<'h> {
    hoist: &'h Hoist,
    pending: VecDeque<PendingJob>,
    queued: VecDeque<Job>,
    progress: Arc<dyn ProgressSink>,
    timeout: Option<Duration>,
    poll_interval: Duration,
    started: Instant,
    passes: u32,
    done: bool,
}

impl Completions<'_> {
    /// Produce the next finalized job, or `None` once every job has been
    /// yielded. Times out with [`Error::JobTimeout`] and fuses afterwards.
    pub async fn next(&mut self) -> Option<Result<Job>> {
        if let Some(job) = self.queued.pop_front() {
            return Some(Ok(job));
        }
        if self.done || self.pending.is_empty() {
            self.done = true;
            return None;
        }

        loop {
            // The timeout is checked at pass boundaries only, and the
            // first pass starts immediately.
            if self.passes > 0 {
                if let Some(timeout) = self.timeout
                    && self.started.elapsed() >= timeout
                {
                    self.done = true;
                    self.teardown();
                    return Some(Err(Error::JobTimeout));
                }
                tokio::time::sleep(self.poll_interval).await;
            }
            self.passes += 1;

            // One pass: re-fetch every pending job in order.
            let mut still_pending = VecDeque::with_capacity(self.pending.len());
            while let Some(entry) = self.pending.pop_front() {
                match self.hoist.jobs().get(&entry.job.id).await {
                    Ok(job) => {
                        if job.is_finalized() {
                            debug!(id = %job.id, "job finalized");
                            self.progress.complete(entry.handle);
                            self.queued.push_back(job);
                        } else {
                            self.progress.advance(entry.handle, 1);
                            still_pending.push_back(PendingJob {
                                job,
                                handle: entry.handle,
                            });
                        }
                    }
                    Err(error) => {
                        self.progress.complete(entry.handle);
                        still_pending.extend(self.pending.drain(..));
                        self.pending = still_pending;
                        self.done = true;
                        self.teardown();
                        return Some(Err(error));
                    }
                }
            }
            self.pending = still_pending;

            if let Some(job) = self.queued.pop_front() {
                return Some(Ok(job));
            }
            if self.pending.is_empty() {
                // Everything finalized and was already yielded.
                self.done = true;
                return None;
            }
        }
    }

    fn teardown(&mut self) {
        for entry in self.pending.drain(..) {
            self.progress.complete(entry.handle);
        }
    }
}

impl Drop for Completions<'_> {
    fn drop(&mut self) {
        self.teardown();
    }
}
