use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::time;

/// The derived status of a job, in lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurrentJobStatus {
    Created,
    Scheduled,
    Running,
    Idle,
    Exited,
    Failed,
    Finalized,
    Canceled,
    Preempted,
}

impl std::fmt::Display for CurrentJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CurrentJobStatus::Created => "created",
            CurrentJobStatus::Scheduled => "scheduled",
            CurrentJobStatus::Running => "running",
            CurrentJobStatus::Idle => "idle",
            CurrentJobStatus::Exited => "exited",
            CurrentJobStatus::Failed => "failed",
            CurrentJobStatus::Finalized => "finalized",
            CurrentJobStatus::Canceled => "canceled",
            CurrentJobStatus::Preempted => "preempted",
        };
        f.write_str(name)
    }
}

/// Machine-readable cancellation reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum CanceledCode {
    NotSet,
    SystemPreemption,
    UserPreemption,
    Idle,
    Other(u8),
}

impl From<u8> for CanceledCode {
    fn from(code: u8) -> Self {
        match code {
            0 => CanceledCode::NotSet,
            1 => CanceledCode::SystemPreemption,
            2 => CanceledCode::UserPreemption,
            3 => CanceledCode::Idle,
            other => CanceledCode::Other(other),
        }
    }
}

impl From<CanceledCode> for u8 {
    fn from(code: CanceledCode) -> Self {
        match code {
            CanceledCode::NotSet => 0,
            CanceledCode::SystemPreemption => 1,
            CanceledCode::UserPreemption => 2,
            CanceledCode::Idle => 3,
            CanceledCode::Other(other) => other,
        }
    }
}

/// The raw status record of a job: a set of nullable stage timestamps.
///
/// Transitions are monotonic; the current status is derived from which
/// timestamps are set, never stored as an enum of its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub created: DateTime<Utc>,
    #[serde(default, with = "time::nullable")]
    pub scheduled: Option<DateTime<Utc>>,
    #[serde(default, with = "time::nullable")]
    pub started: Option<DateTime<Utc>>,
    #[serde(default, with = "time::nullable")]
    pub exited: Option<DateTime<Utc>>,
    #[serde(default, with = "time::nullable")]
    pub failed: Option<DateTime<Utc>>,
    #[serde(default, with = "time::nullable")]
    pub finalized: Option<DateTime<Utc>>,
    #[serde(default, with = "time::nullable")]
    pub canceled: Option<DateTime<Utc>>,
    #[serde(default)]
    pub canceled_for: Option<String>,
    #[serde(default)]
    pub canceled_code: Option<CanceledCode>,
    #[serde(default, with = "time::nullable")]
    pub idle_since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub message: Option<String>,
}

impl JobStatus {
    /// Derive the current status by checking stage timestamps in fixed
    /// priority order. A pure function of this record.
    pub fn current(&self) -> CurrentJobStatus {
        if self.finalized.is_some() {
            CurrentJobStatus::Finalized
        } else if self.failed.is_some() {
            CurrentJobStatus::Failed
        } else if self.exited.is_some() {
            CurrentJobStatus::Exited
        } else if self.canceled.is_some() {
            match self.canceled_code {
                Some(CanceledCode::SystemPreemption) | Some(CanceledCode::UserPreemption) => {
                    CurrentJobStatus::Preempted
                }
                _ => CurrentJobStatus::Canceled,
            }
        } else if self.idle_since.is_some() {
            CurrentJobStatus::Idle
        } else if self.started.is_some() {
            CurrentJobStatus::Running
        } else if self.scheduled.is_some() {
            CurrentJobStatus::Scheduled
        } else {
            CurrentJobStatus::Created
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Execution,
    Session,
}

/// Linkage from a job back to the task and experiment that spawned it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobExecution {
    pub task: String,
    pub experiment: String,
    #[serde(default)]
    pub workspace: Option<String>,
}

/// One execution of a task on a cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub kind: Option<JobKind>,
    #[serde(default)]
    pub author: Option<Account>,
    #[serde(default)]
    pub workspace: Option<String>,
    #[serde(default)]
    pub cluster: Option<String>,
    pub status: JobStatus,
    #[serde(default)]
    pub execution: Option<JobExecution>,
    #[serde(default)]
    pub node: Option<String>,
}

impl Job {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn is_finalized(&self) -> bool {
        self.status.current() == CurrentJobStatus::Finalized
    }

    pub fn was_preempted(&self) -> bool {
        self.status.canceled.is_some()
            && matches!(
                self.status.canceled_code,
                Some(CanceledCode::SystemPreemption) | Some(CanceledCode::UserPreemption)
            )
    }
}

/// One page of a job listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Jobs {
    #[serde(default)]
    pub data: Option<Vec<Job>>,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finalized: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canceled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatusUpdate>,
}
