pub mod ledger;
pub mod logs;

pub use ledger::JobLedger;
pub use logs::{JobLog, LogStore};

use crate::error::Error;
use crate::filter::{Filter, Predicate, predicate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Immutable snapshot of one command invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Request {
    pub command: String,
    pub args: Vec<String>,
    pub username: String,
    pub user_id: String,
    pub user_link: String,
    pub channel: String,
    pub channel_id: String,
    pub channel_link: String,
    pub is_im: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Running,
    Successful,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Successful => "Successful",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        self != Self::Running
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "running" => Ok(Self::Running),
            "successful" | "success" => Ok(Self::Successful),
            "failed" | "failure" => Ok(Self::Failed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            _ => Err(Error::invalid(format!(
                "invalid job status {value:?}, expected running, successful, failed or cancelled"
            ))),
        }
    }
}

/// One persisted command invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: u64,
    pub request: Request,
    pub status: JobStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Job {
    /// A job value that is never written to the ledger. Used for commands
    /// that opt out of recording.
    pub fn transient(request: Request) -> Self {
        Self {
            id: 0,
            request,
            status: JobStatus::Running,
            start_time: Utc::now(),
            end_time: None,
        }
    }
}

pub type JobFilter = Filter<Job>;

pub fn is_user(username: impl Into<String>) -> Predicate<Job> {
    let username = username.into();
    predicate(move |job: &Job| job.request.username == username)
}

pub fn is_job_id(id: u64) -> Predicate<Job> {
    predicate(move |job: &Job| job.id == id)
}

/// Matches jobs in `status`, or every job when `status` is `None`.
pub fn is_status_or_any(status: Option<JobStatus>) -> Predicate<Job> {
    predicate(move |job: &Job| status.is_none_or(|s| job.status == s))
}
