//! The central job entity and its status machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Queues a job may be routed to.
pub const ALLOWED_QUEUES: &[&str] = &["default", "email", "webhooks", "payment"];

/// Job types with a registered payload schema and handler.
pub const ALLOWED_JOB_TYPES: &[&str] = &["send_email", "process_payment", "send_webhook"];

/// Job execution status.
///
/// `Completed` and `Failed` are terminal; a job never leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to be claimed.
    Queued,
    /// Claimed by a worker and executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Exhausted its retry budget.
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::str::FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a status string outside the canonical vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job status: {0}")]
pub struct UnknownStatus(pub String);

/// A persisted job row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Store-assigned identifier.
    pub id: i64,
    /// Routing key; one of [`ALLOWED_QUEUES`].
    pub queue: String,
    /// Selects the payload schema and handler; one of [`ALLOWED_JOB_TYPES`].
    pub job_type: String,
    /// Opaque JSON payload, validated against the per-type schema at create.
    pub payload: serde_json::Value,
    pub status: JobStatus,
    /// Failed executions so far.
    pub attempts: i32,
    /// Upper bound on attempts before the job goes terminal.
    pub max_retries: i32,
    /// Earliest time the job may be claimed.
    pub available_at: DateTime<Utc>,
    /// Claim time; present exactly while a worker owns the job.
    pub locked_at: Option<DateTime<Utc>>,
    /// Owning worker id. Zero is a legal owner; `None` means unowned.
    pub locked_by: Option<i64>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn is_locked(&self) -> bool {
        self.locked_at.is_some()
    }

    /// Whether the lease on a running job has expired.
    pub fn lease_expired(&self, lease: chrono::Duration, now: DateTime<Utc>) -> bool {
        match self.locked_at {
            Some(locked_at) => locked_at < now - lease,
            None => false,
        }
    }
}

/// Input for creating a job. The repository assigns id, status, attempts
/// and timestamps.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub queue: String,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub max_retries: i32,
    /// When absent, the repository makes the job available immediately.
    pub available_at: Option<DateTime<Utc>>,
}
