//! The job repository contract and its error kinds.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use relayq_core::{Job, JobStatus, NewJob};

/// Repository-level failure.
///
/// `NoJobAvailable` and `Canceled` are control flow for callers, not faults:
/// workers back off on the former and shut down on the latter.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("job not found")]
    NotFound,

    #[error("no jobs available")]
    NoJobAvailable,

    #[error("conflicting job row")]
    Conflict,

    #[error("operation canceled")]
    Canceled,

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}

/// Typed operations over the jobs table.
///
/// Every method takes a cancellation token; a canceled in-flight call
/// surfaces as [`RepoError::Canceled`], never as a store failure. The
/// dispatch protocol (`acquire_next`, `release`, `retry_later`,
/// `mark_completed`, `list_stuck_jobs`) is the only path that touches the
/// lock columns.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a new job with `status = queued`, `attempts = 0` and
    /// `available_at` defaulted to now when unset. Returns the stored row.
    async fn create(&self, ctx: &CancellationToken, job: NewJob) -> Result<Job, RepoError>;

    async fn get(&self, ctx: &CancellationToken, id: i64) -> Result<Job, RepoError>;

    /// All jobs on a queue, for operator inspection. Not a dispatch path.
    async fn list(&self, ctx: &CancellationToken, queue: &str) -> Result<Vec<Job>, RepoError>;

    /// Unconditional status write; lock columns are left alone.
    async fn update_status(
        &self,
        ctx: &CancellationToken,
        id: i64,
        status: JobStatus,
    ) -> Result<(), RepoError>;

    /// `attempts := attempts + 1`, computed in the store, never read back
    /// and rewritten.
    async fn increment_attempts(&self, ctx: &CancellationToken, id: i64) -> Result<(), RepoError>;

    /// Write `result` and `error` in one statement.
    async fn save_result(
        &self,
        ctx: &CancellationToken,
        id: i64,
        result: Option<serde_json::Value>,
        error: Option<&str>,
    ) -> Result<(), RepoError>;

    /// Terminal success: `status = completed`, result stored, lock cleared.
    async fn mark_completed(
        &self,
        ctx: &CancellationToken,
        id: i64,
        result: serde_json::Value,
    ) -> Result<(), RepoError>;

    /// Atomically claim the next available job on `queue` for `worker_id`.
    ///
    /// The scan takes rows that are `queued`, available, and either unlocked
    /// or holding a lease older than `lease`; ordering is
    /// `(available_at, id)` ascending; rows locked by concurrent claims are
    /// skipped rather than waited on. On success the row is `running` with
    /// `locked_at = now` and `locked_by = worker_id` before the transaction
    /// commits.
    async fn acquire_next(
        &self,
        ctx: &CancellationToken,
        queue: &str,
        worker_id: i64,
        lease: Duration,
    ) -> Result<Job, RepoError>;

    /// Return a job to `queued` with its lock cleared. Absent rows are a
    /// no-op; the reaper may race a finalizing worker.
    async fn release(&self, ctx: &CancellationToken, id: i64) -> Result<(), RepoError>;

    /// Reschedule: `queued`, new `available_at`, lock cleared. `attempts`
    /// is untouched; the worker accounts for the failed attempt separately.
    async fn retry_later(
        &self,
        ctx: &CancellationToken,
        id: i64,
        available_at: DateTime<Utc>,
    ) -> Result<(), RepoError>;

    /// `running` jobs whose lock is older than `stale`. Reaper only.
    async fn list_stuck_jobs(
        &self,
        ctx: &CancellationToken,
        stale: Duration,
    ) -> Result<Vec<Job>, RepoError>;
}
