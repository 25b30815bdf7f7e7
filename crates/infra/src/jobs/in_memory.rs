//! In-memory job repository for tests and local development.
//!
//! Mirrors the claim semantics of the Postgres implementation (availability,
//! FIFO order, lease expiry) without the store. Cancellation is checked at
//! method entry only; there is no in-flight call to interrupt.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use relayq_core::{Job, JobStatus, NewJob};

use super::repository::{JobRepository, RepoError};

#[derive(Debug)]
pub struct InMemoryJobRepository {
    jobs: RwLock<HashMap<i64, Job>>,
    next_id: AtomicI64,
}

impl Default for InMemoryJobRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn check(ctx: &CancellationToken) -> Result<(), RepoError> {
        if ctx.is_cancelled() {
            return Err(RepoError::Canceled);
        }
        Ok(())
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn create(&self, ctx: &CancellationToken, job: NewJob) -> Result<Job, RepoError> {
        Self::check(ctx)?;
        let now = Utc::now();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let stored = Job {
            id,
            queue: job.queue,
            job_type: job.job_type,
            payload: job.payload,
            status: JobStatus::Queued,
            attempts: 0,
            max_retries: job.max_retries,
            available_at: job.available_at.unwrap_or(now),
            locked_at: None,
            locked_by: None,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        };
        self.jobs.write().unwrap().insert(id, stored.clone());
        Ok(stored)
    }

    async fn get(&self, ctx: &CancellationToken, id: i64) -> Result<Job, RepoError> {
        Self::check(ctx)?;
        self.jobs
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn list(&self, ctx: &CancellationToken, queue: &str) -> Result<Vec<Job>, RepoError> {
        Self::check(ctx)?;
        let jobs = self.jobs.read().unwrap();
        let mut result: Vec<Job> = jobs.values().filter(|j| j.queue == queue).cloned().collect();
        result.sort_by_key(|j| j.id);
        Ok(result)
    }

    async fn update_status(
        &self,
        ctx: &CancellationToken,
        id: i64,
        status: JobStatus,
    ) -> Result<(), RepoError> {
        Self::check(ctx)?;
        if let Some(job) = self.jobs.write().unwrap().get_mut(&id) {
            job.status = status;
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn increment_attempts(&self, ctx: &CancellationToken, id: i64) -> Result<(), RepoError> {
        Self::check(ctx)?;
        if let Some(job) = self.jobs.write().unwrap().get_mut(&id) {
            job.attempts += 1;
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn save_result(
        &self,
        ctx: &CancellationToken,
        id: i64,
        result: Option<serde_json::Value>,
        error: Option<&str>,
    ) -> Result<(), RepoError> {
        Self::check(ctx)?;
        if let Some(job) = self.jobs.write().unwrap().get_mut(&id) {
            job.result = result;
            job.error = error.map(str::to_string);
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_completed(
        &self,
        ctx: &CancellationToken,
        id: i64,
        result: serde_json::Value,
    ) -> Result<(), RepoError> {
        Self::check(ctx)?;
        if let Some(job) = self.jobs.write().unwrap().get_mut(&id) {
            job.status = JobStatus::Completed;
            job.result = Some(result);
            job.locked_at = None;
            job.locked_by = None;
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn acquire_next(
        &self,
        ctx: &CancellationToken,
        queue: &str,
        worker_id: i64,
        lease: Duration,
    ) -> Result<Job, RepoError> {
        Self::check(ctx)?;
        let now = Utc::now();
        let lease = chrono::Duration::from_std(lease).unwrap_or_default();

        let mut jobs = self.jobs.write().unwrap();
        let mut candidates: Vec<(DateTime<Utc>, i64)> = jobs
            .values()
            .filter(|j| {
                j.queue == queue
                    && j.status == JobStatus::Queued
                    && j.available_at <= now
                    && (j.locked_at.is_none() || j.lease_expired(lease, now))
            })
            .map(|j| (j.available_at, j.id))
            .collect();
        candidates.sort();

        let Some(&(_, id)) = candidates.first() else {
            return Err(RepoError::NoJobAvailable);
        };

        let job = jobs.get_mut(&id).expect("candidate id just scanned");
        job.status = JobStatus::Running;
        job.locked_at = Some(now);
        job.locked_by = Some(worker_id);
        job.updated_at = now;
        Ok(job.clone())
    }

    async fn release(&self, ctx: &CancellationToken, id: i64) -> Result<(), RepoError> {
        Self::check(ctx)?;
        if let Some(job) = self.jobs.write().unwrap().get_mut(&id) {
            job.status = JobStatus::Queued;
            job.locked_at = None;
            job.locked_by = None;
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn retry_later(
        &self,
        ctx: &CancellationToken,
        id: i64,
        available_at: DateTime<Utc>,
    ) -> Result<(), RepoError> {
        Self::check(ctx)?;
        if let Some(job) = self.jobs.write().unwrap().get_mut(&id) {
            job.status = JobStatus::Queued;
            job.available_at = available_at;
            job.locked_at = None;
            job.locked_by = None;
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list_stuck_jobs(
        &self,
        ctx: &CancellationToken,
        stale: Duration,
    ) -> Result<Vec<Job>, RepoError> {
        Self::check(ctx)?;
        let now = Utc::now();
        let stale = chrono::Duration::from_std(stale).unwrap_or_default();
        let jobs = self.jobs.read().unwrap();
        let mut result: Vec<Job> = jobs
            .values()
            .filter(|j| j.status == JobStatus::Running && j.lease_expired(stale, now))
            .cloned()
            .collect();
        result.sort_by_key(|j| j.locked_at);
        Ok(result)
    }
}
