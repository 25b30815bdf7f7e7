//! A single worker: claim one job at a time, run its handler, finalize.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, trace, warn, Instrument};

use relayq_core::{Job, JobStatus};
use relayq_infra::{JobRepository, RepoError};

use crate::handlers;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// How long a failed attempt waits before it becomes claimable again.
const RETRY_DELAY: Duration = Duration::from_secs(10);

pub struct Worker {
    id: i64,
    repo: Arc<dyn JobRepository>,
    queues: Vec<String>,
    lease: Duration,
}

impl Worker {
    pub fn new(id: i64, repo: Arc<dyn JobRepository>, queues: Vec<String>, lease: Duration) -> Self {
        Self {
            id,
            repo,
            queues,
            lease,
        }
    }

    /// Poll for jobs until shutdown.
    ///
    /// Empty polls back off exponentially (1 s doubling up to 60 s); any
    /// successful claim resets the backoff and the next poll is immediate.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            if self.poll_and_process(&shutdown).await {
                backoff = INITIAL_BACKOFF;
                continue;
            }

            trace!(delay = ?backoff, "no jobs available, backing off");
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(backoff) => {}
            }
            backoff = next_backoff(backoff);
        }

        debug!("worker stopped");
    }

    /// One iteration: claim from the first queue that has work and run it.
    /// Returns whether a job was claimed.
    async fn poll_and_process(&self, shutdown: &CancellationToken) -> bool {
        let Some(job) = self.pull_job(shutdown).await else {
            return false;
        };
        let span = info_span!("job", job.id = job.id, queue = %job.queue);
        self.process(shutdown, job).instrument(span).await;
        true
    }

    async fn pull_job(&self, shutdown: &CancellationToken) -> Option<Job> {
        for queue in &self.queues {
            match self
                .repo
                .acquire_next(shutdown, queue, self.id, self.lease)
                .await
            {
                Ok(job) => return Some(job),
                Err(RepoError::NoJobAvailable) => continue,
                Err(RepoError::Canceled) => return None,
                // Claim-time store trouble is just "no job" for dispatch;
                // the next iteration retries.
                Err(err) => {
                    warn!(queue = %queue, error = %err, "claim failed");
                    continue;
                }
            }
        }
        None
    }

    async fn process(&self, shutdown: &CancellationToken, job: Job) {
        debug!(job.id = job.id, job_type = %job.job_type, "running job");

        // A panicking handler must not take the worker down with it; it
        // counts as a failed attempt like any other handler error.
        let outcome = AssertUnwindSafe(handlers::dispatch(&job.job_type, shutdown, &job.payload))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(panic_error(panic.as_ref())));

        if shutdown.is_cancelled() {
            // Interrupted mid-handler: never finalize on a canceled signal.
            // The lease expires and claim-time recovery or the reaper takes
            // the job back.
            return;
        }

        match outcome {
            Ok(result) => {
                if let Err(err) = self.repo.mark_completed(shutdown, job.id, result).await {
                    warn!(job.id = job.id, error = %err, "failed to finalize completed job");
                }
            }
            Err(err) => self.finalize_failure(shutdown, &job, &format!("{err:#}")).await,
        }
    }

    /// Account for a failed attempt, then either reschedule or go terminal.
    ///
    /// The attempt is counted here, exactly once per failure; `retry_later`
    /// itself never touches the counter.
    async fn finalize_failure(&self, ctx: &CancellationToken, job: &Job, error_text: &str) {
        warn!(job.id = job.id, error = %error_text, "job attempt failed");

        if let Err(err) = self.repo.increment_attempts(ctx, job.id).await {
            warn!(job.id = job.id, error = %err, "failed to record attempt, leaving lease to expire");
            return;
        }
        let attempts = job.attempts + 1;

        if attempts > job.max_retries {
            if let Err(err) = self
                .repo
                .save_result(ctx, job.id, None, Some(error_text))
                .await
            {
                warn!(job.id = job.id, error = %err, "failed to store terminal error");
                return;
            }
            if let Err(err) = self.repo.update_status(ctx, job.id, JobStatus::Failed).await {
                warn!(job.id = job.id, error = %err, "failed to mark job failed");
            }
            return;
        }

        let next_run = Utc::now() + chrono::Duration::from_std(RETRY_DELAY).unwrap_or_default();
        if let Err(err) = self.repo.retry_later(ctx, job.id, next_run).await {
            warn!(job.id = job.id, error = %err, "failed to reschedule job");
        }
    }
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

fn panic_error(panic: &(dyn std::any::Any + Send)) -> anyhow::Error {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        anyhow::anyhow!("handler panicked: {msg}")
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        anyhow::anyhow!("handler panicked: {msg}")
    } else {
        anyhow::anyhow!("handler panicked")
    }
}
