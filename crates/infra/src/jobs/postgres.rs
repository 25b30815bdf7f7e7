//! Postgres-backed job repository.
//!
//! All coordination between workers happens here, in SQL. The claim path
//! runs in one transaction and relies on `FOR UPDATE SKIP LOCKED` so
//! concurrent workers never wait on each other's row locks; every other
//! mutation is a single UPDATE statement.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tokio_util::sync::CancellationToken;

use relayq_core::{Job, JobStatus, NewJob};

use super::repository::{JobRepository, RepoError};

#[derive(Debug, Clone)]
pub struct PgJobRepository {
    pool: PgPool,
}

impl PgJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Raw row shape; `status` is decoded into the enum on conversion.
#[derive(Debug, FromRow)]
struct JobRow {
    id: i64,
    queue: String,
    job_type: String,
    payload: serde_json::Value,
    status: String,
    attempts: i32,
    max_retries: i32,
    available_at: DateTime<Utc>,
    locked_at: Option<DateTime<Utc>>,
    locked_by: Option<i64>,
    result: Option<serde_json::Value>,
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl JobRow {
    fn into_job(self) -> Result<Job, RepoError> {
        let status: JobStatus = self
            .status
            .parse()
            .map_err(|e| RepoError::Store(sqlx::Error::Decode(Box::new(e))))?;
        Ok(Job {
            id: self.id,
            queue: self.queue,
            job_type: self.job_type,
            payload: self.payload,
            status,
            attempts: self.attempts,
            max_retries: self.max_retries,
            available_at: self.available_at,
            locked_at: self.locked_at,
            locked_by: self.locked_by,
            result: self.result,
            error: self.error,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const JOB_COLUMNS: &str = "id, queue, job_type, payload, status, attempts, max_retries, \
     available_at, locked_at, locked_by, result, error, created_at, updated_at";

/// Race the store call against the caller's cancellation signal, so a
/// canceled request reports `Canceled` instead of a store failure.
async fn with_cancel<T, F>(ctx: &CancellationToken, fut: F) -> Result<T, RepoError>
where
    F: Future<Output = Result<T, RepoError>>,
{
    tokio::select! {
        biased;
        () = ctx.cancelled() => Err(RepoError::Canceled),
        res = fut => res,
    }
}

fn map_insert_error(err: sqlx::Error) -> RepoError {
    // 23505: unique violation
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some("23505") {
            return RepoError::Conflict;
        }
    }
    RepoError::Store(err)
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn create(&self, ctx: &CancellationToken, job: NewJob) -> Result<Job, RepoError> {
        with_cancel(ctx, async {
            let row: JobRow = sqlx::query_as(
                r#"
                INSERT INTO jobs (queue, job_type, payload, status, attempts, max_retries, available_at)
                VALUES ($1, $2, $3, 'queued', 0, $4, COALESCE($5, now()))
                RETURNING id, queue, job_type, payload, status, attempts, max_retries,
                          available_at, locked_at, locked_by, result, error, created_at, updated_at
                "#,
            )
            .bind(&job.queue)
            .bind(&job.job_type)
            .bind(&job.payload)
            .bind(job.max_retries)
            .bind(job.available_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_insert_error)?;

            row.into_job()
        })
        .await
    }

    async fn get(&self, ctx: &CancellationToken, id: i64) -> Result<Job, RepoError> {
        with_cancel(ctx, async {
            let row: Option<JobRow> =
                sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?;

            row.ok_or(RepoError::NotFound)?.into_job()
        })
        .await
    }

    async fn list(&self, ctx: &CancellationToken, queue: &str) -> Result<Vec<Job>, RepoError> {
        with_cancel(ctx, async {
            let rows: Vec<JobRow> = sqlx::query_as(&format!(
                "SELECT {JOB_COLUMNS} FROM jobs WHERE queue = $1 ORDER BY id ASC"
            ))
            .bind(queue)
            .fetch_all(&self.pool)
            .await?;

            rows.into_iter().map(JobRow::into_job).collect()
        })
        .await
    }

    async fn update_status(
        &self,
        ctx: &CancellationToken,
        id: i64,
        status: JobStatus,
    ) -> Result<(), RepoError> {
        with_cancel(ctx, async {
            sqlx::query("UPDATE jobs SET status = $2, updated_at = now() WHERE id = $1")
                .bind(id)
                .bind(status.as_str())
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn increment_attempts(&self, ctx: &CancellationToken, id: i64) -> Result<(), RepoError> {
        with_cancel(ctx, async {
            sqlx::query("UPDATE jobs SET attempts = attempts + 1, updated_at = now() WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn save_result(
        &self,
        ctx: &CancellationToken,
        id: i64,
        result: Option<serde_json::Value>,
        error: Option<&str>,
    ) -> Result<(), RepoError> {
        with_cancel(ctx, async {
            sqlx::query("UPDATE jobs SET result = $2, error = $3, updated_at = now() WHERE id = $1")
                .bind(id)
                .bind(result)
                .bind(error)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn mark_completed(
        &self,
        ctx: &CancellationToken,
        id: i64,
        result: serde_json::Value,
    ) -> Result<(), RepoError> {
        with_cancel(ctx, async {
            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'completed',
                    result = $2,
                    locked_at = NULL,
                    locked_by = NULL,
                    updated_at = now()
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(result)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn acquire_next(
        &self,
        ctx: &CancellationToken,
        queue: &str,
        worker_id: i64,
        lease: Duration,
    ) -> Result<Job, RepoError> {
        with_cancel(ctx, async {
            let mut tx = self.pool.begin().await?;

            // An expired lease counts as reclaimable: if a worker died after
            // claiming, the next scan here picks the row back up without
            // waiting for the reaper.
            let candidate: Option<JobRow> = sqlx::query_as(
                r#"
                SELECT id, queue, job_type, payload, status, attempts, max_retries,
                       available_at, locked_at, locked_by, result, error, created_at, updated_at
                FROM jobs
                WHERE queue = $1
                  AND status = 'queued'
                  AND available_at <= now()
                  AND (locked_at IS NULL OR locked_at < now() - $2 * INTERVAL '1 second')
                ORDER BY available_at ASC, id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
                "#,
            )
            .bind(queue)
            .bind(lease.as_secs_f64())
            .fetch_optional(&mut *tx)
            .await?;

            let Some(candidate) = candidate else {
                tx.rollback().await?;
                return Err(RepoError::NoJobAvailable);
            };

            let claimed: JobRow = sqlx::query_as(
                r#"
                UPDATE jobs
                SET status = 'running',
                    locked_at = now(),
                    locked_by = $2,
                    updated_at = now()
                WHERE id = $1
                RETURNING id, queue, job_type, payload, status, attempts, max_retries,
                          available_at, locked_at, locked_by, result, error, created_at, updated_at
                "#,
            )
            .bind(candidate.id)
            .bind(worker_id)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            claimed.into_job()
        })
        .await
    }

    async fn release(&self, ctx: &CancellationToken, id: i64) -> Result<(), RepoError> {
        with_cancel(ctx, async {
            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'queued',
                    locked_at = NULL,
                    locked_by = NULL,
                    updated_at = now()
                WHERE id = $1
                "#,
            )
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn retry_later(
        &self,
        ctx: &CancellationToken,
        id: i64,
        available_at: DateTime<Utc>,
    ) -> Result<(), RepoError> {
        with_cancel(ctx, async {
            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'queued',
                    available_at = $2,
                    locked_at = NULL,
                    locked_by = NULL,
                    updated_at = now()
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(available_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn list_stuck_jobs(
        &self,
        ctx: &CancellationToken,
        stale: Duration,
    ) -> Result<Vec<Job>, RepoError> {
        with_cancel(ctx, async {
            let rows: Vec<JobRow> = sqlx::query_as(&format!(
                "SELECT {JOB_COLUMNS} FROM jobs \
                 WHERE status = 'running' AND locked_at < now() - $1 * INTERVAL '1 second' \
                 ORDER BY locked_at ASC"
            ))
            .bind(stale.as_secs_f64())
            .fetch_all(&self.pool)
            .await?;

            rows.into_iter().map(JobRow::into_job).collect()
        })
        .await
    }
}
