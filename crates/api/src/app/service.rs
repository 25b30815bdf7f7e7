//! The job service: validation, payload-schema dispatch, and mapping of
//! repository errors to user-facing kinds.
//!
//! The service never touches lock columns or interprets status transitions;
//! the dispatch protocol belongs to the worker and the repository.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use relayq_core::{
    validate_payload, Job, JobStatus, NewJob, ALLOWED_JOB_TYPES, ALLOWED_QUEUES,
};
use relayq_infra::{JobRepository, RepoError};

use super::dto::CreateJobRequest;

/// Per-request budget for store calls made on behalf of the ingress.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

const DEFAULT_MAX_RETRIES: i32 = 3;

/// Everything the HTTP handlers reach for.
pub struct AppServices {
    pub jobs: JobService,
    /// Present in real deployments; absent in router tests.
    pub db: Option<PgPool>,
}

/// User-facing failure kinds, one HTTP status each.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{message}")]
    Validation {
        message: String,
        fields: BTreeMap<String, String>,
    },

    #[error("job not found")]
    NotFound,

    #[error("request canceled or timed out")]
    Timeout,

    #[error("internal error")]
    Internal,
}

impl ServiceError {
    fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    fn field(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            message: "validation failed".into(),
            fields: BTreeMap::from([(field.to_string(), message.into())]),
        }
    }
}

pub struct JobService {
    repo: Arc<dyn JobRepository>,
    request_timeout: Duration,
}

impl JobService {
    pub fn new(repo: Arc<dyn JobRepository>) -> Self {
        Self {
            repo,
            request_timeout: REQUEST_TIMEOUT,
        }
    }

    /// Validate and persist a new job.
    pub async fn create_job(
        &self,
        ctx: &CancellationToken,
        req: CreateJobRequest,
    ) -> Result<Job, ServiceError> {
        if ctx.is_cancelled() {
            return Err(ServiceError::Timeout);
        }

        if !ALLOWED_QUEUES.contains(&req.queue.as_str()) {
            return Err(ServiceError::field(
                "queue",
                format!("must be one of: {}", ALLOWED_QUEUES.join(", ")),
            ));
        }
        if !ALLOWED_JOB_TYPES.contains(&req.job_type.as_str()) {
            return Err(ServiceError::field(
                "type",
                format!("must be one of: {}", ALLOWED_JOB_TYPES.join(", ")),
            ));
        }

        validate_payload(&req.job_type, &req.payload).map_err(|e| ServiceError::Validation {
            message: e.message,
            fields: e.fields,
        })?;

        let max_retries = match req.max_retries {
            None | Some(0) => DEFAULT_MAX_RETRIES,
            Some(n) => n,
        };

        let job = NewJob {
            queue: req.queue,
            job_type: req.job_type,
            payload: req.payload,
            max_retries,
            // Passed through untouched so clients can schedule future jobs.
            available_at: req.available_at,
        };

        self.call(ctx, self.repo.create(ctx, job)).await
    }

    pub async fn get_job(&self, ctx: &CancellationToken, id: i64) -> Result<Job, ServiceError> {
        self.call(ctx, self.repo.get(ctx, id)).await
    }

    pub async fn list_jobs(
        &self,
        ctx: &CancellationToken,
        queue: &str,
    ) -> Result<Vec<Job>, ServiceError> {
        self.call(ctx, self.repo.list(ctx, queue)).await
    }

    /// Admin surface: unconditional status write.
    pub async fn update_status(
        &self,
        ctx: &CancellationToken,
        id: i64,
        status: &str,
    ) -> Result<(), ServiceError> {
        let status: JobStatus = status
            .parse()
            .map_err(|_| ServiceError::validation("invalid status"))?;
        self.call(ctx, self.repo.update_status(ctx, id, status)).await
    }

    /// Admin surface; dispatch accounts for attempts in the worker instead.
    pub async fn increment_attempts(
        &self,
        ctx: &CancellationToken,
        id: i64,
    ) -> Result<(), ServiceError> {
        self.call(ctx, self.repo.increment_attempts(ctx, id)).await
    }

    pub async fn save_result(
        &self,
        ctx: &CancellationToken,
        id: i64,
        result: Option<serde_json::Value>,
        error: Option<&str>,
    ) -> Result<(), ServiceError> {
        self.call(ctx, self.repo.save_result(ctx, id, result, error))
            .await
    }

    /// Run a repository call under the per-request budget and map its
    /// failures to user-facing kinds.
    async fn call<T, F>(&self, ctx: &CancellationToken, fut: F) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, RepoError>>,
    {
        if ctx.is_cancelled() {
            return Err(ServiceError::Timeout);
        }
        match tokio::time::timeout(self.request_timeout, fut).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(err)) => Err(map_repo_error(err)),
            Err(_) => Err(ServiceError::Timeout),
        }
    }
}

fn map_repo_error(err: RepoError) -> ServiceError {
    match err {
        RepoError::NotFound => ServiceError::NotFound,
        RepoError::Canceled => ServiceError::Timeout,
        RepoError::NoJobAvailable | RepoError::Conflict | RepoError::Store(_) => {
            tracing::error!(error = %err, "repository call failed");
            ServiceError::Internal
        }
    }
}
