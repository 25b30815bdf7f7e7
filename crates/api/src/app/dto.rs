//! Request/response DTOs and JSON mapping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use relayq_core::{Job, JobStatus};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateJobRequest {
    pub queue: String,
    #[serde(rename = "type")]
    pub job_type: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub max_retries: Option<i32>,
    #[serde(default)]
    pub available_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct SaveResultRequest {
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: i64,
    pub queue: String,
    #[serde(rename = "type")]
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_retries: i32,
    pub available_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            queue: job.queue,
            job_type: job.job_type,
            payload: job.payload,
            status: job.status,
            attempts: job.attempts,
            max_retries: job.max_retries,
            available_at: job.available_at,
            locked_at: job.locked_at,
            locked_by: job.locked_by,
            result: job.result,
            error: job.error,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}
