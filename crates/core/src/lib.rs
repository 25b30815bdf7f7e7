//! Core domain: the job model, status machine, and typed payloads.

pub mod job;
pub mod payload;

pub use job::{Job, JobStatus, NewJob, UnknownStatus, ALLOWED_JOB_TYPES, ALLOWED_QUEUES};
pub use payload::{
    validate_payload, PayloadError, ProcessPaymentPayload, SendEmailPayload, SendWebhookPayload,
};
