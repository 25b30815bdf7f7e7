//! HTTP API application wiring (axum router + service wiring).
//!
//! Structure:
//! - `service.rs`: the job service (validation, payload schemas, error mapping)
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs and JSON mapping
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router};
use sqlx::PgPool;

use relayq_infra::JobRepository;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod service;

use service::{AppServices, JobService};

/// Build the full HTTP router (public entrypoint used by `main.rs`).
///
/// `db` backs the `/health/db` probe; tests run the router without it.
pub fn build_app(repo: Arc<dyn JobRepository>, db: Option<PgPool>) -> Router {
    let services = Arc::new(AppServices {
        jobs: JobService::new(repo),
        db,
    });

    routes::router().layer(Extension(services))
}
