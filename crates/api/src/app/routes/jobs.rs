//! Job endpoints: submission, inspection, and the admin surface.

use std::sync::Arc;

use axum::{
    extract::rejection::JsonRejection,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::app::dto::{CreateJobRequest, JobResponse, SaveResultRequest, UpdateStatusRequest};
use crate::app::errors;
use crate::app::service::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/jobs/create", post(create))
        .route("/jobs", get(list))
        .route("/jobs/:id", get(get_by_id))
        .route("/jobs/:id/status", put(update_status))
        .route("/jobs/:id/increment", post(increment))
        .route("/jobs/:id/save", post(save))
}

pub async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<CreateJobRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                format!("invalid json: {rejection}"),
            )
        }
    };

    match services.jobs.create_job(&request_token(), req).await {
        Ok(job) => (StatusCode::CREATED, Json(JobResponse::from(job))).into_response(),
        Err(err) => errors::service_error_to_response(err),
    }
}

pub async fn get_by_id(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let Some(id) = parse_id(&id) else {
        return errors::json_error(StatusCode::BAD_REQUEST, "invalid id");
    };

    match services.jobs.get_job(&request_token(), id).await {
        Ok(job) => (StatusCode::OK, Json(JobResponse::from(job))).into_response(),
        Err(err) => errors::service_error_to_response(err),
    }
}

pub async fn update_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> axum::response::Response {
    let Some(id) = parse_id(&id) else {
        return errors::json_error(StatusCode::BAD_REQUEST, "invalid id");
    };
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                format!("invalid json: {rejection}"),
            )
        }
    };

    match services
        .jobs
        .update_status(&request_token(), id, &req.status)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => errors::service_error_to_response(err),
    }
}

pub async fn increment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let Some(id) = parse_id(&id) else {
        return errors::json_error(StatusCode::BAD_REQUEST, "invalid id");
    };

    match services.jobs.increment_attempts(&request_token(), id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => errors::service_error_to_response(err),
    }
}

pub async fn save(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<SaveResultRequest>, JsonRejection>,
) -> axum::response::Response {
    let Some(id) = parse_id(&id) else {
        return errors::json_error(StatusCode::BAD_REQUEST, "invalid id");
    };
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                format!("invalid json: {rejection}"),
            )
        }
    };

    match services
        .jobs
        .save_result(&request_token(), id, req.result, req.error.as_deref())
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => errors::service_error_to_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub queue: Option<String>,
}

pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<ListParams>,
) -> axum::response::Response {
    let Some(queue) = params.queue.filter(|q| !q.is_empty()) else {
        return errors::json_error(StatusCode::BAD_REQUEST, "queue parameter is required");
    };

    match services.jobs.list_jobs(&request_token(), &queue).await {
        Ok(jobs) => {
            let body: Vec<JobResponse> = jobs.into_iter().map(JobResponse::from).collect();
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => errors::service_error_to_response(err),
    }
}

fn parse_id(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().filter(|id| *id >= 1)
}

// Axum cancels a handler by dropping its future when the client goes away,
// so the token a request hands down is never cancelled from here; the 5 s
// budget inside the service bounds the store work.
fn request_token() -> CancellationToken {
    CancellationToken::new()
}
