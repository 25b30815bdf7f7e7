//! Consistent error responses.
//!
//! Every failure body has the shape `{"error": "...", "fields": {...}?}`.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use super::service::ServiceError;

pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Validation { message, fields } => {
            let body = if fields.is_empty() {
                json!({ "error": message })
            } else {
                json!({ "error": message, "fields": fields })
            };
            (StatusCode::BAD_REQUEST, axum::Json(body)).into_response()
        }
        ServiceError::NotFound => json_error(StatusCode::NOT_FOUND, "job not found"),
        ServiceError::Timeout => json_error(StatusCode::REQUEST_TIMEOUT, "request timed out"),
        ServiceError::Internal => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

pub fn json_error(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        axum::Json(json!({ "error": message.into() })),
    )
        .into_response()
}
