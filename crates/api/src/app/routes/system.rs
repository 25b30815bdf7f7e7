//! Liveness and database health probes.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;

use crate::app::errors;
use crate::app::service::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/db", get(health_db))
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn health_db(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    let Some(pool) = services.db.as_ref() else {
        // No pool wired (router tests); report liveness only.
        return Json(json!({ "status": "ok" })).into_response();
    };

    let ping = sqlx::query("SELECT 1").execute(pool);
    match tokio::time::timeout(Duration::from_secs(2), ping).await {
        Ok(Ok(_)) => Json(json!({ "status": "ok" })).into_response(),
        Ok(Err(_)) | Err(_) => {
            errors::json_error(StatusCode::SERVICE_UNAVAILABLE, "database is unavailable")
        }
    }
}
