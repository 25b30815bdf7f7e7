//! Black-box tests for the HTTP API against the in-memory repository.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use relayq_api::app::build_app;
use relayq_infra::InMemoryJobRepository;

fn app() -> Router {
    build_app(InMemoryJobRepository::arc(), None)
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn email_create_body() -> Value {
    json!({
        "queue": "email",
        "type": "send_email",
        "payload": {"to": "a@b.co", "subject": "s", "body": "b"}
    })
}

#[tokio::test]
async fn create_returns_the_stored_job() {
    let app = app();
    let (status, body) = send(
        &app,
        json_request(Method::POST, "/jobs/create", email_create_body()),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["id"], 1);
    assert_eq!(body["status"], "queued");
    assert_eq!(body["attempts"], 0);
    assert_eq!(body["max_retries"], 3);
    assert_eq!(body["type"], "send_email");

    // Lock columns are part of the representation; empty until claimed.
    let object = body.as_object().unwrap();
    assert!(object.contains_key("locked_at"));
    assert!(object.contains_key("locked_by"));
    assert!(body["locked_at"].is_null());
    assert!(body["locked_by"].is_null());
}

#[tokio::test]
async fn create_rejects_unknown_queue_with_field_details() {
    let app = app();
    let mut body = email_create_body();
    body["queue"] = json!("reports");

    let (status, body) = send(&app, json_request(Method::POST, "/jobs/create", body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["queue"].is_string());
}

#[tokio::test]
async fn create_rejects_payload_schema_violations() {
    let app = app();
    let mut body = email_create_body();
    body["payload"] = json!({"to": "not-an-email", "subject": "s", "body": "b"});

    let (status, body) = send(&app, json_request(Method::POST, "/jobs/create", body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["to"].is_string());
}

#[tokio::test]
async fn create_rejects_malformed_json() {
    let app = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/jobs/create")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("invalid json"));
}

#[tokio::test]
async fn get_round_trips_a_created_job() {
    let app = app();
    send(
        &app,
        json_request(Method::POST, "/jobs/create", email_create_body()),
    )
    .await;

    let (status, body) = send(&app, get_request("/jobs/1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queue"], "email");
    assert_eq!(body["payload"]["to"], "a@b.co");
}

#[tokio::test]
async fn get_validates_the_id() {
    let app = app();

    let (status, body) = send(&app, get_request("/jobs/abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid id");

    let (status, _) = send(&app, get_request("/jobs/0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_missing_job_is_404() {
    let app = app();
    let (status, body) = send(&app, get_request("/jobs/99")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "job not found");
}

#[tokio::test]
async fn update_status_is_no_content() {
    let app = app();
    send(
        &app,
        json_request(Method::POST, "/jobs/create", email_create_body()),
    )
    .await;

    let (status, _) = send(
        &app,
        json_request(Method::PUT, "/jobs/1/status", json!({"status": "failed"})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = send(&app, get_request("/jobs/1")).await;
    assert_eq!(body["status"], "failed");
}

#[tokio::test]
async fn update_status_rejects_unknown_vocabulary() {
    let app = app();
    send(
        &app,
        json_request(Method::POST, "/jobs/create", email_create_body()),
    )
    .await;

    let (status, _) = send(
        &app,
        json_request(Method::PUT, "/jobs/1/status", json!({"status": "processing"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn increment_bumps_attempts() {
    let app = app();
    send(
        &app,
        json_request(Method::POST, "/jobs/create", email_create_body()),
    )
    .await;

    let (status, _) = send(
        &app,
        json_request(Method::POST, "/jobs/1/increment", json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = send(&app, get_request("/jobs/1")).await;
    assert_eq!(body["attempts"], 1);
}

#[tokio::test]
async fn save_stores_result_and_error() {
    let app = app();
    send(
        &app,
        json_request(Method::POST, "/jobs/create", email_create_body()),
    )
    .await;

    let (status, _) = send(
        &app,
        json_request(
            Method::POST,
            "/jobs/1/save",
            json!({"result": {"ok": true}, "error": "partial failure"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = send(&app, get_request("/jobs/1")).await;
    assert_eq!(body["result"]["ok"], true);
    assert_eq!(body["error"], "partial failure");
}

#[tokio::test]
async fn list_requires_a_queue() {
    let app = app();
    let (status, body) = send(&app, get_request("/jobs")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "queue parameter is required");
}

#[tokio::test]
async fn list_returns_jobs_for_the_queue() {
    let app = app();
    send(
        &app,
        json_request(Method::POST, "/jobs/create", email_create_body()),
    )
    .await;

    let (status, body) = send(&app, get_request("/jobs?queue=email")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = send(&app, get_request("/jobs?queue=payment")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn scheduled_jobs_carry_their_availability() {
    let app = app();
    let at = chrono::Utc::now() + chrono::Duration::minutes(10);
    let mut body = email_create_body();
    body["available_at"] = json!(at);

    let (status, created) = send(&app, json_request(Method::POST, "/jobs/create", body)).await;
    assert_eq!(status, StatusCode::CREATED);

    let stored: chrono::DateTime<chrono::Utc> =
        serde_json::from_value(created["available_at"].clone()).unwrap();
    assert_eq!(stored, at);
}

#[tokio::test]
async fn health_probes_respond() {
    let app = app();

    let (status, body) = send(&app, get_request("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    // No pool wired in tests: the db probe reports liveness only.
    let (status, _) = send(&app, get_request("/health/db")).await;
    assert_eq!(status, StatusCode::OK);
}
