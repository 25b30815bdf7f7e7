//! Postgres repository integration tests.
//!
//! These need a live database; set `DATABASE_URL` and run with
//! `cargo test -p relayq-infra -- --ignored`.

use std::time::Duration;

use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use relayq_core::{JobStatus, NewJob};
use relayq_infra::{JobRepository, PgJobRepository, RepoError, MIGRATOR};

const LEASE: Duration = Duration::from_secs(30);

async fn test_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set to run integration tests");
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await
        .expect("connect to test database");
    MIGRATOR.run(&pool).await.expect("run migrations");
    sqlx::query("TRUNCATE jobs RESTART IDENTITY")
        .execute(&pool)
        .await
        .expect("truncate jobs");
    pool
}

fn email_job(queue: &str) -> NewJob {
    NewJob {
        queue: queue.into(),
        job_type: "send_email".into(),
        payload: json!({"to": "a@b.co", "subject": "s", "body": "b"}),
        max_retries: 3,
        available_at: None,
    }
}

#[tokio::test]
#[ignore = "requires postgres via DATABASE_URL"]
async fn claim_complete_round_trip() {
    let pool = test_pool().await;
    let repo = PgJobRepository::new(pool);
    let ctx = CancellationToken::new();

    let created = repo.create(&ctx, email_job("email")).await.unwrap();
    assert_eq!(created.status, JobStatus::Queued);
    assert_eq!(created.attempts, 0);

    let claimed = repo.acquire_next(&ctx, "email", 1, LEASE).await.unwrap();
    assert_eq!(claimed.id, created.id);
    assert_eq!(claimed.status, JobStatus::Running);
    assert_eq!(claimed.locked_by, Some(1));
    assert!(claimed.locked_at.is_some());

    repo.mark_completed(&ctx, created.id, json!({"sent": true}))
        .await
        .unwrap();

    let done = repo.get(&ctx, created.id).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.result, Some(json!({"sent": true})));
    assert!(done.locked_at.is_none() && done.locked_by.is_none());

    assert!(matches!(
        repo.acquire_next(&ctx, "email", 2, LEASE).await,
        Err(RepoError::NoJobAvailable)
    ));
}

#[tokio::test]
#[ignore = "requires postgres via DATABASE_URL"]
async fn concurrent_claim_skips_locked_rows() {
    let pool = test_pool().await;
    let repo = PgJobRepository::new(pool.clone());
    let ctx = CancellationToken::new();

    let first = repo.create(&ctx, email_job("email")).await.unwrap();
    let second = repo.create(&ctx, email_job("email")).await.unwrap();

    // Hold a row lock on the first job from a separate transaction, the way
    // a concurrent claim in progress would.
    let mut tx = pool.begin().await.unwrap();
    sqlx::query("SELECT id FROM jobs WHERE id = $1 FOR UPDATE")
        .bind(first.id)
        .fetch_one(&mut *tx)
        .await
        .unwrap();

    // The claim must skip the held row instead of blocking on it.
    let claimed = repo.acquire_next(&ctx, "email", 2, LEASE).await.unwrap();
    assert_eq!(claimed.id, second.id);

    tx.rollback().await.unwrap();
}

#[tokio::test]
#[ignore = "requires postgres via DATABASE_URL"]
async fn reaper_path_recovers_stale_lease() {
    let pool = test_pool().await;
    let repo = PgJobRepository::new(pool.clone());
    let ctx = CancellationToken::new();

    let job = repo.create(&ctx, email_job("email")).await.unwrap();
    repo.acquire_next(&ctx, "email", 1, LEASE).await.unwrap();

    // Simulate a worker that died mid-execution.
    sqlx::query("UPDATE jobs SET locked_at = now() - INTERVAL '90 seconds' WHERE id = $1")
        .bind(job.id)
        .execute(&pool)
        .await
        .unwrap();

    let stuck = repo
        .list_stuck_jobs(&ctx, Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(stuck.len(), 1);
    assert_eq!(stuck[0].id, job.id);

    repo.release(&ctx, job.id).await.unwrap();

    let reclaimed = repo.acquire_next(&ctx, "email", 2, LEASE).await.unwrap();
    assert_eq!(reclaimed.id, job.id);
    assert_eq!(reclaimed.locked_by, Some(2));
}

#[tokio::test]
#[ignore = "requires postgres via DATABASE_URL"]
async fn future_availability_defers_claims() {
    let pool = test_pool().await;
    let repo = PgJobRepository::new(pool);
    let ctx = CancellationToken::new();

    let job = NewJob {
        available_at: Some(chrono::Utc::now() + chrono::Duration::minutes(10)),
        ..email_job("email")
    };
    repo.create(&ctx, job).await.unwrap();

    assert!(matches!(
        repo.acquire_next(&ctx, "email", 1, LEASE).await,
        Err(RepoError::NoJobAvailable)
    ));
}

#[tokio::test]
#[ignore = "requires postgres via DATABASE_URL"]
async fn attempts_are_incremented_in_the_store() {
    let pool = test_pool().await;
    let repo = PgJobRepository::new(pool);
    let ctx = CancellationToken::new();

    let job = repo.create(&ctx, email_job("email")).await.unwrap();
    repo.increment_attempts(&ctx, job.id).await.unwrap();
    repo.increment_attempts(&ctx, job.id).await.unwrap();

    let j = repo.get(&ctx, job.id).await.unwrap();
    assert_eq!(j.attempts, 2);
}
