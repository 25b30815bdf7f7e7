//! Claim-path throughput against the in-memory repository.
//!
//! Measures the dispatch-side cost of the repository contract itself
//! (scan + ordering + lock bookkeeping), with the store taken out of the
//! picture. Postgres latency dominates in production; this isolates the
//! per-claim overhead of the protocol.

use std::hint::black_box;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use relayq_core::NewJob;
use relayq_infra::{InMemoryJobRepository, JobRepository};

const LEASE: Duration = Duration::from_secs(30);

fn email_job() -> NewJob {
    NewJob {
        queue: "email".into(),
        job_type: "send_email".into(),
        payload: json!({"to": "a@b.co", "subject": "s", "body": "b"}),
        max_retries: 3,
        available_at: None,
    }
}

fn bench_create(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("create");

    for &size in &[64_usize, 512] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                rt.block_on(async {
                    let repo = InMemoryJobRepository::new();
                    let ctx = CancellationToken::new();
                    for _ in 0..size {
                        black_box(repo.create(&ctx, email_job()).await.unwrap());
                    }
                })
            });
        });
    }
    group.finish();
}

fn bench_claim_drain(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("claim_drain");

    for &size in &[64_usize, 512] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                rt.block_on(async {
                    let repo = InMemoryJobRepository::new();
                    let ctx = CancellationToken::new();
                    for _ in 0..size {
                        repo.create(&ctx, email_job()).await.unwrap();
                    }
                    for worker_id in 0..size {
                        let job = repo
                            .acquire_next(&ctx, "email", worker_id as i64, LEASE)
                            .await
                            .unwrap();
                        black_box(job.id);
                    }
                })
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_create, bench_claim_drain);
criterion_main!(benches);
