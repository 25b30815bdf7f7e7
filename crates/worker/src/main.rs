use std::sync::Arc;
use std::time::Duration;

use relayq_infra::{PgConfig, PgJobRepository};
use relayq_worker::WorkerPool;

const DEFAULT_WORKERS: usize = 10;
const LEASE: Duration = Duration::from_secs(60);

fn max_workers() -> usize {
    match std::env::var("MAX_WORKERS").ok().and_then(|v| v.parse().ok()) {
        Some(n) if n > 0 => n,
        _ => DEFAULT_WORKERS,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    relayq_observability::init();

    let cfg = PgConfig::from_env()?;
    let pool = relayq_infra::connect(&cfg).await?;
    let repo = Arc::new(PgJobRepository::new(pool));

    let queues = ["email", "payment", "default", "webhooks"]
        .map(String::from)
        .to_vec();

    let workers = WorkerPool::new(max_workers(), repo, queues, LEASE);
    let handle = workers.start();
    tracing::info!(count = max_workers(), "worker pool active");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    handle.shutdown().await;
    tracing::info!("shutdown complete");

    Ok(())
}
