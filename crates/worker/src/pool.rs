//! Worker pool supervision and stuck-lease recovery.
//!
//! The pool starts N workers plus one reaper task. The reaper covers the
//! failure mode the claim-time lease check cannot: a quiescent queue where
//! no worker is scanning. Both converge on the same invariant — no job
//! stays `running` past its lease.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use relayq_infra::{JobRepository, RepoError};

use crate::worker::Worker;

const REAPER_INTERVAL: Duration = Duration::from_secs(30);

pub struct WorkerPool {
    count: usize,
    repo: Arc<dyn JobRepository>,
    queues: Vec<String>,
    lease: Duration,
}

impl WorkerPool {
    pub fn new(
        count: usize,
        repo: Arc<dyn JobRepository>,
        queues: Vec<String>,
        lease: Duration,
    ) -> Self {
        Self {
            count,
            repo,
            queues,
            lease,
        }
    }

    /// Start the workers and the reaper. The returned handle owns shutdown.
    pub fn start(&self) -> PoolHandle {
        let shutdown = CancellationToken::new();
        let mut handles = Vec::with_capacity(self.count + 1);

        for id in 1..=self.count as i64 {
            info!(worker.id = id, "starting worker");
            let worker = Worker::new(id, self.repo.clone(), self.queues.clone(), self.lease);
            let token = shutdown.clone();
            let span = info_span!("worker", worker.id = id);
            handles.push(tokio::spawn(
                async move { worker.run(token).await }.instrument(span),
            ));
        }

        // Stale means twice the lease: long enough that no live worker can
        // still be inside its claim.
        let repo = self.repo.clone();
        let stale = self.lease * 2;
        let token = shutdown.clone();
        handles.push(tokio::spawn(
            reaper_loop(repo, stale, token).instrument(info_span!("reaper")),
        ));

        PoolHandle { handles, shutdown }
    }
}

/// Handle to a running pool.
#[derive(Debug)]
pub struct PoolHandle {
    handles: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl PoolHandle {
    /// Cancel the shared token and wait for every task to stop.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for result in join_all(self.handles).await {
            if let Err(error) = result {
                warn!(%error, "pool task panicked");
            }
        }
    }
}

async fn reaper_loop(repo: Arc<dyn JobRepository>, stale: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(REAPER_INTERVAL);
    // interval fires immediately; skip that so the first pass waits a tick.
    ticker.tick().await;

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => reap(repo.as_ref(), stale, &shutdown).await,
        }
    }
}

/// One reaper pass: release every job whose lock has gone stale.
async fn reap(repo: &dyn JobRepository, stale: Duration, ctx: &CancellationToken) {
    match repo.list_stuck_jobs(ctx, stale).await {
        Ok(stuck) => {
            for job in stuck {
                info!(job.id = job.id, locked_by = job.locked_by, "recovering stuck job");
                if let Err(error) = repo.release(ctx, job.id).await {
                    warn!(job.id = job.id, %error, "failed to release stuck job");
                }
            }
        }
        Err(RepoError::Canceled) => {}
        Err(error) => error!(%error, "stuck job scan failed"),
    }
}
