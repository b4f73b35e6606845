//! Background tasks: queue consumers and the stuck-job reaper.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::generation::orchestrator::{AdvanceOutcome, Orchestrator};
use crate::generation::queue::JobQueue;
use crate::store::Repository;

/// Pause after a queue error before the next dequeue.
const QUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(2);

/// `tokio::time::interval` panics on a zero period.
const MIN_REAPER_INTERVAL: Duration = Duration::from_secs(1);

/// Spawns `count` workers, each looping `dequeue → advance` until `shutdown`.
pub fn spawn_workers(
    orchestrator: Arc<Orchestrator>,
    queue: Arc<dyn JobQueue>,
    count: usize,
    shutdown: CancellationToken,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|worker| {
            let orchestrator = orchestrator.clone();
            let queue = queue.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                info!(worker, "Generation worker started");
                run_worker(worker, &orchestrator, queue.as_ref(), &shutdown).await;
                info!(worker, "Generation worker stopped");
            })
        })
        .collect()
}

async fn run_worker(
    worker: usize,
    orchestrator: &Orchestrator,
    queue: &dyn JobQueue,
    shutdown: &CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => return,
            next = queue.dequeue() => next,
        };

        let job_id = match next {
            Ok(Some(id)) => id,
            Ok(None) => continue,
            Err(e) => {
                warn!(worker, "Dequeue failed: {e:#}");
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::sleep(QUEUE_ERROR_BACKOFF) => continue,
                }
            }
        };

        // A started job runs to a terminal state even during shutdown.
        match orchestrator.advance(job_id).await {
            Ok(AdvanceOutcome::Completed(_)) => info!(worker, %job_id, "Job done"),
            Ok(AdvanceOutcome::Failed { message }) => {
                warn!(worker, %job_id, "Job ended in error: {message}")
            }
            Ok(AdvanceOutcome::Skipped { status }) => {
                info!(worker, %job_id, ?status, "Job skipped")
            }
            Err(e) => error!(worker, %job_id, "Advancing job failed: {e:#}"),
        }
    }
}

/// Re-enqueues every job still `queued`, e.g. after a restart or a failed
/// enqueue at submit time.
pub async fn recover_queued_jobs(repo: &dyn Repository, queue: &dyn JobQueue) -> Result<usize> {
    let ids = repo.queued_job_ids().await?;
    for id in &ids {
        queue.enqueue(*id).await?;
    }
    if !ids.is_empty() {
        info!(count = ids.len(), "Re-enqueued queued generation jobs");
    }
    Ok(ids.len())
}

/// One reaper pass: fails running jobs with no progress within `timeout`.
pub async fn reap_stale_jobs(repo: &dyn Repository, timeout: Duration) -> Result<usize> {
    let cutoff = Utc::now() - chrono::Duration::from_std(timeout)?;
    let message = format!("Job exceeded {}s without progress", timeout.as_secs());
    let expired = repo.expire_running_jobs(cutoff, &message).await?;
    for id in &expired {
        warn!(job_id = %id, "Expired stale running job");
    }
    Ok(expired.len())
}

pub fn spawn_reaper(
    repo: Arc<dyn Repository>,
    timeout: Duration,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(MIN_REAPER_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = reap_stale_jobs(repo.as_ref(), timeout).await {
                        error!("Stale job reaper failed: {e:#}");
                    }
                }
            }
        }
    })
}
