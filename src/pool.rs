//! Fixed-size worker pool.
//!
//! All jobs are queued up front on a bounded channel. `workers` tasks pull
//! from the shared receiver until it is empty, running each job to
//! completion before taking the next. [`run_pool`] returns only after every
//! worker has exited, so no job is in flight when it returns.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

use crate::error::FetchError;
use crate::fetch::{fetch_job, FetchContext, FetchOutcome};
use crate::models::Job;
use crate::progress::{UpdateProgressEvent, UpdateProgressReporter};
use crate::traits::SourceRegistry;

/// Runs a single job for a worker.
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    async fn run(&self, worker: usize, job: &Job) -> Result<FetchOutcome, FetchError>;
}

/// Runs jobs through the incremental fetcher of the job's source.
pub struct SourceRunner {
    registry: SourceRegistry,
    ctx: FetchContext,
}

impl SourceRunner {
    pub fn new(registry: SourceRegistry, ctx: FetchContext) -> Self {
        Self { registry, ctx }
    }
}

#[async_trait]
impl JobRunner for SourceRunner {
    async fn run(&self, worker: usize, job: &Job) -> Result<FetchOutcome, FetchError> {
        let Some(source) = self.registry.find(&job.source) else {
            tracing::warn!(source = %job.source, "no such source, skipping job");
            return Ok(FetchOutcome::Skipped);
        };
        fetch_job(&self.ctx, source.as_ref(), job, worker).await
    }
}

/// Job tallies for one pool run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Jobs left in the queue because every worker stopped.
    pub unprocessed: usize,
}

impl PoolReport {
    pub fn total(&self) -> usize {
        self.completed + self.skipped + self.failed + self.unprocessed
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.unprocessed == 0
    }

    fn absorb(&mut self, other: PoolReport) {
        self.completed += other.completed;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.unprocessed += other.unprocessed;
    }
}

/// Run `jobs` on `workers` concurrent workers and wait for all of them.
pub async fn run_pool<R: JobRunner>(
    runner: Arc<R>,
    jobs: Vec<Job>,
    workers: usize,
    label: &str,
    progress: Arc<dyn UpdateProgressReporter>,
) -> PoolReport {
    let total = jobs.len();
    if total == 0 {
        return PoolReport::default();
    }
    progress.report(UpdateProgressEvent::Queued {
        source: label.to_string(),
        total: total as u64,
    });

    let (tx, rx) = mpsc::channel(total);
    for job in jobs {
        // Capacity equals the job count, so this never blocks.
        if tx.send(job).await.is_err() {
            break;
        }
    }
    drop(tx);

    let rx = Arc::new(Mutex::new(rx));
    let finished = Arc::new(AtomicU64::new(0));
    let mut set = JoinSet::new();

    for worker in 0..workers.clamp(1, total) {
        let runner = runner.clone();
        let rx = rx.clone();
        let finished = finished.clone();
        let progress = progress.clone();
        let label = label.to_string();
        set.spawn(async move {
            let mut report = PoolReport::default();
            loop {
                let next = rx.lock().await.recv().await;
                let Some(job) = next else {
                    break;
                };

                let result = runner.run(worker, &job).await;
                let stop = match result {
                    Ok(FetchOutcome::Drained(_)) => {
                        report.completed += 1;
                        false
                    }
                    Ok(FetchOutcome::Skipped) => {
                        report.skipped += 1;
                        false
                    }
                    Err(err) => {
                        report.failed += 1;
                        tracing::error!(worker, job = %job, error = %err, "job failed");
                        err.is_worker_fatal()
                    }
                };

                let n = finished.fetch_add(1, Ordering::SeqCst) + 1;
                progress.report(UpdateProgressEvent::Finished {
                    source: label.clone(),
                    n,
                    total: total as u64,
                });

                if stop {
                    tracing::error!(worker, "worker stopping after identity failure");
                    break;
                }
            }
            report
        });
    }

    let mut report = PoolReport::default();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(worker_report) => report.absorb(worker_report),
            Err(e) => tracing::error!(error = %e, "worker task panicked"),
        }
    }

    let mut rx = rx.lock().await;
    while rx.try_recv().is_ok() {
        report.unprocessed += 1;
    }
    report
}
