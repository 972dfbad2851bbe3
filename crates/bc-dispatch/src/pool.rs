//! WorkerPool - fixed set of delivery workers draining the job queue
//!
//! Each worker loop:
//! - pops the queue front, exiting when the queue is empty
//! - waits for a pacing permit
//! - counts the job as failed without an attempt once the run is cancelled,
//!   checked both before and after the permit
//! - calls the delivery provider and routes the outcome
//!
//! Rate-limited jobs are requeued at the back until the retry cap, and the
//! worker that saw the signal sleeps out the provider's wait. Workers share
//! nothing but the queue, the pacing controller and the run's atomics.

use bc_common::{DeliveryMode, SourceMessage};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn, Instrument};

use crate::dispatch_metrics;
use crate::pacing::PacingController;
use crate::provider::{should_remove, DeliveryProvider};
use crate::queue::{Job, JobQueue};
use crate::removal::RemovalTasks;
use crate::state::RunState;

/// Everything a worker needs for one run
#[derive(Clone)]
pub struct WorkerContext {
    pub queue: Arc<JobQueue>,
    pub pacer: Arc<PacingController>,
    pub provider: Arc<dyn DeliveryProvider>,
    pub state: Arc<RunState>,
    pub removals: Arc<RemovalTasks>,
    pub source: SourceMessage,
    pub mode: DeliveryMode,
    /// Requeues allowed per job before it is counted as failed
    pub max_retries: u32,
}

pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self { workers: workers.max(1) }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run workers until the queue is drained. Returns once every worker has exited.
    pub async fn run(&self, ctx: WorkerContext) {
        let worker_count = self.workers.min(ctx.queue.len()).max(1);
        let active = Arc::new(AtomicUsize::new(worker_count));
        dispatch_metrics::set_active_workers(worker_count);

        info!(
            workers = worker_count,
            queued = ctx.queue.len(),
            max_retries = ctx.max_retries,
            "Starting delivery workers"
        );

        let handles: Vec<_> = (0..worker_count)
            .map(|worker_id| {
                let ctx = ctx.clone();
                let active = active.clone();
                tokio::spawn(
                    async move {
                        run_worker(worker_id, &ctx).await;
                        let remaining = active.fetch_sub(1, Ordering::SeqCst) - 1;
                        dispatch_metrics::set_active_workers(remaining);
                    }
                    .in_current_span(),
                )
            })
            .collect();

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "Delivery worker terminated abnormally");
            }
        }

        // Only reachable if workers died with jobs still queued or in hand
        let leftover = std::iter::from_fn(|| ctx.queue.pop_front()).count();
        let settled = ctx.state.settle_unaccounted();
        if leftover > 0 || settled > 0 {
            warn!(leftover, settled, "Counted unprocessed jobs as failed");
        }
        dispatch_metrics::set_active_workers(0);
    }
}

async fn run_worker(worker_id: usize, ctx: &WorkerContext) {
    debug!(worker_id, "Worker started");
    let mode_label = ctx.mode.label();

    while let Some(job) = ctx.queue.pop_front() {
        if ctx.state.is_cancelled() {
            skip_cancelled(ctx);
            continue;
        }

        ctx.pacer.acquire().await;

        // The permit wait can be as long as the pacing delay
        if ctx.state.is_cancelled() {
            skip_cancelled(ctx);
            continue;
        }

        let start = Instant::now();
        let outcome = ctx.provider.deliver(job.recipient, &ctx.source, ctx.mode).await;
        dispatch_metrics::record_delivery_latency(start.elapsed());

        let err = match outcome {
            Ok(()) => {
                ctx.state.record_success();
                dispatch_metrics::record_delivery(mode_label, "success");
                continue;
            }
            Err(err) => err,
        };

        if let Some(wait) = err.rate_limit_wait() {
            if job.retry_count < ctx.max_retries {
                let retry = job.requeued();
                warn!(
                    worker_id,
                    recipient = %job.recipient,
                    retry = retry.retry_count,
                    wait_ms = wait.as_millis() as u64,
                    "Rate limited, requeueing"
                );
                ctx.queue.push_back(retry);
                dispatch_metrics::record_rate_limited(true);
                tokio::time::sleep(wait).await;
            } else {
                fail_exhausted(ctx, job, mode_label);
            }
            continue;
        }

        ctx.state.record_failure();
        dispatch_metrics::record_delivery(mode_label, err.label());
        warn!(worker_id, recipient = %job.recipient, error = %err, "Delivery failed");

        if should_remove(&err) {
            ctx.removals.spawn(job.recipient, &err);
        }
    }

    debug!(worker_id, "Worker exiting, queue empty");
}

fn skip_cancelled(ctx: &WorkerContext) {
    ctx.state.record_failure();
    dispatch_metrics::record_cancelled_job();
}

fn fail_exhausted(ctx: &WorkerContext, job: Job, mode_label: &str) {
    ctx.state.record_failure();
    dispatch_metrics::record_rate_limited(false);
    dispatch_metrics::record_delivery(mode_label, "retries_exhausted");
    warn!(
        recipient = %job.recipient,
        retries = job.retry_count,
        "Rate limited after final retry, giving up"
    );
}
