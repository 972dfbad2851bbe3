//! BroadcastDispatcher - runs one broadcast end to end
//!
//! Claims the single-flight guard, resolves targets from the directory,
//! seeds the queue, drives the worker pool under the pacing controller and
//! reports the outcome. The guard is released when `broadcast` returns,
//! whatever the result.

use bc_common::{BroadcastConfig, RunSummary};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, Instrument};

use crate::directory::{collect_targets, RecipientDirectory, TargetList};
use crate::dispatch_metrics;
use crate::error::DispatchError;
use crate::pacing::PacingController;
use crate::pool::{WorkerContext, WorkerPool};
use crate::provider::DeliveryProvider;
use crate::queue::JobQueue;
use crate::removal::RemovalTasks;
use crate::reporter::{render_started, OperatorChannel, OutcomeReporter};
use crate::request::BroadcastRequest;
use crate::state::{RunState, SingleFlight};
use crate::Result;

pub struct BroadcastDispatcher {
    config: BroadcastConfig,
    directory: Arc<dyn RecipientDirectory>,
    provider: Arc<dyn DeliveryProvider>,
    flight: SingleFlight,
}

impl BroadcastDispatcher {
    pub fn new(
        config: BroadcastConfig,
        directory: Arc<dyn RecipientDirectory>,
        provider: Arc<dyn DeliveryProvider>,
    ) -> Self {
        Self {
            config,
            directory,
            provider,
            flight: SingleFlight::new(),
        }
    }

    pub fn config(&self) -> &BroadcastConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.flight.is_busy()
    }

    /// Set the cancellation flag of the active run.
    ///
    /// Returns false when no run is in progress. A run still resolving its
    /// targets is cancelled as soon as it starts. In-flight deliveries and
    /// backoff sleeps finish; no new attempts start.
    pub fn cancel(&self) -> bool {
        let accepted = self.flight.cancel();
        if accepted {
            match self.flight.current() {
                Some(state) => info!(run_id = %state.run_id(), "Broadcast cancellation requested"),
                None => info!("Broadcast cancellation requested before targets were resolved"),
            }
        }
        accepted
    }

    /// Pacing interval for `request`: its own delay or the configured default
    pub fn pacing_interval(&self, request: &BroadcastRequest) -> Duration {
        request.delay.unwrap_or_else(|| self.config.default_pacing_interval())
    }

    /// Resolve the ordered target list for `request` without starting a run
    pub async fn resolve_targets(&self, request: &BroadcastRequest) -> TargetList {
        collect_targets(self.directory.as_ref(), request, self.config.channel_id_threshold).await
    }

    /// Run a broadcast to completion and return its summary.
    ///
    /// Fails fast with `AlreadyRunning` if another broadcast holds the guard
    /// and with `NoTargets` if filtering leaves nothing to deliver.
    pub async fn broadcast(
        &self,
        request: BroadcastRequest,
        channel: Arc<dyn OperatorChannel>,
    ) -> Result<RunSummary> {
        let Some(guard) = self.flight.try_acquire() else {
            dispatch_metrics::record_run_rejected("already_running");
            return Err(DispatchError::AlreadyRunning);
        };

        let interval = self.pacing_interval(&request);
        let pacer = Arc::new(PacingController::new(interval)?);

        let targets = self.resolve_targets(&request).await;
        if targets.is_empty() {
            dispatch_metrics::record_run_rejected("no_targets");
            return Err(DispatchError::NoTargets);
        }

        let state = Arc::new(RunState::new(targets.len() as u64, request.mode, interval));
        guard.attach(state.clone());

        let span = info_span!("broadcast", run_id = %state.run_id());
        let summary = self
            .execute(request, targets, pacer, state, channel)
            .instrument(span)
            .await;

        drop(guard);
        dispatch_metrics::set_run_in_progress(false);
        Ok(summary)
    }

    async fn execute(
        &self,
        request: BroadcastRequest,
        targets: TargetList,
        pacer: Arc<PacingController>,
        state: Arc<RunState>,
        channel: Arc<dyn OperatorChannel>,
    ) -> RunSummary {
        dispatch_metrics::record_run_started(targets.len());
        dispatch_metrics::set_run_in_progress(true);
        info!(
            users = targets.counts.users,
            groups = targets.counts.groups,
            channels = targets.counts.channels,
            total = targets.len(),
            mode = %request.mode,
            delay_ms = pacer.interval().as_millis() as u64,
            "Broadcast started"
        );

        let mut reporter = OutcomeReporter::new(channel);
        reporter
            .announce(render_started(&targets.counts, targets.len(), request.mode, pacer.interval()))
            .await;
        let progress = self
            .config
            .progress_interval()
            .and_then(|every| reporter.spawn_progress(state.clone(), every));

        let removals = Arc::new(RemovalTasks::new(
            self.directory.clone(),
            state.clone(),
            self.config.removal_concurrency,
        ));

        let ctx = WorkerContext {
            queue: Arc::new(JobQueue::seeded(targets.targets)),
            pacer,
            provider: self.provider.clone(),
            state: state.clone(),
            removals: removals.clone(),
            source: request.source,
            mode: request.mode,
            max_retries: self.config.max_retries,
        };
        WorkerPool::new(self.config.workers).run(ctx).await;

        let pending = removals.pending();
        if pending > 0 {
            debug!(pending, "Waiting for directory removals");
        }
        removals.drain(self.config.removal_drain_timeout()).await;
        if let Some(task) = progress {
            task.stop().await;
        }

        let summary = state.summary();
        info!(
            total = summary.total,
            success = summary.success,
            failed = summary.failed,
            removed = summary.removed,
            cancelled = summary.cancelled,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Broadcast complete"
        );
        reporter.finish(&summary).await;
        summary
    }
}
