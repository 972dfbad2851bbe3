//! Background removal of unreachable recipients
//!
//! Workers hand removals off here and move on. Each removal runs as its own
//! task, bounded by a semaphore; failures only reach the log and never touch
//! the run's success/failure accounting.

use bc_common::RecipientId;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn, Instrument};

use crate::directory::RecipientDirectory;
use crate::dispatch_metrics;
use crate::provider::DeliveryError;
use crate::state::RunState;

pub struct RemovalTasks {
    directory: Arc<dyn RecipientDirectory>,
    state: Arc<RunState>,
    permits: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
}

impl RemovalTasks {
    pub fn new(directory: Arc<dyn RecipientDirectory>, state: Arc<RunState>, concurrency: usize) -> Self {
        Self {
            directory,
            state,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Spawn removal of `recipient` without waiting for it
    pub fn spawn(&self, recipient: RecipientId, reason: &DeliveryError) {
        let directory = self.directory.clone();
        let state = self.state.clone();
        let permits = self.permits.clone();
        let reason = reason.label();

        let task = async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };

            let (label, result) = if recipient.is_user() {
                ("user", directory.remove_user(recipient).await)
            } else {
                ("chat", directory.remove_chat(recipient).await)
            };

            match result {
                Ok(()) => {
                    state.record_removed();
                    dispatch_metrics::record_removal(label, true);
                    info!(recipient = %recipient, reason, "Removed {} from directory", label);
                }
                Err(e) => {
                    dispatch_metrics::record_removal(label, false);
                    warn!(recipient = %recipient, reason, error = %e, "Failed to remove {} from directory", label);
                }
            }
        };

        self.tasks.lock().spawn(task.in_current_span());
    }

    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Wait for outstanding removals, at most `timeout`.
    ///
    /// Removals still running after the timeout are detached, not aborted.
    pub async fn drain(&self, timeout: Duration) {
        let mut tasks = std::mem::take(&mut *self.tasks.lock());
        if tasks.is_empty() {
            return;
        }

        let pending = tasks.len();
        let joined = tokio::time::timeout(timeout, async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "Removal task failed");
                }
            }
        })
        .await;

        match joined {
            Ok(()) => debug!(pending, "Removal tasks drained"),
            Err(_) => {
                warn!(
                    remaining = tasks.len(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Removal drain timed out, detaching remaining tasks"
                );
                tasks.detach_all();
            }
        }
    }
}
