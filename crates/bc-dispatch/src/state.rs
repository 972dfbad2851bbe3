//! Per-run state and the process-wide single-flight guard

use bc_common::{DeliveryMode, RunSummary};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters and cancellation flag of one broadcast run.
///
/// Shared by `Arc` between the dispatcher, every worker, the removal tasks,
/// the progress reporter and the cancel command. Never reused across runs.
#[derive(Debug)]
pub struct RunState {
    run_id: String,
    mode: DeliveryMode,
    pacing_delay: Duration,
    started_at: DateTime<Utc>,
    started: Instant,
    total: AtomicU64,
    success: AtomicU64,
    failed: AtomicU64,
    removed: AtomicU64,
    cancelled: AtomicBool,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunProgress {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub removed: u64,
}

impl RunProgress {
    pub fn processed(&self) -> u64 {
        self.success + self.failed
    }
}

impl RunState {
    pub fn new(total: u64, mode: DeliveryMode, pacing_delay: Duration) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            mode,
            pacing_delay,
            started_at: Utc::now(),
            started: Instant::now(),
            total: AtomicU64::new(total),
            success: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            removed: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    pub fn pacing_delay(&self) -> Duration {
        self.pacing_delay
    }

    pub fn record_success(&self) {
        self.success.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_removed(&self) {
        self.removed.fetch_add(1, Ordering::SeqCst);
    }

    /// Set the cancellation flag. Returns true if this call cancelled the run.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Count every job not yet accounted for as failed.
    ///
    /// Only needed when a worker died mid-job; returns how many were added.
    pub fn settle_unaccounted(&self) -> u64 {
        let p = self.progress();
        let missing = p.total.saturating_sub(p.processed());
        if missing > 0 {
            self.failed.fetch_add(missing, Ordering::SeqCst);
        }
        missing
    }

    pub fn progress(&self) -> RunProgress {
        RunProgress {
            total: self.total.load(Ordering::SeqCst),
            success: self.success.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            removed: self.removed.load(Ordering::SeqCst),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn summary(&self) -> RunSummary {
        let p = self.progress();
        RunSummary {
            run_id: self.run_id.clone(),
            started_at: self.started_at,
            total: p.total,
            success: p.success,
            failed: p.failed,
            removed: p.removed,
            mode: self.mode,
            cancelled: self.is_cancelled(),
            pacing_delay: self.pacing_delay,
            elapsed: self.elapsed(),
        }
    }
}

#[derive(Debug, Default)]
struct FlightSlot {
    busy: AtomicBool,
    /// Set by a cancel that lands before the run state is attached.
    /// Only read or written while `current` is locked.
    cancel_pending: AtomicBool,
    current: Mutex<Option<Arc<RunState>>>,
}

/// Process-wide guard allowing at most one broadcast at a time.
///
/// Cloning shares the same guard.
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    slot: Arc<FlightSlot>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim the guard. `None` if a run is already in flight.
    pub fn try_acquire(&self) -> Option<RunGuard> {
        self.slot
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunGuard { slot: self.slot.clone() })
    }

    pub fn is_busy(&self) -> bool {
        self.slot.busy.load(Ordering::SeqCst)
    }

    /// State of the run currently in flight, if it has started
    pub fn current(&self) -> Option<Arc<RunState>> {
        self.slot.current.lock().clone()
    }

    /// Cancel the run holding the guard.
    ///
    /// A run still resolving its targets has no state yet; the request is
    /// parked and applied when the state is attached. Returns false only
    /// when no run holds the guard.
    pub fn cancel(&self) -> bool {
        let current = self.slot.current.lock();
        match current.as_ref() {
            Some(state) => {
                state.cancel();
                true
            }
            None if self.slot.busy.load(Ordering::SeqCst) => {
                self.slot.cancel_pending.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }
}

/// Held for the lifetime of a run; releases the guard on drop, including
/// on early returns and panics.
#[derive(Debug)]
pub struct RunGuard {
    slot: Arc<FlightSlot>,
}

impl RunGuard {
    /// Publish the run's state so the cancel command can reach it
    ///
    /// A cancel requested before this point is applied to `state`.
    pub fn attach(&self, state: Arc<RunState>) {
        let mut current = self.slot.current.lock();
        if self.slot.cancel_pending.swap(false, Ordering::SeqCst) {
            state.cancel();
        }
        *current = Some(state);
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut current = self.slot.current.lock();
        current.take();
        self.slot.cancel_pending.store(false, Ordering::SeqCst);
        self.slot.busy.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_flight_rejects_second_acquire() {
        let flight = SingleFlight::new();
        let guard = flight.try_acquire().expect("first acquire");
        assert!(flight.is_busy());
        assert!(flight.try_acquire().is_none());
        assert!(flight.clone().try_acquire().is_none());

        drop(guard);
        assert!(!flight.is_busy());
        assert!(flight.try_acquire().is_some());
    }

    #[test]
    fn test_guard_publishes_and_clears_state() {
        let flight = SingleFlight::new();
        let state = Arc::new(RunState::new(3, DeliveryMode::Copy, Duration::from_millis(40)));
        {
            let guard = flight.try_acquire().unwrap();
            guard.attach(state.clone());
            assert_eq!(flight.current().map(|s| s.run_id().to_string()), Some(state.run_id().to_string()));
        }
        assert!(flight.current().is_none());
    }

    #[test]
    fn test_guard_released_on_panic() {
        let flight = SingleFlight::new();
        let inner = flight.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = inner.try_acquire().unwrap();
            panic!("worker blew up");
        }));
        assert!(result.is_err());
        assert!(!flight.is_busy());
    }

    #[test]
    fn test_cancel_before_attach_is_applied() {
        let flight = SingleFlight::new();
        assert!(!flight.cancel(), "nothing to cancel while idle");

        let guard = flight.try_acquire().unwrap();
        assert!(flight.cancel());

        let state = Arc::new(RunState::new(2, DeliveryMode::Forward, Duration::from_millis(40)));
        guard.attach(state.clone());
        assert!(state.is_cancelled());
    }

    #[test]
    fn test_pending_cancel_does_not_leak_into_next_run() {
        let flight = SingleFlight::new();
        let guard = flight.try_acquire().unwrap();
        assert!(flight.cancel());
        drop(guard);

        let guard = flight.try_acquire().unwrap();
        let state = Arc::new(RunState::new(2, DeliveryMode::Forward, Duration::from_millis(40)));
        guard.attach(state.clone());
        assert!(!state.is_cancelled());
    }

    #[test]
    fn test_cancel_reaches_attached_state() {
        let flight = SingleFlight::new();
        let guard = flight.try_acquire().unwrap();
        let state = Arc::new(RunState::new(2, DeliveryMode::Copy, Duration::from_millis(40)));
        guard.attach(state.clone());

        assert!(flight.cancel());
        assert!(state.is_cancelled());
    }

    #[test]
    fn test_cancel_is_monotone() {
        let state = RunState::new(1, DeliveryMode::Forward, Duration::from_millis(40));
        assert!(!state.is_cancelled());
        assert!(state.cancel());
        assert!(!state.cancel());
        assert!(state.is_cancelled());
    }

    #[test]
    fn test_settle_unaccounted() {
        let state = RunState::new(5, DeliveryMode::Forward, Duration::from_millis(40));
        state.record_success();
        state.record_failure();
        assert_eq!(state.settle_unaccounted(), 3);
        let summary = state.summary();
        assert!(summary.is_balanced());
        assert_eq!(summary.failed, 4);
        assert_eq!(state.settle_unaccounted(), 0);
    }
}
