//! Job queue shared by the delivery workers
//!
//! FIFO for the initial seed; rate-limited jobs go to the back so retries
//! always rank behind fresh work. The lock is only held for the push/pop
//! itself, never across a delivery or a backoff sleep.

use bc_common::RecipientId;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// One pending delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Job {
    pub recipient: RecipientId,
    pub retry_count: u32,
}

impl Job {
    pub fn new(recipient: RecipientId) -> Self {
        Self { recipient, retry_count: 0 }
    }

    /// The same job after one more rate-limit requeue
    #[must_use]
    pub fn requeued(self) -> Self {
        Self {
            recipient: self.recipient,
            retry_count: self.retry_count + 1,
        }
    }
}

#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: Mutex<VecDeque<Job>>,
}

impl JobQueue {
    /// Seed the queue in target order with fresh jobs
    pub fn seeded<I>(targets: I) -> Self
    where
        I: IntoIterator<Item = RecipientId>,
    {
        Self {
            jobs: Mutex::new(targets.into_iter().map(Job::new).collect()),
        }
    }

    pub fn pop_front(&self) -> Option<Job> {
        self.jobs.lock().pop_front()
    }

    pub fn push_back(&self, job: Job) {
        self.jobs.lock().push_back(job);
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}
