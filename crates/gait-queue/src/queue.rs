//! Bounded FIFO of admitted jobs waiting for a worker slot.

use std::collections::VecDeque;

use gait_models::JobId;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{QueueError, QueueResult, RejectReason};

/// Pending queue with a hard capacity. Pushes beyond capacity are rejected,
/// never buffered.
#[derive(Debug)]
pub struct PendingQueue {
    jobs: Mutex<VecDeque<JobId>>,
    capacity: usize,
    notify: Notify,
}

impl PendingQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            jobs: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Append a job, or fail with `QUEUE_FULL`.
    ///
    /// The capacity check and the push happen under one lock, so concurrent
    /// submitters can never overfill the queue.
    pub fn try_push(&self, job_id: JobId) -> QueueResult<()> {
        {
            let mut jobs = self.jobs.lock();
            if jobs.len() >= self.capacity {
                return Err(QueueError::rejected(RejectReason::QueueFull));
            }
            jobs.push_back(job_id);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Oldest waiting job.
    pub fn pop(&self) -> Option<JobId> {
        self.jobs.lock().pop_front()
    }

    /// Drop a waiting job. Returns false if it was not queued.
    pub fn remove(&self, job_id: &JobId) -> bool {
        let mut jobs = self.jobs.lock();
        match jobs.iter().position(|id| id == job_id) {
            Some(pos) => {
                jobs.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Resolves after the next push. A push that happened while nobody was
    /// waiting is remembered, so the wakeup is not lost.
    pub async fn notified(&self) {
        self.notify.notified().await
    }

    /// Wake a waiter without pushing, e.g. on shutdown.
    pub fn wake(&self) {
        self.notify.notify_one();
    }
}
